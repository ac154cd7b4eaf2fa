//! Mesh generation for chunk layers.
//!
//! - `mesh/`: face emission and the layer mesh builder
//! - `ambient_occlusion`: per-corner occlusion levels and quad flipping
//! - `dedup`: collapsing identical compressed vertices into an indexed mesh

pub mod ambient_occlusion;
pub mod dedup;
pub mod mesh;
