//! # Core Module
//!
//! Shared concurrency primitives used throughout the terrain pipeline.
//!
//! ## Key Components
//! - `MtResource`: Thread-safe reference-counted resource with read-write locking,
//!   used to publish generated chunks to the main thread and to meshing workers.

pub mod mt_resource;

pub use mt_resource::MtResource;
