//! Rendering system for the terrain engine.
//!
//! This module turns resident chunks into GPU geometry and draws it. Chunks
//! are cut into layers (`layer`), each layer is meshed on a worker (`meshing`,
//! `tasks`) into quantized vertices (`vertex`), and the per-pass pipeline
//! (`pipeline`) decides which layers to mesh, upload and draw within its
//! budgets. `wgpu_backend` is the GPU implementation of the render backend.

pub mod layer;
pub mod meshing;
pub mod pipeline;
pub mod tasks;
pub mod texture;
pub mod vertex;
pub mod wgpu_backend;

// Re-export commonly used types
pub use vertex::{CompressedVertex, LayerExtent, Vertex};
