//! Background tasks for the rendering system.
//!
//! # Available Tasks
//! - `LayerMeshTask`: Builds the mesh of one chunk layer off the main thread

pub mod layer_mesh_task;
