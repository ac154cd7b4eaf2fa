//! Conversion of voxel layers into GPU-ready geometry.
//!
//! Every visible block face becomes its own quad: adjacent coplanar faces are
//! never merged, since each vertex carries its own ambient occlusion value.
//!
//! # Architecture
//! - [`Face`]: The four corners of one block face
//! - [`VertexStream`]: Indexed geometry with a per-batch offset marker
//! - [`MeshBuilder`]: Walks a layer and fills the opaque and alpha streams
//! - [`LayerMesh`]: The compressed, deduplicated result

pub mod face;
#[allow(clippy::module_inception)]
mod mesh;
pub mod stream;

pub use face::Face;
pub use mesh::*;
pub use stream::VertexStream;
