//! # Buffer State Module
//!
//! This module defines the seam between the layer pipeline and the graphics
//! API. The pipeline only ever talks to a [`RenderBackend`]: it creates,
//! updates and destroys layer meshes, and records indexed draws into passes.
//!
//! ## Key Features
//!
//! * One vertex buffer and one index buffer per mesh, owned by exactly one layer
//! * Buffer usage analytics and memory tracking
//! * Allocation failures are returned as errors, never swallowed
//!
//! ## Implementations
//!
//! * `WgpuBackend` (in `rendering::wgpu_backend`) renders headlessly with wgpu
//! * [`RecordingBackend`] keeps everything in memory. It backs the tests and
//!   is the fallback when no GPU adapter is available.

use std::collections::HashMap;

use anyhow::{bail, ensure, Result};
use cgmath::{Matrix4, Point3};
use log::trace;

use crate::engine_state::rendering::{meshing::mesh::MeshData, vertex::LayerExtent};

/// Opaque handle to the GPU buffers of one mesh.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshHandle(pub u64);

/// Which view a pass renders from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PassKind {
    /// Colour and depth from the observer's camera.
    Camera,
    /// Depth only, from the light's orthographic volume.
    Shadow,
}

/// Which half of a pass a draw belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DrawPhase {
    /// Depth-tested and depth-written, no blending, cutout fragments discarded.
    Opaque,
    /// Alpha-blended, depth-tested but not depth-written.
    Alpha,
}

/// The graphics operations the layer pipeline needs.
///
/// All methods are called from the thread that owns the backend.
pub trait RenderBackend {
    /// Allocates the vertex and index buffers of a mesh and fills them.
    ///
    /// # Arguments
    /// * `label` - Debug label for the buffers
    /// * `origin` - World position the mesh's layer-local vertices are relative to
    /// * `extent` - Range the vertex positions were quantized over
    /// * `mesh` - The geometry to upload
    ///
    /// # Returns
    /// A handle owned by the caller until passed to `destroy_mesh`
    fn create_mesh(
        &mut self,
        label: &str,
        origin: Point3<f32>,
        extent: LayerExtent,
        mesh: &MeshData,
    ) -> Result<MeshHandle>;

    /// Replaces the contents of a mesh, reallocating its buffers if they are too small.
    fn update_mesh(&mut self, handle: MeshHandle, mesh: &MeshData) -> Result<()>;

    /// Releases the buffers of a mesh. Unknown handles are ignored.
    fn destroy_mesh(&mut self, handle: MeshHandle);

    /// Starts recording a pass seen from `eye` through `view_projection`.
    fn begin_pass(&mut self, kind: PassKind, eye: Point3<f32>, view_projection: Matrix4<f32>) -> Result<()>;

    /// Records an indexed draw of a whole mesh into the current pass.
    fn draw(&mut self, handle: MeshHandle, phase: DrawPhase) -> Result<()>;

    /// Finishes the current pass and submits it.
    fn end_pass(&mut self) -> Result<()>;

    /// Bytes currently allocated for live meshes.
    fn allocated_memory(&self) -> u64;
}

/// Analytics data for one mesh's buffers
///
/// Tracks memory allocation, usage, and write operations to help identify
/// optimization opportunities.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferAnalytics {
    /// Total memory allocated for the buffers in bytes
    pub allocated_memory: u64,
    /// Memory holding live data in bytes (based on the last write)
    pub used_memory: u64,
    /// Number of times the buffers have been written to
    pub times_written: u64,
}

/// One draw recorded by a [`RecordingBackend`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDraw {
    pub handle: MeshHandle,
    pub phase: DrawPhase,
    pub index_count: u32,
    pub origin: Point3<f32>,
}

/// One pass recorded by a [`RecordingBackend`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPass {
    pub kind: PassKind,
    pub draws: Vec<RecordedDraw>,
}

#[derive(Debug)]
struct RecordedMesh {
    label: String,
    origin: Point3<f32>,
    index_count: u32,
    analytics: BufferAnalytics,
}

/// Finished passes a `RecordingBackend` keeps for inspection.
pub const RECORDED_PASS_HISTORY: usize = 8;

/// An in-memory render backend.
///
/// Meshes are tracked by size only. The most recent passes and their draws
/// are kept so they can be inspected. An optional capacity makes allocations beyond it fail the
/// way an exhausted GPU would.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    meshes: HashMap<MeshHandle, RecordedMesh>,
    next_handle: u64,
    capacity: Option<u64>,
    current_pass: Option<RecordedPass>,
    passes: Vec<RecordedPass>,
    created: usize,
    destroyed: usize,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that refuses to hold more than `capacity` bytes of mesh data.
    pub fn with_capacity(capacity: u64) -> Self {
        RecordingBackend {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    fn check_capacity(&self, additional: u64) -> Result<()> {
        if let Some(capacity) = self.capacity {
            let allocated = self.get_total_allocated_memory();
            if allocated + additional > capacity {
                bail!(
                    "out of GPU memory: allocating {} bytes with {} of {} bytes in use",
                    additional,
                    allocated,
                    capacity
                );
            }
        }
        Ok(())
    }

    /// Gets the total allocated memory across all meshes
    pub fn get_total_allocated_memory(&self) -> u64 {
        self.meshes
            .values()
            .fold(0, |acc, mesh| acc + mesh.analytics.allocated_memory)
    }

    /// Gets the total used memory across all meshes
    pub fn get_total_used_memory(&self) -> u64 {
        self.meshes
            .values()
            .fold(0, |acc, mesh| acc + mesh.analytics.used_memory)
    }

    pub fn analytics(&self, handle: MeshHandle) -> Option<&BufferAnalytics> {
        self.meshes.get(&handle).map(|mesh| &mesh.analytics)
    }

    pub fn label(&self, handle: MeshHandle) -> Option<&str> {
        self.meshes.get(&handle).map(|mesh| mesh.label.as_str())
    }

    pub fn live_meshes(&self) -> usize {
        self.meshes.len()
    }

    pub fn created_meshes(&self) -> usize {
        self.created
    }

    pub fn destroyed_meshes(&self) -> usize {
        self.destroyed
    }

    /// The last `RECORDED_PASS_HISTORY` finished passes, oldest first.
    pub fn passes(&self) -> &[RecordedPass] {
        &self.passes
    }

    pub fn last_pass(&self) -> Option<&RecordedPass> {
        self.passes.last()
    }

    pub fn clear_passes(&mut self) {
        self.passes.clear();
    }
}

impl RenderBackend for RecordingBackend {
    fn create_mesh(
        &mut self,
        label: &str,
        origin: Point3<f32>,
        _extent: LayerExtent,
        mesh: &MeshData,
    ) -> Result<MeshHandle> {
        let size = mesh.byte_size() as u64;
        self.check_capacity(size)?;

        let handle = MeshHandle(self.next_handle);
        self.next_handle += 1;
        self.created += 1;
        self.meshes.insert(
            handle,
            RecordedMesh {
                label: label.to_string(),
                origin,
                index_count: mesh.index_count(),
                analytics: BufferAnalytics {
                    allocated_memory: size,
                    used_memory: size,
                    times_written: 1,
                },
            },
        );
        trace!("Created mesh {:?} '{}' ({} bytes)", handle, label, size);
        Ok(handle)
    }

    fn update_mesh(&mut self, handle: MeshHandle, mesh: &MeshData) -> Result<()> {
        let size = mesh.byte_size() as u64;
        let Some(allocated) = self
            .meshes
            .get(&handle)
            .map(|recorded| recorded.analytics.allocated_memory)
        else {
            bail!("update of unknown mesh {:?}", handle);
        };
        if size > allocated {
            self.check_capacity(size - allocated)?;
        }

        if let Some(recorded) = self.meshes.get_mut(&handle) {
            recorded.index_count = mesh.index_count();
            recorded.analytics.allocated_memory = allocated.max(size);
            recorded.analytics.used_memory = size;
            recorded.analytics.times_written += 1;
        }
        Ok(())
    }

    fn destroy_mesh(&mut self, handle: MeshHandle) {
        if self.meshes.remove(&handle).is_some() {
            self.destroyed += 1;
        }
    }

    fn begin_pass(
        &mut self,
        kind: PassKind,
        _eye: Point3<f32>,
        _view_projection: Matrix4<f32>,
    ) -> Result<()> {
        ensure!(self.current_pass.is_none(), "a pass is already being recorded");
        self.current_pass = Some(RecordedPass {
            kind,
            draws: Vec::new(),
        });
        Ok(())
    }

    fn draw(&mut self, handle: MeshHandle, phase: DrawPhase) -> Result<()> {
        let Some(mesh) = self.meshes.get(&handle) else {
            bail!("draw of unknown mesh {:?}", handle);
        };
        let draw = RecordedDraw {
            handle,
            phase,
            index_count: mesh.index_count,
            origin: mesh.origin,
        };
        match self.current_pass.as_mut() {
            Some(pass) => pass.draws.push(draw),
            None => bail!("draw outside of a pass"),
        }
        Ok(())
    }

    fn end_pass(&mut self) -> Result<()> {
        match self.current_pass.take() {
            Some(pass) => self.passes.push(pass),
            None => bail!("no pass is being recorded"),
        }
        if self.passes.len() > RECORDED_PASS_HISTORY {
            let excess = self.passes.len() - RECORDED_PASS_HISTORY;
            self.passes.drain(..excess);
        }
        Ok(())
    }

    fn allocated_memory(&self) -> u64 {
        self.get_total_allocated_memory()
    }
}

#[cfg(test)]
mod tests {
    use cgmath::SquareMatrix;

    use super::*;
    use crate::engine_state::rendering::vertex::CompressedVertex;

    fn extent() -> LayerExtent {
        LayerExtent::new(32, 32, 32)
    }

    fn mesh(quads: usize) -> MeshData {
        MeshData {
            vertices: vec![CompressedVertex::default(); quads * 4],
            indices: vec![0; quads * 6],
        }
    }

    #[test]
    fn analytics_track_allocations_and_writes() {
        let mut backend = RecordingBackend::new();
        let handle = backend.create_mesh("layer", Point3::new(0.0, 0.0, 0.0), extent(), &mesh(2)).unwrap();
        let size = mesh(2).byte_size() as u64;
        assert_eq!(backend.get_total_allocated_memory(), size);

        backend.update_mesh(handle, &mesh(1)).unwrap();
        let analytics = backend.analytics(handle).unwrap();
        assert_eq!(analytics.allocated_memory, size);
        assert_eq!(analytics.used_memory, mesh(1).byte_size() as u64);
        assert_eq!(analytics.times_written, 2);

        backend.destroy_mesh(handle);
        backend.destroy_mesh(handle);
        assert_eq!(backend.live_meshes(), 0);
        assert_eq!(backend.destroyed_meshes(), 1);
    }

    #[test]
    fn exhaustion_is_an_error() {
        let size = mesh(4).byte_size() as u64;
        let mut backend = RecordingBackend::with_capacity(size);
        let handle = backend.create_mesh("a", Point3::new(0.0, 0.0, 0.0), extent(), &mesh(4)).unwrap();
        assert!(backend.create_mesh("b", Point3::new(0.0, 0.0, 0.0), extent(), &mesh(1)).is_err());
        assert!(backend.update_mesh(handle, &mesh(5)).is_err());
        backend.destroy_mesh(handle);
        assert!(backend.create_mesh("c", Point3::new(0.0, 0.0, 0.0), extent(), &mesh(1)).is_ok());
    }

    #[test]
    fn draws_are_recorded_per_pass() {
        let mut backend = RecordingBackend::new();
        let handle = backend.create_mesh("a", Point3::new(32.0, 0.0, 0.0), extent(), &mesh(1)).unwrap();
        assert!(backend.draw(handle, DrawPhase::Opaque).is_err());

        backend.begin_pass(PassKind::Shadow, Point3::new(0.0, 0.0, 0.0), Matrix4::identity()).unwrap();
        assert!(backend.begin_pass(PassKind::Camera, Point3::new(0.0, 0.0, 0.0), Matrix4::identity()).is_err());
        backend.draw(handle, DrawPhase::Opaque).unwrap();
        backend.end_pass().unwrap();

        let pass = backend.last_pass().unwrap();
        assert_eq!(pass.kind, PassKind::Shadow);
        assert_eq!(pass.draws.len(), 1);
        assert_eq!(pass.draws[0].index_count, 6);
        assert_eq!(pass.draws[0].origin, Point3::new(32.0, 0.0, 0.0));
        assert!(backend.end_pass().is_err());
    }

    #[test]
    fn pass_history_is_bounded() {
        let mut backend = RecordingBackend::new();
        let handle = backend.create_mesh("a", Point3::new(0.0, 0.0, 0.0), extent(), &mesh(1)).unwrap();

        for frame in 0..100 {
            backend.begin_pass(PassKind::Camera, Point3::new(frame as f32, 0.0, 0.0), Matrix4::identity()).unwrap();
            for _ in 0..=frame % 3 {
                backend.draw(handle, DrawPhase::Opaque).unwrap();
            }
            backend.end_pass().unwrap();
        }

        assert_eq!(backend.passes().len(), RECORDED_PASS_HISTORY);
        assert_eq!(backend.last_pass().unwrap().draws.len(), 99 % 3 + 1);
        assert_eq!(backend.passes()[0].draws.len(), (100 - RECORDED_PASS_HISTORY) % 3 + 1);
    }
}
