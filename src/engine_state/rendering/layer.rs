//! Chunk layers: the unit of meshing, culling and GPU upload.
//!
//! Every resident chunk is cut into horizontal slabs of `layer_height` rows.
//! Each [`ChunkLayer`] moves through the states
//!
//! ```text
//! Unpopulated -> AwaitingGeneration -> Generated -> Uploaded -> Dirty -> ... -> Deleted
//! ```
//!
//! A layer only leaves `Uploaded` through [`ChunkLayer::mark_dirty`], driven by
//! an explicit [`LayerEvent`]. Marking a layer dirty is also the only thing
//! that clears its cached "empty" flag. Every dirty mark bumps the layer's
//! revision, so a mesh built from older voxel content is recognised as stale
//! when it arrives and is dropped.

use std::collections::BTreeMap;

use anyhow::Result;
use cgmath::{Point3, Vector3};
use log::trace;

use crate::{
    core::MtResource,
    engine_state::{
        buffer_state::{MeshHandle, RenderBackend},
        camera_state::Aabb,
        rendering::{
            meshing::mesh::{LayerMesh, MeshData},
            vertex::LayerExtent,
        },
        voxels::{
            chunk::{Chunk, ChunkCoord, CHUNK_DEPTH, CHUNK_HEIGHT, CHUNK_WIDTH},
            world::locate,
        },
    },
};

/// Identifies one layer: its chunk and its index from the bottom.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerKey {
    pub coord: ChunkCoord,
    pub index: usize,
}

impl LayerKey {
    pub fn new(coord: ChunkCoord, index: usize) -> Self {
        LayerKey { coord, index }
    }
}

impl std::fmt::Display for LayerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.coord, self.index)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LayerState {
    /// No mesh has been built yet.
    Unpopulated,
    /// A mesh task is in flight.
    AwaitingGeneration,
    /// A CPU-side mesh is waiting for upload.
    Generated,
    /// The GPU buffers match the voxel content.
    Uploaded,
    /// The voxel content changed. Existing GPU buffers are stale but still drawn.
    Dirty,
    /// GPU buffers released. Terminal.
    Deleted,
}

/// Why a layer was marked dirty.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DirtyCause {
    /// A block inside the layer changed.
    BlockEdit,
    /// A block next to the layer changed, which may change its faces or AO.
    NeighborEdit,
    /// A neighbouring chunk finished generating.
    NeighborArrived,
}

/// An explicit request to invalidate one layer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct LayerEvent {
    pub key: LayerKey,
    pub cause: DirtyCause,
}

/// GPU buffers of one half of a layer's mesh.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GpuMesh {
    pub handle: MeshHandle,
    pub index_count: u32,
}

/// One slab of a chunk.
#[derive(Debug)]
pub struct ChunkLayer {
    key: LayerKey,
    base_y: usize,
    height: usize,
    center: Point3<f32>,
    bounds: Aabb,
    chunk: MtResource<Chunk>,
    state: LayerState,
    revision: u64,
    empty: Option<bool>,
    culled: bool,
    mesh: Option<LayerMesh>,
    opaque: Option<GpuMesh>,
    alpha: Option<GpuMesh>,
    uploads: usize,
}

impl ChunkLayer {
    pub fn new(key: LayerKey, base_y: usize, height: usize, chunk: MtResource<Chunk>) -> Self {
        let origin = key.coord.world_origin();
        let min = Point3::new(origin.x as f32, base_y as f32, origin.z as f32);
        let bounds = Aabb::new(
            min,
            min + Vector3::new(CHUNK_WIDTH as f32, height as f32, CHUNK_DEPTH as f32),
        );

        ChunkLayer {
            key,
            base_y,
            height,
            center: bounds.center(),
            bounds,
            chunk,
            state: LayerState::Unpopulated,
            revision: 0,
            empty: None,
            culled: false,
            mesh: None,
            opaque: None,
            alpha: None,
            uploads: 0,
        }
    }

    pub fn key(&self) -> LayerKey {
        self.key
    }

    pub fn base_y(&self) -> usize {
        self.base_y
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn center(&self) -> Point3<f32> {
        self.center
    }

    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    /// World position of the layer's minimum corner.
    pub fn origin(&self) -> Point3<f32> {
        self.bounds.min
    }

    pub fn chunk(&self) -> &MtResource<Chunk> {
        &self.chunk
    }

    pub fn state(&self) -> LayerState {
        self.state
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Number of completed uploads.
    pub fn uploads(&self) -> usize {
        self.uploads
    }

    pub fn is_culled(&self) -> bool {
        self.culled
    }

    pub fn set_culled(&mut self, culled: bool) {
        self.culled = culled;
    }

    /// Whether the slab holds no blocks.
    ///
    /// Computed from the chunk's row histogram on first use and cached until
    /// the layer is marked dirty.
    pub fn is_empty(&mut self) -> bool {
        if let Some(empty) = self.empty {
            return empty;
        }
        let empty = self
            .chunk
            .get()
            .is_slab_empty(self.base_y, self.base_y + self.height);
        self.empty = Some(empty);
        empty
    }

    /// The cached empty flag, if it has been computed.
    pub fn cached_empty(&self) -> Option<bool> {
        self.empty
    }

    /// Whether the layer needs a (new) mesh.
    pub fn needs_mesh(&self) -> bool {
        matches!(self.state, LayerState::Unpopulated | LayerState::Dirty)
    }

    pub fn has_gpu_mesh(&self) -> bool {
        self.opaque.is_some() || self.alpha.is_some()
    }

    pub fn opaque_mesh(&self) -> Option<GpuMesh> {
        self.opaque
    }

    pub fn alpha_mesh(&self) -> Option<GpuMesh> {
        self.alpha
    }

    /// The CPU-side mesh waiting for upload.
    pub fn pending_mesh(&self) -> Option<&LayerMesh> {
        self.mesh.as_ref()
    }

    /// Records that a mesh task was dispatched.
    ///
    /// # Returns
    /// The revision the task builds from.
    pub fn begin_generation(&mut self) -> u64 {
        self.state = LayerState::AwaitingGeneration;
        trace!("Layer {} awaiting mesh (revision {})", self.key, self.revision);
        self.revision
    }

    /// Stores a finished mesh.
    ///
    /// # Returns
    /// `false` if the mesh was built from an outdated revision (or the layer
    /// is no longer waiting for one) and was dropped.
    pub fn finish_generation(&mut self, revision: u64, mesh: LayerMesh) -> bool {
        if self.state != LayerState::AwaitingGeneration || revision != self.revision {
            trace!(
                "Layer {} dropped stale mesh (revision {} of {})",
                self.key,
                revision,
                self.revision
            );
            return false;
        }
        self.mesh = Some(mesh);
        self.state = LayerState::Generated;
        true
    }

    /// Uploads the generated mesh, creating GPU buffers on first upload and
    /// updating them afterwards.
    pub fn upload(&mut self, backend: &mut dyn RenderBackend) -> Result<()> {
        if self.state != LayerState::Generated {
            return Ok(());
        }
        let Some(mesh) = self.mesh.take() else {
            return Ok(());
        };

        let label = self.key.to_string();
        let origin = self.origin();
        let extent = LayerExtent::new(CHUNK_WIDTH, self.height, CHUNK_DEPTH);
        self.opaque = Self::sync(
            backend,
            self.opaque,
            &format!("{label} opaque"),
            (origin, extent),
            &mesh.opaque,
        )?;
        self.alpha = Self::sync(
            backend,
            self.alpha,
            &format!("{label} alpha"),
            (origin, extent),
            &mesh.alpha,
        )?;

        self.state = LayerState::Uploaded;
        self.uploads += 1;
        trace!("Layer {} uploaded ({} faces)", self.key, mesh.face_count());
        Ok(())
    }

    fn sync(
        backend: &mut dyn RenderBackend,
        current: Option<GpuMesh>,
        label: &str,
        (origin, extent): (Point3<f32>, LayerExtent),
        data: &MeshData,
    ) -> Result<Option<GpuMesh>> {
        match current {
            _ if data.is_empty() => {
                if let Some(gpu) = current {
                    backend.destroy_mesh(gpu.handle);
                }
                Ok(None)
            }
            Some(gpu) => {
                backend.update_mesh(gpu.handle, data)?;
                Ok(Some(GpuMesh {
                    handle: gpu.handle,
                    index_count: data.index_count(),
                }))
            }
            None => {
                let handle = backend.create_mesh(label, origin, extent, data)?;
                Ok(Some(GpuMesh {
                    handle,
                    index_count: data.index_count(),
                }))
            }
        }
    }

    /// Settles a dirty layer whose slab became empty: its buffers are released
    /// and no mesh is built.
    pub fn settle_empty(&mut self, backend: &mut dyn RenderBackend) {
        if self.state != LayerState::Dirty {
            return;
        }
        self.release(backend);
        self.mesh = None;
        self.state = LayerState::Uploaded;
        trace!("Layer {} emptied", self.key);
    }

    fn release(&mut self, backend: &mut dyn RenderBackend) {
        for gpu in [self.opaque.take(), self.alpha.take()].into_iter().flatten() {
            backend.destroy_mesh(gpu.handle);
        }
    }

    /// Invalidates the layer's mesh and cached culling state.
    pub fn mark_dirty(&mut self, cause: DirtyCause) {
        if self.state == LayerState::Deleted {
            return;
        }
        self.revision += 1;
        self.empty = None;
        self.culled = false;
        if self.state != LayerState::Unpopulated {
            self.mesh = None;
            self.state = LayerState::Dirty;
        }
        trace!("Layer {} marked dirty ({:?}), revision {}", self.key, cause, self.revision);
    }

    /// Releases the layer's GPU buffers for good.
    pub fn delete(&mut self, backend: &mut dyn RenderBackend) {
        self.release(backend);
        self.mesh = None;
        self.state = LayerState::Deleted;
    }

    #[cfg(test)]
    pub(crate) fn force_state(&mut self, state: LayerState) {
        self.state = state;
    }
}

/// All layers of all resident chunks.
#[derive(Debug)]
pub struct LayerSet {
    layer_height: usize,
    layers: BTreeMap<LayerKey, ChunkLayer>,
}

impl LayerSet {
    /// Creates an empty set cutting chunks into slabs of `layer_height` rows.
    /// A height that does not divide the chunk leaves a shorter top layer.
    pub fn new(layer_height: usize) -> Self {
        LayerSet {
            layer_height: layer_height.clamp(1, CHUNK_HEIGHT),
            layers: BTreeMap::new(),
        }
    }

    pub fn layer_height(&self) -> usize {
        self.layer_height
    }

    pub fn layers_per_chunk(&self) -> usize {
        CHUNK_HEIGHT.div_ceil(self.layer_height)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Creates every layer of a newly resident chunk.
    pub fn insert_chunk(&mut self, coord: ChunkCoord, chunk: MtResource<Chunk>) {
        for index in 0..self.layers_per_chunk() {
            let base_y = index * self.layer_height;
            let height = self.layer_height.min(CHUNK_HEIGHT - base_y);
            let key = LayerKey::new(coord, index);
            self.layers
                .insert(key, ChunkLayer::new(key, base_y, height, chunk.clone()));
        }
    }

    /// Removes every layer of a chunk. The caller deletes them.
    pub fn remove_chunk(&mut self, coord: ChunkCoord) -> Vec<ChunkLayer> {
        let keys: Vec<LayerKey> = self.layers_of(coord).iter().map(|layer| layer.key()).collect();
        keys.into_iter()
            .filter_map(|key| self.layers.remove(&key))
            .collect()
    }

    /// The layers of a chunk, bottom first.
    pub fn layers_of(&self, coord: ChunkCoord) -> Vec<&ChunkLayer> {
        self.layers
            .range(LayerKey::new(coord, 0)..=LayerKey::new(coord, usize::MAX))
            .map(|(_, layer)| layer)
            .collect()
    }

    pub fn get(&self, key: LayerKey) -> Option<&ChunkLayer> {
        self.layers.get(&key)
    }

    pub fn get_mut(&mut self, key: LayerKey) -> Option<&mut ChunkLayer> {
        self.layers.get_mut(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChunkLayer> {
        self.layers.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ChunkLayer> {
        self.layers.values_mut()
    }

    /// Marks every layer of a chunk dirty after a neighbouring chunk arrived.
    pub fn mark_chunk_dirty(&mut self, coord: ChunkCoord) {
        for (_, layer) in self
            .layers
            .range_mut(LayerKey::new(coord, 0)..=LayerKey::new(coord, usize::MAX))
        {
            layer.mark_dirty(DirtyCause::NeighborArrived);
        }
    }

    /// Applies one invalidation event.
    ///
    /// # Returns
    /// `false` if the layer does not exist.
    pub fn apply(&mut self, event: LayerEvent) -> bool {
        match self.layers.get_mut(&event.key) {
            Some(layer) => {
                layer.mark_dirty(event.cause);
                true
            }
            None => false,
        }
    }

    /// Stores a finished mesh for `key` if it is still current.
    pub fn accept_mesh(&mut self, key: LayerKey, revision: u64, mesh: LayerMesh) -> bool {
        self.layers
            .get_mut(&key)
            .is_some_and(|layer| layer.finish_generation(revision, mesh))
    }

    fn key_at(&self, x: i32, y: i32, z: i32) -> Option<LayerKey> {
        let (coord, _, local_y, _) = locate(x, y, z)?;
        Some(LayerKey::new(coord, local_y / self.layer_height))
    }

    /// The events a change of the block at world `(x, y, z)` causes.
    ///
    /// The containing layer is always affected. Any other layer holding one
    /// of the 26 surrounding blocks is affected too: its faces or corner
    /// occlusion may read the changed block. Only existing layers are listed.
    pub fn events_for_edit(&self, x: i32, y: i32, z: i32) -> Vec<LayerEvent> {
        let mut events = Vec::new();
        let Some(own) = self.key_at(x, y, z) else {
            return events;
        };
        if self.layers.contains_key(&own) {
            events.push(LayerEvent {
                key: own,
                cause: DirtyCause::BlockEdit,
            });
        }

        for dy in -1..=1 {
            for dz in -1..=1 {
                for dx in -1..=1 {
                    let Some(key) = self.key_at(x + dx, y + dy, z + dz) else {
                        continue;
                    };
                    if key == own
                        || !self.layers.contains_key(&key)
                        || events.iter().any(|event: &LayerEvent| event.key == key)
                    {
                        continue;
                    }
                    events.push(LayerEvent {
                        key,
                        cause: DirtyCause::NeighborEdit,
                    });
                }
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::{
        buffer_state::RecordingBackend, rendering::vertex::CompressedVertex,
    };

    fn chunk_at(coord: ChunkCoord) -> MtResource<Chunk> {
        MtResource::new(Chunk::new(0, coord))
    }

    fn mesh(opaque_quads: usize, alpha_quads: usize) -> LayerMesh {
        let data = |quads: usize| MeshData {
            vertices: vec![CompressedVertex::default(); quads * 4],
            indices: vec![0; quads * 6],
        };
        LayerMesh {
            opaque: data(opaque_quads),
            alpha: data(alpha_quads),
            faces: [0; 7],
            emitted_vertices: (opaque_quads + alpha_quads) * 4,
        }
    }

    #[test]
    fn chunks_are_cut_into_layers() {
        let mut layers = LayerSet::new(32);
        layers.insert_chunk(ChunkCoord::new(2, -1), chunk_at(ChunkCoord::new(2, -1)));
        let of_chunk = layers.layers_of(ChunkCoord::new(2, -1));
        assert_eq!(of_chunk.len(), 8);
        assert_eq!(of_chunk[3].base_y(), 96);
        assert_eq!(of_chunk[3].center(), Point3::new(80.0, 112.0, -16.0));
        assert!(layers.layers_of(ChunkCoord::new(2, 0)).is_empty());

        let mut uneven = LayerSet::new(48);
        uneven.insert_chunk(ChunkCoord::new(0, 0), chunk_at(ChunkCoord::new(0, 0)));
        let of_chunk = uneven.layers_of(ChunkCoord::new(0, 0));
        assert_eq!(of_chunk.len(), 6);
        assert_eq!(of_chunk[5].height(), 16);

        assert_eq!(layers.remove_chunk(ChunkCoord::new(2, -1)).len(), 8);
        assert!(layers.is_empty());
    }

    #[test]
    fn layers_walk_the_state_machine() {
        let mut backend = RecordingBackend::new();
        let key = LayerKey::new(ChunkCoord::new(0, 0), 0);
        let mut layer = ChunkLayer::new(key, 0, 32, chunk_at(key.coord));
        assert_eq!(layer.state(), LayerState::Unpopulated);
        assert!(layer.needs_mesh());

        let revision = layer.begin_generation();
        assert!(!layer.needs_mesh());
        assert!(layer.finish_generation(revision, mesh(2, 1)));
        assert_eq!(layer.state(), LayerState::Generated);

        layer.upload(&mut backend).unwrap();
        assert_eq!(layer.state(), LayerState::Uploaded);
        assert_eq!(layer.uploads(), 1);
        assert_eq!(layer.opaque_mesh().unwrap().index_count, 12);
        assert_eq!(backend.live_meshes(), 2);

        layer.mark_dirty(DirtyCause::BlockEdit);
        assert_eq!(layer.state(), LayerState::Dirty);
        assert!(layer.has_gpu_mesh());

        let revision = layer.begin_generation();
        assert!(layer.finish_generation(revision, mesh(3, 0)));
        layer.upload(&mut backend).unwrap();
        assert_eq!(layer.uploads(), 2);
        assert_eq!(backend.created_meshes(), 2);
        assert_eq!(backend.live_meshes(), 1);
        assert!(layer.alpha_mesh().is_none());

        layer.delete(&mut backend);
        assert_eq!(layer.state(), LayerState::Deleted);
        assert_eq!(backend.live_meshes(), 0);
        layer.mark_dirty(DirtyCause::BlockEdit);
        assert_eq!(layer.state(), LayerState::Deleted);
    }

    #[test]
    fn meshes_from_old_revisions_are_dropped() {
        let key = LayerKey::new(ChunkCoord::new(0, 0), 1);
        let mut layer = ChunkLayer::new(key, 32, 32, chunk_at(key.coord));
        let revision = layer.begin_generation();
        layer.mark_dirty(DirtyCause::NeighborArrived);
        assert_eq!(layer.state(), LayerState::Dirty);
        assert!(!layer.finish_generation(revision, mesh(1, 0)));
        assert!(layer.needs_mesh());

        let revision = layer.begin_generation();
        assert!(layer.finish_generation(revision, mesh(1, 0)));
        assert!(!layer.finish_generation(revision, mesh(1, 0)));
    }

    #[test]
    fn the_empty_flag_is_cached_until_marked_dirty() {
        let key = LayerKey::new(ChunkCoord::new(0, 0), 1);
        let chunk = chunk_at(key.coord);
        let mut layer = ChunkLayer::new(key, 32, 32, chunk.clone());
        assert_eq!(layer.cached_empty(), None);
        assert!(layer.is_empty());

        chunk.get_mut().set_block(4, 40, 4, 1);
        assert_eq!(layer.cached_empty(), Some(true));
        assert!(layer.is_empty());

        layer.mark_dirty(DirtyCause::BlockEdit);
        assert_eq!(layer.cached_empty(), None);
        assert!(!layer.is_empty());
        assert_eq!(layer.state(), LayerState::Unpopulated);
    }

    #[test]
    fn emptied_layers_release_their_buffers() {
        let mut backend = RecordingBackend::new();
        let key = LayerKey::new(ChunkCoord::new(0, 0), 0);
        let mut layer = ChunkLayer::new(key, 0, 32, chunk_at(key.coord));
        let revision = layer.begin_generation();
        layer.finish_generation(revision, mesh(1, 0));
        layer.upload(&mut backend).unwrap();

        layer.settle_empty(&mut backend);
        assert!(layer.has_gpu_mesh());

        layer.mark_dirty(DirtyCause::BlockEdit);
        layer.settle_empty(&mut backend);
        assert_eq!(layer.state(), LayerState::Uploaded);
        assert!(!layer.has_gpu_mesh());
        assert_eq!(backend.live_meshes(), 0);
    }

    #[test]
    fn edits_reach_neighbouring_layers_and_chunks() {
        let mut layers = LayerSet::new(32);
        for coord in [ChunkCoord::new(0, 0), ChunkCoord::new(-1, 0)] {
            layers.insert_chunk(coord, chunk_at(coord));
        }

        let inner = layers.events_for_edit(10, 40, 10);
        assert_eq!(inner.len(), 1);
        assert_eq!(inner[0].key, LayerKey::new(ChunkCoord::new(0, 0), 1));
        assert_eq!(inner[0].cause, DirtyCause::BlockEdit);

        let corner = layers.events_for_edit(0, 32, 5);
        let keys: Vec<LayerKey> = corner.iter().map(|event| event.key).collect();
        assert_eq!(keys.len(), 4);
        assert!(keys.contains(&LayerKey::new(ChunkCoord::new(0, 0), 0)));
        assert!(keys.contains(&LayerKey::new(ChunkCoord::new(-1, 0), 0)));
        assert!(keys.contains(&LayerKey::new(ChunkCoord::new(-1, 0), 1)));
        assert_eq!(corner[0].cause, DirtyCause::BlockEdit);

        // The chunk at +Z is not resident, so it is not listed.
        assert_eq!(layers.events_for_edit(10, 40, 31).len(), 1);
        assert!(layers.events_for_edit(10, 400, 10).is_empty());
    }
}
