//! Task for building the mesh of one chunk layer in a background thread.
//!
//! The task reads its chunk and the eight chunks around it through shared
//! read locks, builds the layer mesh, and hands it back to the main thread.
//! Neighbours that are not resident read as empty.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::engine_state::{
    rendering::{
        layer::LayerKey,
        meshing::mesh::{build_layer_mesh, LayerMesh},
    },
    task_management::task::{Task, TaskContext, TaskResult},
    voxels::{block::BlockCatalog, world::ChunkNeighborhood},
};

/// A task that meshes one layer.
pub struct LayerMeshTask {
    key: LayerKey,
    revision: u64,
    neighborhood: ChunkNeighborhood,
    catalog: Arc<BlockCatalog>,
    base_y: usize,
    layer_height: usize,
}

impl LayerMeshTask {
    /// Creates a new layer mesh task.
    ///
    /// # Arguments
    /// * `key` - The layer to mesh
    /// * `revision` - The layer revision the mesh is built from
    /// * `neighborhood` - The layer's chunk and its resident neighbours
    /// * `catalog` - The block catalog
    /// * `base_y` - The layer's lowest row
    /// * `layer_height` - Rows in the layer
    pub fn new(
        key: LayerKey,
        revision: u64,
        neighborhood: ChunkNeighborhood,
        catalog: Arc<BlockCatalog>,
        base_y: usize,
        layer_height: usize,
    ) -> Self {
        LayerMeshTask {
            key,
            revision,
            neighborhood,
            catalog,
            base_y,
            layer_height,
        }
    }
}

impl Task for LayerMeshTask {
    fn process(&self) -> Result<Box<dyn TaskResult + Send>> {
        let view = self.neighborhood.read();
        let chunk = view
            .center()
            .with_context(|| format!("chunk {} is not resident", self.key.coord))?;
        let mesh = build_layer_mesh(chunk, &view, &self.catalog, self.base_y, self.layer_height);

        Ok(Box::new(LayerMeshTaskResult {
            key: self.key,
            revision: self.revision,
            mesh,
        }))
    }

    fn describe(&self) -> String {
        format!("meshing of layer {}", self.key)
    }
}

/// The result of a layer mesh task.
pub struct LayerMeshTaskResult {
    key: LayerKey,
    revision: u64,
    mesh: LayerMesh,
}

impl TaskResult for LayerMeshTaskResult {
    /// Hands the mesh to its layer. Meshes for evicted layers, or built from
    /// voxel content that has since changed, are dropped.
    fn handle_result(self: Box<Self>, context: &mut TaskContext<'_>) -> Result<Vec<Box<dyn Task + Send>>> {
        context.layers.accept_mesh(self.key, self.revision, self.mesh);
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::{
        rendering::layer::{LayerSet, LayerState},
        voxels::{block::block_side::BlockSide, chunk::ChunkCoord, generation::tests::flat_generator, world::World},
    };

    #[test]
    fn meshes_are_built_against_resident_neighbours() {
        let generator = flat_generator(50.0);
        let mut world = World::new(generator.catalog().clone());
        let mut layers = LayerSet::new(32);
        for coord in [ChunkCoord::new(0, 0), ChunkCoord::new(1, 0)] {
            let chunk = world.insert_chunk(generator.generate(coord).unwrap());
            layers.insert_chunk(coord, chunk);
        }

        let key = LayerKey::new(ChunkCoord::new(0, 0), 1);
        let revision = layers.get_mut(key).unwrap().begin_generation();
        let task = LayerMeshTask::new(
            key,
            revision,
            world.neighborhood(key.coord).unwrap(),
            world.catalog().clone(),
            32,
            32,
        );
        let result = task.process().unwrap();
        let mut context = TaskContext {
            world: &mut world,
            layers: &mut layers,
        };
        result.handle_result(&mut context).unwrap();

        let layer = layers.get(key).unwrap();
        assert_eq!(layer.state(), LayerState::Generated);
        let mesh = layer.pending_mesh().unwrap();
        assert_eq!(mesh.faces_on(BlockSide::TOP), 32 * 32);
        // +X is resident and hides that side; the other three sides face unloaded chunks.
        assert_eq!(mesh.faces_on(BlockSide::RIGHT), 0);
        assert_eq!(mesh.faces_on(BlockSide::LEFT), 19 * 32);
    }

    #[test]
    fn stale_results_are_ignored() {
        let generator = flat_generator(50.0);
        let mut world = World::new(generator.catalog().clone());
        let mut layers = LayerSet::new(32);
        let coord = ChunkCoord::new(0, 0);
        let chunk = world.insert_chunk(generator.generate(coord).unwrap());
        layers.insert_chunk(coord, chunk);

        let key = LayerKey::new(coord, 1);
        let revision = layers.get_mut(key).unwrap().begin_generation();
        let task = LayerMeshTask::new(
            key,
            revision,
            world.neighborhood(coord).unwrap(),
            world.catalog().clone(),
            32,
            32,
        );
        let result = task.process().unwrap();
        layers.mark_chunk_dirty(coord);

        let mut context = TaskContext {
            world: &mut world,
            layers: &mut layers,
        };
        result.handle_result(&mut context).unwrap();
        assert_eq!(layers.get(key).unwrap().state(), LayerState::Dirty);
        assert!(layers.get(key).unwrap().pending_mesh().is_none());
    }
}
