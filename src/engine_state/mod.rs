//! # Engine State Module
//!
//! The core engine module that ties terrain generation, chunk streaming and
//! layer rendering together.
//!
//! ## Key Components
//!
//! * `EngineState` - The main state container and per-frame entry points
//! * `buffer_state` - The render backend seam and the in-memory backend
//! * `camera_state` - Observer and light cameras, frustum culling
//! * `config` - The JSON engine configuration
//! * `rendering` - Meshing, chunk layers and the per-pass pipeline
//! * `task_management` - The worker pool for generation and meshing
//! * `voxels` - Blocks, biomes, chunks, the world and terrain generation
//!
//! ## Frame Structure
//!
//! A frame is `update(observer)`, then `render(camera)` and
//! `render_shadow(light)`. `update` applies finished background work and
//! re-centres the retained ring of chunks. The render calls each run one pass
//! of the layer pipeline, which dispatches meshing, uploads and draws within
//! its per-pass budgets.
//!
//! All graphics calls happen on the thread that owns the `EngineState`.

use std::sync::Arc;

use anyhow::{Context, Result};
use cgmath::Point3;
use log::{debug, error, info, trace};

use crate::core::MtResource;
use buffer_state::RenderBackend;
use camera_state::{Camera, LightCamera, PassView};
use config::{EngineConfig, StreamingConfig};
use rendering::{
    layer::{ChunkLayer, LayerSet},
    pipeline::{LayerPipeline, PassStats},
};
use task_management::{task::TaskContext, TaskManager};
use voxels::{
    biome::BiomeMap,
    block::{BlockCatalog, BlockId},
    chunk::{Chunk, ChunkCoord},
    generation::TerrainGenerator,
    tasks::chunk_generation_task::ChunkGenerationTask,
    world::World,
};

pub mod buffer_state;
pub mod camera_state;
pub mod config;
pub mod rendering;
pub mod task_management;
pub mod voxels;

/// What one call to [`EngineState::update`] did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateStats {
    /// Chunk in which the observer stands.
    pub center: ChunkCoord,
    /// Task results applied (generated chunks and built meshes).
    pub completed_tasks: usize,
    /// Chunk generations requested.
    pub requested: usize,
    /// Chunks evicted from the retained ring.
    pub evicted: usize,
}

/// The main state container for the terrain engine
///
/// Owns the world, its layers, the worker pool and the render backend. It is
/// generic over the backend so tests can inspect what was rendered.
///
/// # Examples
///
/// ```no_run
/// use cgmath::{Deg, Point3};
/// use voxel_terrain::engine_state::{
///     buffer_state::RecordingBackend,
///     camera_state::{Camera, Projection},
///     config::EngineConfig,
///     EngineState,
/// };
///
/// let mut engine = EngineState::new(EngineConfig::default(), RecordingBackend::new())?;
/// let camera = Camera::new(
///     Point3::new(0.0, 90.0, 0.0),
///     Deg(0.0),
///     Deg(-20.0),
///     Projection::new(1280, 720, Deg(70.0), 0.1, 600.0),
/// );
/// loop {
///     engine.update(camera.position)?;
///     engine.render(&camera)?;
/// }
/// # Ok::<(), anyhow::Error>(())
/// ```
pub struct EngineState<B: RenderBackend> {
    streaming: StreamingConfig,
    catalog: Arc<BlockCatalog>,
    generator: Arc<TerrainGenerator>,
    world: World,
    layers: LayerSet,
    task_manager: TaskManager,
    pipeline: LayerPipeline,
    backend: B,
    center: ChunkCoord,
}

impl<B: RenderBackend> EngineState<B> {
    /// Creates a new engine state with all subsystems initialized
    ///
    /// # Arguments
    ///
    /// * `config` - The engine configuration
    /// * `backend` - Receives every upload and draw
    ///
    /// # Errors
    ///
    /// Any configuration error: an invalid catalog, biome grid or terrain
    /// setting, or a block name that is not registered.
    pub fn new(config: EngineConfig, backend: B) -> Result<Self> {
        config.validate()?;

        let catalog = match &config.catalog_path {
            Some(path) => BlockCatalog::load(path)?,
            None => BlockCatalog::builtin()?,
        };
        let catalog = Arc::new(catalog);
        let biomes = BiomeMap::new(&config.biomes).context("invalid biome configuration")?;
        info!(
            "Loaded {} blocks and {} biomes ({}x{} grid)",
            catalog.len(),
            biomes.entries().len(),
            biomes.size(),
            biomes.size()
        );

        let streaming = config.streaming;
        let generator = TerrainGenerator::new(streaming.seed, config.terrain, biomes, catalog.clone())
            .context("invalid terrain configuration")?;
        let task_manager = TaskManager::new(streaming.workers)?;
        let pipeline = LayerPipeline::new(streaming.pipeline_config());

        info!(
            "Terrain engine ready: seed {}, view distance {}, layers of {} rows",
            streaming.seed, streaming.view_distance, streaming.layer_height
        );

        Ok(EngineState {
            catalog: catalog.clone(),
            generator: Arc::new(generator),
            world: World::new(catalog),
            layers: LayerSet::new(streaming.layer_height),
            task_manager,
            pipeline,
            backend,
            center: ChunkCoord::new(0, 0),
            streaming,
        })
    }

    /// Advances background work and the retained ring.
    ///
    /// Applies every finished generation and meshing result, evicts chunks
    /// that fell out of the ring and requests generation of the missing ones,
    /// nearest first.
    ///
    /// # Errors
    ///
    /// A failed background task. Failures are not retried.
    pub fn update(&mut self, observer: Point3<f32>) -> Result<UpdateStats> {
        self.task_manager.process_queued_tasks();

        let mut context = TaskContext {
            world: &mut self.world,
            layers: &mut self.layers,
        };
        let completed_tasks = match self.task_manager.process_completed_tasks(&mut context) {
            Ok(count) => count,
            Err(err) => {
                error!("Background task failed: {:#}", err);
                return Err(err);
            }
        };

        self.center = ChunkCoord::from_world(observer.x.floor() as i32, observer.z.floor() as i32);
        let plan = self.world.plan_ring(
            self.center,
            self.streaming.view_distance,
            self.streaming.retain_margin,
        );

        for &coord in &plan.to_evict {
            self.evict(coord);
        }

        for &coord in &plan.to_generate {
            if self.world.mark_pending(coord) {
                self.task_manager
                    .publish_task(Box::new(ChunkGenerationTask::new(self.generator.clone(), coord)));
            }
        }

        let stats = UpdateStats {
            center: self.center,
            completed_tasks,
            requested: plan.to_generate.len(),
            evicted: plan.to_evict.len(),
        };
        if stats.requested > 0 || stats.evicted > 0 {
            debug!(
                "Ring around {}: {} requested, {} evicted, {} tasks outstanding",
                self.center,
                stats.requested,
                stats.evicted,
                self.task_manager.outstanding()
            );
        }
        Ok(stats)
    }

    fn evict(&mut self, coord: ChunkCoord) {
        self.world.remove_chunk(coord);
        let mut layers = self.layers.remove_chunk(coord);
        for layer in &mut layers {
            layer.delete(&mut self.backend);
        }
        debug!("Evicted chunk {} ({} layers)", coord, layers.len());
    }

    /// Runs the camera pass.
    ///
    /// # Errors
    ///
    /// A GPU resource failure, which is fatal.
    pub fn render(&mut self, camera: &Camera) -> Result<PassStats> {
        self.run_pass(&camera.pass_view())
    }

    /// Runs the shadow pass from the light's orthographic volume.
    pub fn render_shadow(&mut self, light: &LightCamera) -> Result<PassStats> {
        self.run_pass(&light.pass_view())
    }

    fn run_pass(&mut self, view: &PassView) -> Result<PassStats> {
        let result = self.pipeline.run_pass(
            view,
            self.center,
            &mut self.layers,
            &self.world,
            &mut self.task_manager,
            &mut self.backend,
        );
        if let Err(err) = &result {
            error!("{:?} pass failed: {:#}", view.kind, err);
        }
        result
    }

    /// Replaces one block and invalidates every layer that can see the change.
    ///
    /// # Returns
    ///
    /// The block that was replaced.
    ///
    /// # Errors
    ///
    /// An unregistered id, a position outside the world height, or a chunk
    /// that is not resident.
    pub fn set_block(&mut self, x: i32, y: i32, z: i32, id: BlockId) -> Result<BlockId> {
        let previous = self.world.set_block(x, y, z, id)?;
        if previous == id {
            return Ok(previous);
        }

        let events = self.layers.events_for_edit(x, y, z);
        trace!("Block ({}, {}, {}) set to {}, {} layers invalidated", x, y, z, id, events.len());
        for event in events {
            self.layers.apply(event);
        }
        Ok(previous)
    }

    pub fn chunk_at(&self, coord: ChunkCoord) -> Option<MtResource<Chunk>> {
        self.world.chunk_at(coord)
    }

    pub fn layers_of(&self, coord: ChunkCoord) -> Vec<&ChunkLayer> {
        self.layers.layers_of(coord)
    }

    pub fn catalog(&self) -> &Arc<BlockCatalog> {
        &self.catalog
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn layers(&self) -> &LayerSet {
        &self.layers
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn center(&self) -> ChunkCoord {
        self.center
    }

    /// Background tasks published but not yet applied.
    pub fn outstanding_tasks(&self) -> usize {
        self.task_manager.outstanding()
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{Deg, Vector3};

    use super::*;
    use crate::engine_state::{
        buffer_state::{PassKind, RecordingBackend},
        camera_state::Projection,
        rendering::layer::{LayerKey, LayerState},
    };

    fn flat_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.biomes.grid = vec![vec!["plains".to_string()]];
        config.biomes.upsample_resolution = 4;
        if let Some(plains) = config.biomes.biomes.get_mut("plains") {
            plains.min_height = 40.0;
            plains.max_height = 40.0;
            plains.alt_surface = None;
            plains.alt_filler = None;
        }
        config.terrain.sea_level = None;
        config.terrain.caves.enabled = false;
        config.terrain.ores.enabled = false;
        config.terrain.decoration.enabled = false;
        config.streaming.workers = 0;
        config.streaming.view_distance = 1;
        config.streaming.retain_margin = 1;
        config.streaming.generation_budget_ms = 1000.0;
        config.streaming.upload_budget_ms = 1000.0;
        config
    }

    fn camera() -> Camera {
        Camera::new(
            Point3::new(16.0, 70.0, 16.0),
            Deg(90.0),
            Deg(-30.0),
            Projection::new(800, 600, Deg(90.0), 0.1, 500.0),
        )
    }

    fn engine() -> EngineState<RecordingBackend> {
        EngineState::new(flat_config(), RecordingBackend::new()).unwrap()
    }

    fn frame(engine: &mut EngineState<RecordingBackend>, camera: &Camera) -> PassStats {
        engine.update(camera.position).unwrap();
        engine.render(camera).unwrap()
    }

    #[test]
    fn ring_is_requested_then_generated() {
        let mut engine = engine();
        let stats = engine.update(Point3::new(16.0, 70.0, 16.0)).unwrap();
        assert_eq!(stats.center, ChunkCoord::new(0, 0));
        assert_eq!(stats.requested, 9);
        assert_eq!(engine.world().pending_count(), 9);

        let stats = engine.update(Point3::new(16.0, 70.0, 16.0)).unwrap();
        assert_eq!(stats.completed_tasks, 9);
        assert_eq!(stats.requested, 0);
        assert_eq!(engine.world().len(), 9);
        assert_eq!(engine.layers_of(ChunkCoord::new(-1, 1)).len(), 8);
        assert!(engine.chunk_at(ChunkCoord::new(1, -1)).is_some());
        assert!(engine.chunk_at(ChunkCoord::new(2, 0)).is_none());
    }

    #[test]
    fn frames_mesh_upload_and_draw() {
        let mut engine = engine();
        let camera = camera();

        frame(&mut engine, &camera);
        let stats = frame(&mut engine, &camera);
        assert!(stats.dispatched > 0);
        assert_eq!(stats.opaque_draws, 0);

        let stats = frame(&mut engine, &camera);
        assert!(stats.uploaded > 0);
        assert!(stats.opaque_draws > 0);
        assert_eq!(stats.alpha_draws, 0);
        assert!(engine.backend().live_meshes() > 0);
        assert_eq!(engine.backend().last_pass().unwrap().kind, PassKind::Camera);

        let surface = engine.layers().get(LayerKey::new(ChunkCoord::new(0, 0), 1)).unwrap();
        assert_eq!(surface.state(), LayerState::Uploaded);
        assert!(surface.opaque_mesh().is_some());
    }

    #[test]
    fn shadow_pass_draws_from_the_light() {
        let mut engine = engine();
        let camera = camera();
        let light = LightCamera::new(camera.position, Vector3::new(-0.3, -1.0, -0.2), 64.0, 512.0);

        for _ in 0..3 {
            engine.update(camera.position).unwrap();
            engine.render_shadow(&light).unwrap();
        }
        let pass = engine.backend().last_pass().unwrap();
        assert_eq!(pass.kind, PassKind::Shadow);
        assert!(!pass.draws.is_empty());
    }

    #[test]
    fn leaving_the_ring_evicts_chunks_and_their_buffers() {
        let mut engine = engine();
        let camera = camera();
        for _ in 0..3 {
            frame(&mut engine, &camera);
        }
        assert!(engine.backend().live_meshes() > 0);

        let stats = engine.update(Point3::new(10.0 * 32.0 + 16.0, 70.0, 16.0)).unwrap();
        assert_eq!(stats.evicted, 9);
        assert_eq!(stats.requested, 9);
        assert!(engine.chunk_at(ChunkCoord::new(0, 0)).is_none());
        assert!(engine.layers_of(ChunkCoord::new(0, 0)).is_empty());
        assert_eq!(engine.backend().live_meshes(), 0);
        assert_eq!(engine.backend().allocated_memory(), 0);
    }

    #[test]
    fn block_edits_dirty_the_layer_and_are_remeshed() {
        let mut engine = engine();
        let camera = camera();
        for _ in 0..3 {
            frame(&mut engine, &camera);
        }
        let key = LayerKey::new(ChunkCoord::new(0, 0), 1);
        let uploads = engine.layers().get(key).unwrap().uploads();

        let stone = engine.catalog().id("stone").unwrap();
        assert!(engine.set_block(16, 41, 16, 200).is_err());
        assert!(engine.set_block(16, 400, 16, stone).is_err());
        assert!(engine.set_block(5000, 41, 16, stone).is_err());

        assert_eq!(engine.set_block(16, 41, 16, stone).unwrap(), 0);
        assert_eq!(engine.layers().get(key).unwrap().state(), LayerState::Dirty);

        frame(&mut engine, &camera);
        frame(&mut engine, &camera);
        let layer = engine.layers().get(key).unwrap();
        assert_eq!(layer.state(), LayerState::Uploaded);
        assert_eq!(layer.uploads(), uploads + 1);
    }
}
