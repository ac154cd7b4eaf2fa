//! The per-pass layer streaming and render pipeline.
//!
//! Each pass, camera or shadow, runs the same steps over the resident layers:
//!
//! 1. Gather the layers within view distance that are neither outside the
//!    pass's view volume nor empty. The shadow pass first tests whole chunks
//!    against the light volume.
//! 2. Measure the distance from the pass's eye to each layer's centre and sort
//!    ascending.
//! 3. Upload generated meshes, nearest first, while the upload budget lasts.
//! 4. Dispatch mesh tasks for unpopulated and dirty layers, nearest first,
//!    while the generation budget lasts. Inline, the budget covers the mesh
//!    builds themselves. With workers it only covers publishing the tasks;
//!    layers already awaiting a mesh are never dispatched again.
//! 5. Draw opaque geometry near to far, then alpha geometry far to near.
//!
//! Budgets are soft: they are checked between layers, and the first layer of
//! each step is always admitted. Whatever does not fit is picked up by the
//! next pass.

use std::collections::HashMap;

use anyhow::Result;
use cgmath::InnerSpace;
use log::trace;
use web_time::{Duration, Instant};

use crate::engine_state::{
    buffer_state::{DrawPhase, PassKind, RenderBackend},
    camera_state::{Aabb, PassView},
    rendering::{
        layer::{LayerKey, LayerSet, LayerState},
        tasks::layer_mesh_task::LayerMeshTask,
    },
    task_management::TaskManager,
    voxels::{chunk::ChunkCoord, world::World},
};

/// Per-pass limits.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    /// Chebyshev radius, in chunks around the observer, of the layers considered.
    pub view_distance: u32,
    /// Time per pass for dispatching mesh work.
    ///
    /// Measured on the calling thread. With a worker pool this times task
    /// publication only, not the meshing that follows.
    pub generation_budget: Duration,
    /// Time per pass for GPU uploads.
    pub upload_budget: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            view_distance: 6,
            generation_budget: Duration::from_secs_f64(1.0 / 90.0),
            upload_budget: Duration::from_secs_f64(1.0 / 240.0),
        }
    }
}

/// A soft per-pass time budget, checked between units of work.
#[derive(Debug)]
pub struct FrameBudget {
    start: Instant,
    limit: Duration,
    admitted: usize,
}

impl FrameBudget {
    pub fn start(limit: Duration) -> Self {
        FrameBudget {
            start: Instant::now(),
            limit,
            admitted: 0,
        }
    }

    /// Whether one more unit of work fits. The first unit always does.
    pub fn admit(&mut self) -> bool {
        if self.admitted == 0 || self.start.elapsed() < self.limit {
            self.admitted += 1;
            true
        } else {
            false
        }
    }

    pub fn admitted(&self) -> usize {
        self.admitted
    }
}

/// What one pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassStats {
    pub kind: PassKind,
    /// Layers within view distance.
    pub considered: usize,
    /// Layers outside the view volume.
    pub culled: usize,
    /// Layers skipped because their slab is empty.
    pub empty: usize,
    pub uploaded: usize,
    pub deferred_uploads: usize,
    pub dispatched: usize,
    pub deferred_generation: usize,
    pub opaque_draws: usize,
    pub alpha_draws: usize,
}

impl PassStats {
    fn new(kind: PassKind) -> Self {
        PassStats {
            kind,
            considered: 0,
            culled: 0,
            empty: 0,
            uploaded: 0,
            deferred_uploads: 0,
            dispatched: 0,
            deferred_generation: 0,
            opaque_draws: 0,
            alpha_draws: 0,
        }
    }
}

/// Runs camera and shadow passes over a [`LayerSet`].
#[derive(Debug, Default)]
pub struct LayerPipeline {
    config: PipelineConfig,
}

impl LayerPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        LayerPipeline { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs one pass.
    ///
    /// # Arguments
    /// * `view` - The camera or light view of the pass
    /// * `center` - The chunk the observer is in
    /// * `layers` - All resident layers
    /// * `world` - The chunk store, for mesh task neighbourhoods
    /// * `tasks` - Where mesh tasks are published
    /// * `backend` - Receives uploads and draws
    ///
    /// # Returns
    /// Statistics of the pass, or the first backend error
    pub fn run_pass(
        &self,
        view: &PassView,
        center: ChunkCoord,
        layers: &mut LayerSet,
        world: &World,
        tasks: &mut TaskManager,
        backend: &mut dyn RenderBackend,
    ) -> Result<PassStats> {
        let mut stats = PassStats::new(view.kind);
        let visible = self.gather(view, center, layers, backend, &mut stats);

        let mut uploads = FrameBudget::start(self.config.upload_budget);
        for &(_, key) in &visible {
            let Some(layer) = layers.get_mut(key) else {
                continue;
            };
            if layer.state() != LayerState::Generated {
                continue;
            }
            if !uploads.admit() {
                stats.deferred_uploads += 1;
                continue;
            }
            layer.upload(backend)?;
            stats.uploaded += 1;
        }

        let mut generation = FrameBudget::start(self.config.generation_budget);
        for &(_, key) in &visible {
            let Some(layer) = layers.get_mut(key) else {
                continue;
            };
            if !layer.needs_mesh() {
                continue;
            }
            let Some(neighborhood) = world.neighborhood(key.coord) else {
                continue;
            };
            if !generation.admit() {
                stats.deferred_generation += 1;
                continue;
            }
            let revision = layer.begin_generation();
            tasks.publish_task(Box::new(LayerMeshTask::new(
                key,
                revision,
                neighborhood,
                world.catalog().clone(),
                layer.base_y(),
                layer.height(),
            )));
            stats.dispatched += 1;
        }

        if stats.deferred_uploads > 0 || stats.deferred_generation > 0 {
            trace!(
                "{:?} pass deferred {} uploads and {} mesh builds",
                view.kind,
                stats.deferred_uploads,
                stats.deferred_generation
            );
        }

        backend.begin_pass(view.kind, view.eye, view.view_projection)?;
        for &(_, key) in &visible {
            if let Some(gpu) = layers.get(key).and_then(|layer| layer.opaque_mesh()) {
                backend.draw(gpu.handle, DrawPhase::Opaque)?;
                stats.opaque_draws += 1;
            }
        }
        for &(_, key) in visible.iter().rev() {
            if let Some(gpu) = layers.get(key).and_then(|layer| layer.alpha_mesh()) {
                backend.draw(gpu.handle, DrawPhase::Alpha)?;
                stats.alpha_draws += 1;
            }
        }
        backend.end_pass()?;

        Ok(stats)
    }

    /// Culls and sorts the layers of a pass, nearest first.
    fn gather(
        &self,
        view: &PassView,
        center: ChunkCoord,
        layers: &mut LayerSet,
        backend: &mut dyn RenderBackend,
        stats: &mut PassStats,
    ) -> Vec<(f32, LayerKey)> {
        let view_distance = self.config.view_distance as i32;
        let mut chunk_visible: HashMap<ChunkCoord, bool> = HashMap::new();
        let mut visible = Vec::new();

        for layer in layers.iter_mut() {
            let key = layer.key();
            if layer.state() == LayerState::Deleted || key.coord.chebyshev_distance(center) > view_distance {
                continue;
            }
            stats.considered += 1;

            if view.kind == PassKind::Shadow {
                let inside = *chunk_visible
                    .entry(key.coord)
                    .or_insert_with(|| view.frustum.intersects_aabb(&Aabb::of_chunk(key.coord)));
                if !inside {
                    layer.set_culled(true);
                    stats.culled += 1;
                    continue;
                }
            }
            let culled = !view.frustum.intersects_aabb(layer.bounds());
            layer.set_culled(culled);
            if culled {
                stats.culled += 1;
                continue;
            }

            if layer.is_empty() {
                if layer.needs_mesh() && layer.has_gpu_mesh() {
                    layer.settle_empty(backend);
                }
                stats.empty += 1;
                continue;
            }

            let distance = (layer.center() - view.eye).magnitude();
            visible.push((distance, key));
        }

        visible.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        visible
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cgmath::{Deg, Point3, Vector3};

    use super::*;
    use crate::engine_state::{
        buffer_state::RecordingBackend,
        camera_state::{Camera, LightCamera, Projection},
        rendering::layer::LayerKey,
        task_management::task::TaskContext,
        voxels::{
            block::BlockCatalog,
            chunk::{Chunk, ChunkCoord},
        },
    };

    struct Harness {
        world: World,
        layers: LayerSet,
        tasks: TaskManager,
        backend: RecordingBackend,
        pipeline: LayerPipeline,
    }

    impl Harness {
        fn new(generation_budget: Duration, upload_budget: Duration) -> Self {
            let catalog = Arc::new(BlockCatalog::builtin().unwrap());
            let water = catalog.id("water").unwrap();
            let mut world = World::new(catalog);
            let mut layers = LayerSet::new(32);
            for z in -2..=2 {
                let coord = ChunkCoord::new(0, z);
                let chunk = world.insert_chunk(Chunk::new(0, coord));
                layers.insert_chunk(coord, chunk);
                let origin = coord.world_origin();
                world.set_block(origin.x + 16, 40, origin.z + 16, 1).unwrap();
                world.set_block(origin.x + 20, 40, origin.z + 16, water).unwrap();
            }

            Harness {
                world,
                layers,
                tasks: TaskManager::new(0).unwrap(),
                backend: RecordingBackend::new(),
                pipeline: LayerPipeline::new(PipelineConfig {
                    view_distance: 4,
                    generation_budget,
                    upload_budget,
                }),
            }
        }

        fn unlimited() -> Self {
            Self::new(Duration::from_secs(60), Duration::from_secs(60))
        }

        fn camera() -> PassView {
            Camera::new(
                Point3::new(16.0, 41.0, -20.0),
                Deg(90.0),
                Deg(0.0),
                Projection::new(1, 1, Deg(90.0), 0.1, 500.0),
            )
            .pass_view()
        }

        fn pass(&mut self, view: &PassView) -> PassStats {
            let stats = self
                .pipeline
                .run_pass(
                    view,
                    ChunkCoord::new(0, -1),
                    &mut self.layers,
                    &self.world,
                    &mut self.tasks,
                    &mut self.backend,
                )
                .unwrap();
            let mut context = TaskContext {
                world: &mut self.world,
                layers: &mut self.layers,
            };
            self.tasks.process_completed_tasks(&mut context).unwrap();
            stats
        }

        fn layer(&self, z: i32) -> &crate::engine_state::rendering::layer::ChunkLayer {
            self.layers.get(LayerKey::new(ChunkCoord::new(0, z), 1)).unwrap()
        }
    }

    #[test]
    fn budgets_always_admit_one_unit() {
        let mut budget = FrameBudget::start(Duration::ZERO);
        assert!(budget.admit());
        assert!(!budget.admit());
        assert_eq!(budget.admitted(), 1);

        let mut generous = FrameBudget::start(Duration::from_secs(60));
        assert!((0..10).all(|_| generous.admit()));
    }

    #[test]
    fn layers_are_meshed_then_uploaded_then_drawn() {
        let mut harness = Harness::unlimited();
        let view = Harness::camera();

        let first = harness.pass(&view);
        // Chunks at z = 0, 1, 2 are ahead of the camera; z = -1 holds the
        // camera and z = -2 is behind it.
        assert_eq!(first.dispatched, 4);
        assert_eq!(first.uploaded, 0);
        assert_eq!(first.opaque_draws, 0);
        assert_eq!(harness.layer(0).state(), LayerState::Generated);
        assert_eq!(harness.layer(-2).state(), LayerState::Unpopulated);
        assert!(harness.layer(-2).is_culled());

        let second = harness.pass(&view);
        assert_eq!(second.uploaded, 4);
        assert_eq!(second.dispatched, 0);
        assert_eq!(second.opaque_draws, 4);
        assert_eq!(second.alpha_draws, 4);
        assert_eq!(harness.layer(0).state(), LayerState::Uploaded);
        assert!(second.empty > 0);
    }

    #[test]
    fn opaque_draws_run_near_to_far_and_alpha_far_to_near() {
        let mut harness = Harness::unlimited();
        let view = Harness::camera();
        harness.pass(&view);
        harness.pass(&view);

        let pass = harness.backend.last_pass().unwrap();
        let opaque: Vec<f32> = pass
            .draws
            .iter()
            .filter(|draw| draw.phase == DrawPhase::Opaque)
            .map(|draw| draw.origin.z)
            .collect();
        let alpha: Vec<f32> = pass
            .draws
            .iter()
            .filter(|draw| draw.phase == DrawPhase::Alpha)
            .map(|draw| draw.origin.z)
            .collect();
        assert_eq!(opaque, vec![-32.0, 0.0, 32.0, 64.0]);
        assert_eq!(alpha, vec![64.0, 32.0, 0.0, -32.0]);
        let first_alpha = pass
            .draws
            .iter()
            .position(|draw| draw.phase == DrawPhase::Alpha)
            .unwrap();
        assert!(pass.draws[..first_alpha]
            .iter()
            .all(|draw| draw.phase == DrawPhase::Opaque));
    }

    #[test]
    fn exhausted_budgets_defer_work_to_later_passes() {
        let mut harness = Harness::new(Duration::ZERO, Duration::ZERO);
        let view = Harness::camera();

        let first = harness.pass(&view);
        assert_eq!(first.dispatched, 1);
        assert_eq!(first.deferred_generation, 3);

        let second = harness.pass(&view);
        assert_eq!(second.uploaded, 1);
        assert_eq!(second.dispatched, 1);
        assert_eq!(second.deferred_generation, 2);

        for _ in 0..6 {
            harness.pass(&view);
        }
        for z in -1..=2 {
            assert_eq!(harness.layer(z).state(), LayerState::Uploaded);
        }
    }

    #[test]
    fn layers_in_flight_on_workers_are_not_dispatched_again() {
        let mut harness = Harness::new(Duration::ZERO, Duration::from_secs(60));
        harness.tasks = TaskManager::new(1).unwrap();
        let view = Harness::camera();

        let first = harness.pass(&view);
        assert_eq!(first.dispatched, 1);
        assert_eq!(first.deferred_generation, 3);
        assert!(!harness.layer(-1).needs_mesh());

        // Whether or not the worker has finished, the nearest layer is
        // skipped and the budget goes to the next one.
        let second = harness.pass(&view);
        assert_eq!(second.dispatched, 1);
        assert_eq!(second.deferred_generation, 2);
        assert!(!harness.layer(0).needs_mesh());
        assert_eq!(harness.layer(1).state(), LayerState::Unpopulated);
    }

    #[test]
    fn marking_a_layer_dirty_remeshes_and_reuploads_it() {
        let mut harness = Harness::unlimited();
        let view = Harness::camera();
        harness.pass(&view);
        harness.pass(&view);

        let empty_key = LayerKey::new(ChunkCoord::new(0, 0), 2);
        assert_eq!(harness.layers.get(empty_key).unwrap().cached_empty(), Some(true));
        assert_eq!(harness.layer(0).uploads(), 1);
        let created = harness.backend.created_meshes();

        // The edit fills a block in the empty layer above; without the
        // events nothing is invalidated.
        harness.world.set_block(5, 70, 5, 1).unwrap();
        harness.pass(&view);
        assert_eq!(harness.layers.get(empty_key).unwrap().cached_empty(), Some(true));

        for event in harness.layers.events_for_edit(5, 70, 5) {
            harness.layers.apply(event);
        }
        assert_eq!(harness.layers.get(empty_key).unwrap().cached_empty(), None);

        harness.world.set_block(6, 40, 6, 1).unwrap();
        for event in harness.layers.events_for_edit(6, 40, 6) {
            harness.layers.apply(event);
        }
        assert_eq!(harness.layer(0).state(), LayerState::Dirty);
        assert_eq!(harness.layer(0).cached_empty(), None);

        let remesh = harness.pass(&view);
        assert_eq!(remesh.dispatched, 2);
        // Stale buffers keep drawing until the new mesh is uploaded.
        assert_eq!(remesh.opaque_draws, 4);

        let reupload = harness.pass(&view);
        assert_eq!(reupload.uploaded, 2);
        assert_eq!(harness.layer(0).uploads(), 2);
        assert_eq!(harness.layer(0).state(), LayerState::Uploaded);
        assert_eq!(harness.layers.get(empty_key).unwrap().cached_empty(), Some(false));
        // The opaque buffers of the re-meshed layer were updated in place.
        assert_eq!(harness.backend.created_meshes(), created + 1);
    }

    #[test]
    fn the_shadow_pass_culls_whole_chunks_against_the_light() {
        let mut harness = Harness::unlimited();
        let light = LightCamera::new(Point3::new(16.0, 40.0, 16.0), -Vector3::unit_y(), 24.0, 512.0);
        let stats = harness.pass(&light.pass_view());

        assert_eq!(stats.kind, PassKind::Shadow);
        // Only chunks z = -1, 0, 1 touch the light footprint z in [-8, 40].
        assert_eq!(stats.considered, 5 * 8);
        assert_eq!(stats.culled, 2 * 8);
        assert_eq!(stats.dispatched, 3);
        assert!(harness.layer(2).is_culled());
        assert!(!harness.layer(0).is_culled());
    }
}
