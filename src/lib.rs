#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::invalid_rust_codeblocks)]

//! # Voxel Terrain
//!
//! Procedural voxel terrain generation and layered chunk rendering, built with
//! Rust and WGPU.
//!
//! ## Key Modules
//!
//! * `core` - Shared concurrency primitives
//! * `engine_state` - Terrain generation, chunk streaming, meshing and rendering
//!
//! ## Architecture
//!
//! * Deterministic terrain generation from a seed and chunk coordinates
//! * Chunks cut into horizontal layers, meshed on a worker pool
//! * Quantized, deduplicated vertex streams uploaded to a render backend
//! * Per-pass frustum culling and time budgets for the camera and shadow passes
//!
//! ## Usage
//!
//! ```no_run
//! fn main() -> anyhow::Result<()> {
//!     voxel_terrain::run()
//! }
//! ```

use std::f32::consts::TAU;

use anyhow::Result;
use cgmath::{Deg, Point3, Rad, Vector3};
use log::{info, warn};

use engine_state::{
    buffer_state::{RecordingBackend, RenderBackend},
    camera_state::{Camera, LightCamera, Projection},
    config::EngineConfig,
    rendering::wgpu_backend::WgpuBackend,
    EngineState,
};

pub mod core;
pub mod engine_state;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;
const SHADOW_RESOLUTION: u32 = 2048;
const FRAMES: usize = 600;
const STATS_INTERVAL: usize = 60;
/// Radius of the circle the observer walks, in blocks.
const PATH_RADIUS: f32 = 96.0;
const OBSERVER_HEIGHT: f32 = 110.0;

/// Runs the headless terrain driver.
///
/// Loads the configuration named by the first command line argument (or the
/// defaults), renders with wgpu when an adapter is available and in memory
/// otherwise, and walks an observer around a fixed path.
pub fn run() -> Result<()> {
    let mut log_builder = env_logger::Builder::new();
    log_builder
        .target(env_logger::Target::Stdout)
        .parse_env("RUST_LOG")
        .init();

    info!("Logger initialized");

    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!("Loading config from {}", path);
            EngineConfig::load(path)?
        }
        None => {
            info!("No config given, using defaults");
            EngineConfig::default()
        }
    };

    match WgpuBackend::new(WIDTH, HEIGHT, SHADOW_RESOLUTION) {
        Ok(backend) => {
            info!("Rendering with wgpu");
            drive(EngineState::new(config, backend)?)
        }
        Err(err) => {
            warn!("GPU unavailable ({:#}), rendering to the recording backend", err);
            drive(EngineState::new(config, RecordingBackend::new())?)
        }
    }
}

fn drive<B: RenderBackend>(mut engine: EngineState<B>) -> Result<()> {
    let mut camera = Camera::new(
        observer_at(0),
        Deg(90.0),
        Deg(-25.0),
        Projection::new(WIDTH, HEIGHT, Deg(70.0), 0.1, 800.0),
    );
    let mut light = LightCamera::new(camera.position, Vector3::new(-0.4, -1.0, -0.3), 160.0, 600.0);

    for frame in 0..FRAMES {
        camera.position = observer_at(frame);
        camera.yaw = Rad(frame as f32 / FRAMES as f32 * TAU) + Rad::from(Deg(90.0));
        light.recenter(camera.position);

        let update = engine.update(camera.position)?;
        let pass = engine.render(&camera)?;
        let shadow = engine.render_shadow(&light)?;

        if frame % STATS_INTERVAL == 0 {
            info!(
                "Frame {}: chunk {}, {} chunks, {} layers, {} tasks outstanding, {} completed",
                frame,
                update.center,
                engine.world().len(),
                engine.layers().len(),
                engine.outstanding_tasks(),
                update.completed_tasks
            );
            info!(
                "  camera: {} considered, {} culled, {} empty, {} uploaded, {} dispatched, {}+{} draws",
                pass.considered,
                pass.culled,
                pass.empty,
                pass.uploaded,
                pass.dispatched,
                pass.opaque_draws,
                pass.alpha_draws
            );
            info!(
                "  shadow: {} considered, {} culled, {} draws, {} bytes of meshes",
                shadow.considered,
                shadow.culled,
                shadow.opaque_draws + shadow.alpha_draws,
                engine.backend().allocated_memory()
            );
        }
    }

    info!("Finished {} frames", FRAMES);
    Ok(())
}

/// The observer walks a circle around the origin once over the run.
fn observer_at(frame: usize) -> Point3<f32> {
    let angle = frame as f32 / FRAMES as f32 * TAU;
    Point3::new(
        PATH_RADIUS * angle.cos(),
        OBSERVER_HEIGHT,
        PATH_RADIUS * angle.sin(),
    )
}
