//! # Voxel World
//!
//! This module contains the voxel data side of the engine: what blocks exist,
//! how they are stored, and how terrain is generated.
//!
//! ## Architecture
//!
//! The voxel system is organized into several key components:
//!
//! * **Noise Field**: Seeded, deterministic 2D and 3D coherent noise
//! * **Block**: Block ids, faces and the data-driven block catalog
//! * **Biome**: The climate-indexed biome grid and its upsampled parameters
//! * **Chunk**: Fixed-size columns of blocks with occupancy bookkeeping
//! * **Generation**: The deterministic terrain generator
//! * **World**: The resident chunks around the observer
//! * **Tasks**: Background chunk generation
//!
//! ## Data Flow
//!
//! 1. The streaming system requests chunks that enter the view distance
//! 2. Generation tasks fill them on worker threads
//! 3. Finished chunks are published into the world and their layers created
//! 4. Layers are meshed and uploaded by the render pipeline
//!
//! ## Thread Safety
//!
//! * The catalog, biome map and generator are immutable and shared via `Arc`
//! * Chunks are shared as `MtResource<Chunk>`; workers only take read locks
//! * The world itself is only touched on the main thread

pub mod biome;
pub mod block;
pub mod chunk;
pub mod generation;
pub mod noise_field;
pub mod tasks;
pub mod world;
