//! # Chunk Generation Task
//!
//! This module defines the `ChunkGenerationTask` which generates the voxel
//! content of one chunk on a worker thread. It is scheduled by the streaming
//! system when a chunk enters the view distance.

use std::sync::Arc;

use anyhow::Result;
use log::debug;

use crate::engine_state::{
    task_management::task::{Task, TaskContext, TaskResult},
    voxels::{
        chunk::{Chunk, ChunkCoord},
        generation::TerrainGenerator,
    },
};

/// A task that generates chunk data asynchronously.
///
/// The task only reads the shared, immutable generator. The chunk it produces
/// is owned by the task until its result is applied on the main thread.
pub struct ChunkGenerationTask {
    generator: Arc<TerrainGenerator>,
    coord: ChunkCoord,
}

impl ChunkGenerationTask {
    /// Creates a new chunk generation task.
    ///
    /// # Arguments
    /// * `generator` - The world's terrain generator
    /// * `coord` - The chunk to generate
    pub fn new(generator: Arc<TerrainGenerator>, coord: ChunkCoord) -> Self {
        ChunkGenerationTask { generator, coord }
    }
}

impl Task for ChunkGenerationTask {
    fn process(&self) -> Result<Box<dyn TaskResult + Send>> {
        let chunk = self.generator.generate(self.coord)?;
        Ok(Box::new(ChunkGenerationTaskResult { chunk }))
    }

    fn describe(&self) -> String {
        format!("generation of chunk {}", self.coord)
    }
}

/// The result of a chunk generation task.
pub struct ChunkGenerationTaskResult {
    chunk: Chunk,
}

impl TaskResult for ChunkGenerationTaskResult {
    /// Publishes the chunk into the world and creates its layers.
    ///
    /// If the chunk was evicted while it was being generated the result is
    /// dropped. Otherwise every resident layer of the eight surrounding
    /// chunks is marked dirty: their boundary faces and corner occlusion were
    /// meshed while this chunk still read as empty.
    fn handle_result(self: Box<Self>, context: &mut TaskContext<'_>) -> Result<Vec<Box<dyn Task + Send>>> {
        let coord = self.chunk.coord();
        let Some(chunk) = context.world.accept_generated(self.chunk) else {
            debug!("Discarding chunk {} generated after eviction", coord);
            return Ok(Vec::new());
        };

        context.layers.insert_chunk(coord, chunk);
        for neighbor in coord.surrounding() {
            context.layers.mark_chunk_dirty(neighbor);
        }
        debug!("Chunk {} generated", coord);

        Ok(Vec::new())
    }
}
