//! # World Module
//!
//! This module provides the `World` struct which manages the resident chunks
//! of the voxel world around the observer.
//!
//! ## Architecture
//!
//! The world uses a sparse storage approach: only chunks inside the retained
//! ring around the observer are kept in memory. Chunks are published into the
//! world as `MtResource<Chunk>` once their generation task completes, so
//! meshing tasks on worker threads can hold shared read handles.
//!
//! ## Block Lookups
//!
//! Block reads go through the [`BlockAccess`] trait, in world coordinates.
//! Lookups that fall into a chunk that is not resident, or outside the world's
//! vertical range, answer [`EMPTY`]. Meshing therefore treats unloaded
//! neighbours as non-solid and emits the boundary face.
//!
//! ## Retained Ring
//!
//! [`World::plan_ring`] compares the resident and pending chunks against the
//! observer's chunk and returns which chunks to request (nearest first) and
//! which to evict.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLockReadGuard};

use anyhow::{bail, Context, Result};

use crate::core::MtResource;
use crate::engine_state::voxels::{
    block::{BlockCatalog, BlockId, EMPTY},
    chunk::{Chunk, ChunkCoord, CHUNK_DEPTH, CHUNK_HEIGHT, CHUNK_WIDTH},
};

/// Read access to blocks by world position.
pub trait BlockAccess {
    /// Block at world position `(x, y, z)`, or [`EMPTY`] when it is not resident.
    fn block_at(&self, x: i32, y: i32, z: i32) -> BlockId;
}

/// Splits a world position into the owning chunk and chunk-local coordinates.
///
/// Returns `None` when `y` lies outside the world's vertical range.
pub fn locate(x: i32, y: i32, z: i32) -> Option<(ChunkCoord, usize, usize, usize)> {
    if !(0..CHUNK_HEIGHT as i32).contains(&y) {
        return None;
    }
    let coord = ChunkCoord::from_world(x, z);
    let local_x = x.rem_euclid(CHUNK_WIDTH as i32) as usize;
    let local_z = z.rem_euclid(CHUNK_DEPTH as i32) as usize;
    Some((coord, local_x, y as usize, local_z))
}

/// Chunks the streaming system should request and evict for one observer position.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RingPlan {
    /// Missing chunks within view distance, nearest first.
    pub to_generate: Vec<ChunkCoord>,
    /// Resident or pending chunks beyond the retained ring.
    pub to_evict: Vec<ChunkCoord>,
}

/// The resident chunks of a voxel world.
pub struct World {
    catalog: Arc<BlockCatalog>,
    chunks: HashMap<ChunkCoord, MtResource<Chunk>>,
    /// Chunks whose generation task is in flight.
    pending: HashSet<ChunkCoord>,
}

impl World {
    /// Creates a new, empty world.
    pub fn new(catalog: Arc<BlockCatalog>) -> Self {
        World {
            catalog,
            chunks: HashMap::new(),
            pending: HashSet::new(),
        }
    }

    pub fn catalog(&self) -> &Arc<BlockCatalog> {
        &self.catalog
    }

    /// Handle to the resident chunk at `coord`.
    pub fn chunk_at(&self, coord: ChunkCoord) -> Option<MtResource<Chunk>> {
        self.chunks.get(&coord).cloned()
    }

    pub fn is_resident(&self, coord: ChunkCoord) -> bool {
        self.chunks.contains_key(&coord)
    }

    pub fn is_pending(&self, coord: ChunkCoord) -> bool {
        self.pending.contains(&coord)
    }

    /// Number of resident chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Coordinates of every resident chunk, in no particular order.
    pub fn resident_coords(&self) -> impl Iterator<Item = ChunkCoord> + '_ {
        self.chunks.keys().copied()
    }

    /// Records that generation of `coord` has been requested.
    ///
    /// # Returns
    /// `false` if the chunk is already resident or pending.
    pub fn mark_pending(&mut self, coord: ChunkCoord) -> bool {
        if self.chunks.contains_key(&coord) {
            return false;
        }
        self.pending.insert(coord)
    }

    /// Publishes a generated chunk.
    ///
    /// # Returns
    /// `None` if the chunk was no longer wanted (evicted while its generation
    /// was in flight), in which case it is dropped.
    pub fn accept_generated(&mut self, chunk: Chunk) -> Option<MtResource<Chunk>> {
        let coord = chunk.coord();
        if !self.pending.remove(&coord) {
            return None;
        }
        Some(self.insert_chunk(chunk))
    }

    /// Inserts a chunk directly, replacing any resident chunk at its coordinates.
    pub fn insert_chunk(&mut self, chunk: Chunk) -> MtResource<Chunk> {
        let coord = chunk.coord();
        self.pending.remove(&coord);
        let handle = MtResource::new(chunk);
        self.chunks.insert(coord, handle.clone());
        handle
    }

    /// Removes a chunk, or forgets its pending generation.
    pub fn remove_chunk(&mut self, coord: ChunkCoord) -> Option<MtResource<Chunk>> {
        self.pending.remove(&coord);
        self.chunks.remove(&coord)
    }

    /// Plans the retained ring around `center`.
    ///
    /// Chunks within `view_distance` (Chebyshev, in chunks) that are neither
    /// resident nor pending are returned nearest first, ties broken by
    /// coordinate. Resident or pending chunks farther than
    /// `view_distance + retain_margin` are returned for eviction.
    pub fn plan_ring(&self, center: ChunkCoord, view_distance: u32, retain_margin: u32) -> RingPlan {
        let view = view_distance as i32;
        let retain = view + retain_margin as i32;

        let mut to_generate = Vec::new();
        for dz in -view..=view {
            for dx in -view..=view {
                let coord = center.offset(dx, dz);
                if !self.chunks.contains_key(&coord) && !self.pending.contains(&coord) {
                    to_generate.push(coord);
                }
            }
        }
        to_generate.sort_by_key(|coord| {
            let (dx, dz) = (coord.x - center.x, coord.z - center.z);
            (dx * dx + dz * dz, coord.x, coord.z)
        });

        let mut to_evict: Vec<ChunkCoord> = self
            .chunks
            .keys()
            .chain(self.pending.iter())
            .copied()
            .filter(|coord| coord.chebyshev_distance(center) > retain)
            .collect();
        to_evict.sort();
        to_evict.dedup();

        RingPlan {
            to_generate,
            to_evict,
        }
    }

    /// Writes one block, validating the id and that the chunk is resident.
    ///
    /// # Returns
    /// The block previously stored at that position.
    pub fn set_block(&mut self, x: i32, y: i32, z: i32, id: BlockId) -> Result<BlockId> {
        let Some((coord, local_x, local_y, local_z)) = locate(x, y, z) else {
            bail!("position ({}, {}, {}) is outside the world height", x, y, z);
        };
        let chunk = self
            .chunks
            .get(&coord)
            .with_context(|| format!("chunk {} holding ({}, {}, {}) is not loaded", coord, x, y, z))?;
        let previous = chunk.get_mut().set_block_checked(
            &self.catalog,
            local_x as i32,
            local_y as i32,
            local_z as i32,
            id,
        )?;
        Ok(previous)
    }

    /// Shared handles to `coord` and its eight surrounding chunks.
    ///
    /// # Returns
    /// `None` if the chunk at `coord` itself is not resident.
    pub fn neighborhood(&self, coord: ChunkCoord) -> Option<ChunkNeighborhood> {
        let center = self.chunk_at(coord)?;
        let mut neighbors: [Option<MtResource<Chunk>>; 9] = Default::default();
        for dz in -1..=1 {
            for dx in -1..=1 {
                let slot = ChunkNeighborhood::slot(dx, dz);
                neighbors[slot] = if dx == 0 && dz == 0 {
                    Some(center.clone())
                } else {
                    self.chunk_at(coord.offset(dx, dz))
                };
            }
        }
        Some(ChunkNeighborhood { coord, neighbors })
    }
}

impl BlockAccess for World {
    fn block_at(&self, x: i32, y: i32, z: i32) -> BlockId {
        match locate(x, y, z) {
            Some((coord, local_x, local_y, local_z)) => self
                .chunks
                .get(&coord)
                .map_or(EMPTY, |chunk| chunk.get().block(local_x, local_y, local_z)),
            None => EMPTY,
        }
    }
}

/// A chunk plus whichever of its eight neighbours were resident when the
/// snapshot was taken. Sent to meshing tasks.
#[derive(Clone, Debug)]
pub struct ChunkNeighborhood {
    coord: ChunkCoord,
    neighbors: [Option<MtResource<Chunk>>; 9],
}

impl ChunkNeighborhood {
    fn slot(dx: i32, dz: i32) -> usize {
        ((dz + 1) * 3 + (dx + 1)) as usize
    }

    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    /// Locks every chunk of the neighbourhood for reading.
    pub fn read(&self) -> NeighborhoodView<'_> {
        NeighborhoodView {
            coord: self.coord,
            guards: self
                .neighbors
                .iter()
                .map(|chunk| chunk.as_ref().map(|chunk| chunk.get()))
                .collect(),
        }
    }
}

/// Read-locked view of a [`ChunkNeighborhood`].
pub struct NeighborhoodView<'a> {
    coord: ChunkCoord,
    guards: Vec<Option<RwLockReadGuard<'a, Chunk>>>,
}

impl NeighborhoodView<'_> {
    /// The chunk the neighbourhood is centred on.
    pub fn center(&self) -> Option<&Chunk> {
        self.guards[ChunkNeighborhood::slot(0, 0)].as_deref()
    }
}

impl BlockAccess for NeighborhoodView<'_> {
    fn block_at(&self, x: i32, y: i32, z: i32) -> BlockId {
        let Some((coord, local_x, local_y, local_z)) = locate(x, y, z) else {
            return EMPTY;
        };
        let (dx, dz) = (coord.x - self.coord.x, coord.z - self.coord.z);
        if dx.abs() > 1 || dz.abs() > 1 {
            return EMPTY;
        }
        self.guards[ChunkNeighborhood::slot(dx, dz)]
            .as_deref()
            .map_or(EMPTY, |chunk| chunk.block(local_x, local_y, local_z))
    }
}
