//! # Chunk Module
//!
//! The `Chunk` struct stores one vertical column of the world: a dense
//! `CHUNK_WIDTH × CHUNK_HEIGHT × CHUNK_DEPTH` grid of block ids.
//!
//! ## Bookkeeping
//!
//! Alongside the block array each chunk maintains:
//! - `row_counts`: how many non-empty blocks each Y row holds
//! - `highest_row`: the highest Y row holding any block, kept in O(1) amortized
//! - `surface_heights`: the generated surface height of every column
//! - `biomes`: the biome id of every column
//!
//! The row histogram lets layers decide "this slab is empty" without touching
//! a single block, and lets iteration skip empty rows entirely.
//!
//! ## Memory Layout
//! Blocks are stored row-major with X fastest, then Z, then Y, so that a full
//! Y row is one contiguous run of `CHUNK_WIDTH * CHUNK_DEPTH` bytes.

use anyhow::{ensure, Result};
use cgmath::Point3;
use num_traits::FromPrimitive;

use super::biome::Biome;
use super::block::{BlockCatalog, BlockId, EMPTY};

pub mod chunk_iteration;

/// Width of a chunk along X, in blocks.
pub const CHUNK_WIDTH: usize = 32;
/// Height of a chunk along Y, in blocks. This is the full world height.
pub const CHUNK_HEIGHT: usize = 256;
/// Depth of a chunk along Z, in blocks.
pub const CHUNK_DEPTH: usize = 32;
/// Number of blocks in one Y row of a chunk.
pub const CHUNK_ROW_SIZE: usize = CHUNK_WIDTH * CHUNK_DEPTH;
/// Total number of blocks in a chunk.
pub const CHUNK_SIZE: usize = CHUNK_ROW_SIZE * CHUNK_HEIGHT;
/// Height of one layer (the unit of meshing and upload), in blocks.
pub const LAYER_HEIGHT: usize = 32;
/// Number of layers stacked in one chunk.
pub const LAYERS_PER_CHUNK: usize = CHUNK_HEIGHT / LAYER_HEIGHT;

/// Integer position of a chunk on the horizontal chunk grid.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkCoord {
    pub x: i32,
    pub z: i32,
}

impl ChunkCoord {
    pub const fn new(x: i32, z: i32) -> Self {
        ChunkCoord { x, z }
    }

    /// The chunk containing world column `(world_x, world_z)`.
    pub fn from_world(world_x: i32, world_z: i32) -> Self {
        ChunkCoord {
            x: world_x.div_euclid(CHUNK_WIDTH as i32),
            z: world_z.div_euclid(CHUNK_DEPTH as i32),
        }
    }

    /// World position of the chunk's `(0, 0, 0)` block.
    pub fn world_origin(self) -> Point3<i32> {
        Point3::new(
            self.x * CHUNK_WIDTH as i32,
            0,
            self.z * CHUNK_DEPTH as i32,
        )
    }

    pub fn offset(self, dx: i32, dz: i32) -> Self {
        ChunkCoord::new(self.x + dx, self.z + dz)
    }

    /// Chessboard distance in chunks.
    pub fn chebyshev_distance(self, other: ChunkCoord) -> i32 {
        (self.x - other.x).abs().max((self.z - other.z).abs())
    }

    /// The eight chunks sharing an edge or a corner with this one.
    pub fn surrounding(self) -> [ChunkCoord; 8] {
        [
            self.offset(-1, -1),
            self.offset(0, -1),
            self.offset(1, -1),
            self.offset(-1, 0),
            self.offset(1, 0),
            self.offset(-1, 1),
            self.offset(0, 1),
            self.offset(1, 1),
        ]
    }
}

impl std::fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

/// One vertical column of the voxel world.
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    seed: u64,
    coord: ChunkCoord,
    blocks: Vec<BlockId>,
    row_counts: Vec<u16>,
    highest_row: Option<usize>,
    surface_heights: Vec<i32>,
    biomes: Vec<u8>,
}

impl Chunk {
    /// Creates an empty chunk for world `seed` at `coord`.
    pub fn new(seed: u64, coord: ChunkCoord) -> Self {
        Chunk {
            seed,
            coord,
            blocks: vec![EMPTY; CHUNK_SIZE],
            row_counts: vec![0; CHUNK_HEIGHT],
            highest_row: None,
            surface_heights: vec![0; CHUNK_ROW_SIZE],
            biomes: vec![0; CHUNK_ROW_SIZE],
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    pub fn world_origin(&self) -> Point3<i32> {
        self.coord.world_origin()
    }

    #[inline]
    fn index(x: usize, y: usize, z: usize) -> usize {
        (y * CHUNK_DEPTH + z) * CHUNK_WIDTH + x
    }

    #[inline]
    fn column_index(x: usize, z: usize) -> usize {
        z * CHUNK_WIDTH + x
    }

    /// Whether local coordinates fall inside the chunk.
    pub fn contains(x: i32, y: i32, z: i32) -> bool {
        (0..CHUNK_WIDTH as i32).contains(&x)
            && (0..CHUNK_HEIGHT as i32).contains(&y)
            && (0..CHUNK_DEPTH as i32).contains(&z)
    }

    /// Block at local coordinates.
    ///
    /// # Panics
    /// Panics if the coordinates lie outside the chunk.
    #[inline]
    pub fn block(&self, x: usize, y: usize, z: usize) -> BlockId {
        self.blocks[Self::index(x, y, z)]
    }

    /// Block at signed local coordinates, or `None` outside the chunk.
    pub fn get_block(&self, x: i32, y: i32, z: i32) -> Option<BlockId> {
        if Self::contains(x, y, z) {
            Some(self.block(x as usize, y as usize, z as usize))
        } else {
            None
        }
    }

    /// Writes a block and keeps the row histogram and highest-row cache in step.
    ///
    /// # Returns
    /// The block id previously stored at that position.
    pub fn set_block(&mut self, x: usize, y: usize, z: usize, id: BlockId) -> BlockId {
        let index = Self::index(x, y, z);
        let previous = self.blocks[index];
        if previous == id {
            return previous;
        }
        self.blocks[index] = id;

        match (previous == EMPTY, id == EMPTY) {
            (true, false) => {
                self.row_counts[y] += 1;
                if self.highest_row.map_or(true, |highest| y > highest) {
                    self.highest_row = Some(y);
                }
            }
            (false, true) => {
                self.row_counts[y] -= 1;
                if self.row_counts[y] == 0 && self.highest_row == Some(y) {
                    self.highest_row = (0..y).rev().find(|&row| self.row_counts[row] > 0);
                }
            }
            _ => {}
        }

        previous
    }

    /// Validated edit used outside of generation. Also keeps the column's
    /// surface height cache in step.
    ///
    /// # Errors
    /// Fails if the position is outside the chunk or `id` is neither empty nor
    /// registered in `catalog`.
    pub fn set_block_checked(
        &mut self,
        catalog: &BlockCatalog,
        x: i32,
        y: i32,
        z: i32,
        id: BlockId,
    ) -> Result<BlockId> {
        ensure!(
            Self::contains(x, y, z),
            "local position ({}, {}, {}) is outside chunk {}",
            x,
            y,
            z,
            self.coord
        );
        ensure!(
            id == EMPTY || catalog.is_registered(id),
            "block id {} is not registered",
            id
        );
        let (x, y, z) = (x as usize, y as usize, z as usize);
        let previous = self.set_block(x, y, z, id);

        let surface = self.surface_height(x, z);
        if id != EMPTY && y as i32 > surface {
            self.set_surface_height(x, z, y as i32);
        } else if id == EMPTY && y as i32 == surface {
            let below = (0..y).rev().find(|&row| self.block(x, row, z) != EMPTY);
            self.set_surface_height(x, z, below.map_or(0, |row| row as i32));
        }

        Ok(previous)
    }

    /// Number of non-empty blocks in row `y`.
    pub fn row_count(&self, y: usize) -> usize {
        self.row_counts[y] as usize
    }

    /// Highest row holding at least one block, or `None` for an empty chunk.
    pub fn highest_occupied_row(&self) -> Option<usize> {
        self.highest_row
    }

    /// Whether rows `y_start..y_end` hold no blocks at all.
    pub fn is_slab_empty(&self, y_start: usize, y_end: usize) -> bool {
        match self.highest_row {
            None => true,
            Some(highest) if highest < y_start => true,
            Some(_) => self.row_counts[y_start..y_end.min(CHUNK_HEIGHT)]
                .iter()
                .all(|&count| count == 0),
        }
    }

    /// Whether every position in rows `y_start..y_end` holds a block.
    pub fn is_slab_full(&self, y_start: usize, y_end: usize) -> bool {
        self.row_counts[y_start..y_end.min(CHUNK_HEIGHT)]
            .iter()
            .all(|&count| count as usize == CHUNK_ROW_SIZE)
    }

    pub fn non_empty_count(&self) -> usize {
        self.row_counts.iter().map(|&count| count as usize).sum()
    }

    /// Cached generated surface height of column `(x, z)`.
    pub fn surface_height(&self, x: usize, z: usize) -> i32 {
        self.surface_heights[Self::column_index(x, z)]
    }

    pub fn set_surface_height(&mut self, x: usize, z: usize, height: i32) {
        self.surface_heights[Self::column_index(x, z)] = height;
    }

    /// Biome of column `(x, z)` as recorded by the generator.
    pub fn biome(&self, x: usize, z: usize) -> Option<Biome> {
        Biome::from_u8(self.biomes[Self::column_index(x, z)])
    }

    pub fn set_biome(&mut self, x: usize, z: usize, biome: Biome) {
        self.biomes[Self::column_index(x, z)] = biome as u8;
    }

    /// The raw block array.
    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }
}
