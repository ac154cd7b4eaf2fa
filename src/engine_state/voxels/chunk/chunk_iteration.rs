//! # Chunk Iteration Module
//!
//! An iterator over the non-empty blocks of a horizontal slab of a chunk.
//!
//! The iterator consults the chunk's row histogram before scanning a row, so
//! rows that hold no blocks (typically everything above the terrain surface)
//! are skipped without reading a single byte of block data.

use cgmath::Point3;

use crate::engine_state::voxels::block::{BlockId, EMPTY};

use super::{Chunk, CHUNK_DEPTH, CHUNK_HEIGHT, CHUNK_WIDTH};

/// Iterates every non-empty block in rows `y_start..y_end` of a chunk.
///
/// Yields local chunk coordinates together with the block id, in storage
/// order (X fastest, then Z, then Y).
pub struct SlabBlockIterator<'a> {
    chunk: &'a Chunk,
    x: usize,
    y: usize,
    z: usize,
    y_end: usize,
}

impl<'a> SlabBlockIterator<'a> {
    /// Creates an iterator over rows `y_start..y_end`, clamped to the chunk height.
    pub fn new(chunk: &'a Chunk, y_start: usize, y_end: usize) -> Self {
        let y_end = y_end.min(CHUNK_HEIGHT);
        let y_end = match chunk.highest_occupied_row() {
            Some(highest) => y_end.min(highest + 1),
            None => y_start,
        };
        let mut iterator = SlabBlockIterator {
            chunk,
            x: 0,
            y: y_start,
            z: 0,
            y_end,
        };
        iterator.skip_empty_rows();
        iterator
    }

    fn skip_empty_rows(&mut self) {
        while self.y < self.y_end && self.chunk.row_count(self.y) == 0 {
            self.y += 1;
            self.x = 0;
            self.z = 0;
        }
    }

    fn advance(&mut self) {
        self.x += 1;
        if self.x == CHUNK_WIDTH {
            self.x = 0;
            self.z += 1;
            if self.z == CHUNK_DEPTH {
                self.z = 0;
                self.y += 1;
                self.skip_empty_rows();
            }
        }
    }
}

impl Iterator for SlabBlockIterator<'_> {
    type Item = (Point3<usize>, BlockId);

    fn next(&mut self) -> Option<Self::Item> {
        while self.y < self.y_end {
            let position = Point3::new(self.x, self.y, self.z);
            let block = self.chunk.block(self.x, self.y, self.z);
            self.advance();
            if block != EMPTY {
                return Some((position, block));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::chunk::ChunkCoord;

    #[test]
    fn yields_only_blocks_inside_the_slab() {
        let mut chunk = Chunk::new(0, ChunkCoord::new(0, 0));
        chunk.set_block(1, 2, 3, 4);
        chunk.set_block(31, 31, 31, 5);
        chunk.set_block(0, 32, 0, 6);
        chunk.set_block(0, 200, 0, 7);

        let first: Vec<_> = SlabBlockIterator::new(&chunk, 0, 32).collect();
        assert_eq!(
            first,
            vec![(Point3::new(1, 2, 3), 4), (Point3::new(31, 31, 31), 5)]
        );

        let second: Vec<_> = SlabBlockIterator::new(&chunk, 32, 64).collect();
        assert_eq!(second, vec![(Point3::new(0, 32, 0), 6)]);

        assert_eq!(SlabBlockIterator::new(&chunk, 64, 96).count(), 0);
        assert_eq!(SlabBlockIterator::new(&chunk, 192, 224).count(), 1);
    }

    #[test]
    fn empty_chunk_yields_nothing() {
        let chunk = Chunk::new(0, ChunkCoord::new(0, 0));
        assert_eq!(SlabBlockIterator::new(&chunk, 0, CHUNK_HEIGHT).count(), 0);
    }
}
