//! Per-vertex ambient occlusion.
//!
//! Each corner of a face looks at the two blocks beside it and the block
//! diagonally across it, all one step out along the face normal. The corner's
//! occlusion level is the number of those that are occlusion-solid, except
//! that two solid sides always give the maximum level whatever the diagonal
//! holds. Each level darkens the vertex by [`AO_STEP`].
//!
//! A block's 27-cell neighbourhood is cached while its faces are emitted, so
//! cells shared between corners and between faces are only looked up once.

use cgmath::{Point3, Vector3};

use super::mesh::face::{tangents, CORNER_SIGNS};
use crate::engine_state::voxels::{
    block::{block_side::BlockSide, BlockCatalog},
    world::BlockAccess,
};

/// Darkening contributed by each occlusion level.
pub const AO_STEP: f32 = 0.15;

/// Highest occlusion level a corner can reach.
pub const MAX_OCCLUSION_LEVEL: u8 = 3;

/// Occlusion level (0 to 3) of one face corner.
pub fn occlusion_level(side1: bool, side2: bool, corner: bool) -> u8 {
    if side1 && side2 {
        MAX_OCCLUSION_LEVEL
    } else {
        side1 as u8 + side2 as u8 + corner as u8
    }
}

/// Darkening factor of one face corner: its occlusion level times [`AO_STEP`].
pub fn vertex_ao(side1: bool, side2: bool, corner: bool) -> f32 {
    occlusion_level(side1, side2, corner) as f32 * AO_STEP
}

/// Occlusion of the four corners of one face.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FaceOcclusion {
    /// Levels in lower-left, lower-right, upper-right, upper-left order.
    pub levels: [u8; 4],
    /// Split the quad along the lower-right/upper-left diagonal instead of
    /// the lower-left/upper-right one.
    pub flip: bool,
}

impl FaceOcclusion {
    pub fn from_levels(levels: [u8; 4]) -> Self {
        let flip = !(levels[0] + levels[2] > levels[1] + levels[3]);
        FaceOcclusion { levels, flip }
    }

    /// A face with no occlusion at all.
    pub fn none() -> Self {
        Self::from_levels([0; 4])
    }

    /// Darkening factor of each corner.
    pub fn intensities(&self) -> [f32; 4] {
        self.levels.map(|level| level as f32 * AO_STEP)
    }
}

/// Lazily filled occlusion-solidity cache of the 3×3×3 cells around a block.
pub struct OcclusionNeighborhood<'a, A: BlockAccess> {
    access: &'a A,
    catalog: &'a BlockCatalog,
    center: Point3<i32>,
    cells: [Option<bool>; 27],
}

impl<'a, A: BlockAccess> OcclusionNeighborhood<'a, A> {
    /// Creates the cache for the block at world position `center`.
    pub fn new(access: &'a A, catalog: &'a BlockCatalog, center: Point3<i32>) -> Self {
        OcclusionNeighborhood {
            access,
            catalog,
            center,
            cells: [None; 27],
        }
    }

    /// Whether the cell at `offset` (each component in `-1..=1`) occludes.
    pub fn is_occluding(&mut self, offset: Vector3<i32>) -> bool {
        let index = ((offset.x + 1) + (offset.y + 1) * 3 + (offset.z + 1) * 9) as usize;
        if let Some(solid) = self.cells[index] {
            return solid;
        }
        let position = self.center + offset;
        let block = self.access.block_at(position.x, position.y, position.z);
        let solid = self.catalog.is_occlusion_solid(block);
        self.cells[index] = Some(solid);
        solid
    }

    /// Number of cells looked up so far.
    pub fn cached_cells(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_some()).count()
    }

    /// Occlusion of the block's face `side`.
    pub fn face(&mut self, side: BlockSide) -> FaceOcclusion {
        let normal = side.normal();
        let (u, v) = tangents(side);
        let mut levels = [0u8; 4];
        for (level, (su, sv)) in levels.iter_mut().zip(CORNER_SIGNS) {
            let side1 = self.is_occluding(normal + u * su);
            let side2 = self.is_occluding(normal + v * sv);
            let corner = self.is_occluding(normal + u * su + v * sv);
            *level = occlusion_level(side1, side2, corner);
        }
        FaceOcclusion::from_levels(levels)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::engine_state::voxels::block::{BlockId, EMPTY};

    struct Blocks(HashSet<(i32, i32, i32)>);

    impl BlockAccess for Blocks {
        fn block_at(&self, x: i32, y: i32, z: i32) -> BlockId {
            if self.0.contains(&(x, y, z)) {
                1
            } else {
                EMPTY
            }
        }
    }

    #[test]
    fn levels_follow_the_side_side_corner_rule() {
        assert_eq!(occlusion_level(false, false, false), 0);
        assert_eq!(occlusion_level(false, false, true), 1);
        assert_eq!(occlusion_level(true, false, true), 2);
        assert_eq!(occlusion_level(true, true, false), 3);
        assert_eq!(occlusion_level(true, true, true), 3);
    }

    #[test]
    fn vertex_ao_stays_on_the_step_grid() {
        let allowed: Vec<f32> = (0..=3).map(|level| level as f32 * AO_STEP).collect();
        for bits in 0..8u8 {
            let ao = vertex_ao(bits & 1 != 0, bits & 2 != 0, bits & 4 != 0);
            assert!(ao >= 0.0 && ao <= 3.0 * AO_STEP);
            assert!(allowed.iter().any(|value| (value - ao).abs() < 1e-6));
        }
    }

    #[test]
    fn flip_follows_opposite_corner_sums() {
        assert!(FaceOcclusion::none().flip);
        assert!(!FaceOcclusion::from_levels([2, 0, 1, 0]).flip);
        assert!(FaceOcclusion::from_levels([0, 2, 0, 1]).flip);
        assert!(FaceOcclusion::from_levels([1, 1, 1, 1]).flip);
    }

    #[test]
    fn top_face_next_to_a_wall_darkens_its_near_edge() {
        let catalog = BlockCatalog::builtin().unwrap();
        // A block at the origin with a wall one step up along -X.
        let blocks = Blocks([(-1, 1, -1), (-1, 1, 0), (-1, 1, 1)].into_iter().collect());
        let mut neighborhood = OcclusionNeighborhood::new(&blocks, &catalog, Point3::new(0, 0, 0));

        let top = neighborhood.face(BlockSide::TOP);
        // Corners on the -X edge (lower-left and upper-left) see a side and the corner.
        assert_eq!(top.levels, [2, 0, 0, 2]);
        assert_eq!(top.intensities()[0], 2.0 * AO_STEP);

        let bottom = neighborhood.face(BlockSide::BOTTOM);
        assert_eq!(bottom.levels, [0; 4]);
        assert!(neighborhood.cached_cells() <= 18);
    }

    #[test]
    fn two_solid_sides_saturate_regardless_of_corner() {
        let catalog = BlockCatalog::builtin().unwrap();
        let blocks = Blocks([(-1, 1, 0), (0, 1, 1)].into_iter().collect());
        let mut neighborhood = OcclusionNeighborhood::new(&blocks, &catalog, Point3::new(0, 0, 0));
        let top = neighborhood.face(BlockSide::TOP);
        // Upper-left of TOP is the (-X, -Z) corner, lower-left is (-X, +Z).
        assert_eq!(top.levels[0], 3);
    }
}
