use cgmath::{Point3, Vector3};

use crate::engine_state::voxels::block::block_side::BlockSide;

/// Signs of the four corners of a face along its `(u, v)` tangent axes, in
/// the order lower-left, lower-right, upper-right, upper-left.
pub const CORNER_SIGNS: [(i32, i32); 4] = [(-1, -1), (1, -1), (1, 1), (-1, 1)];

/// Tangent axes `(u, v)` of a face, chosen so that `u × v` is the face normal.
///
/// Walking the corners in [`CORNER_SIGNS`] order is then counter-clockwise
/// when the face is seen from outside the block.
pub fn tangents(side: BlockSide) -> (Vector3<i32>, Vector3<i32>) {
    match side {
        BlockSide::FRONT => (Vector3::new(1, 0, 0), Vector3::new(0, 1, 0)),
        BlockSide::BACK => (Vector3::new(-1, 0, 0), Vector3::new(0, 1, 0)),
        BlockSide::BOTTOM => (Vector3::new(1, 0, 0), Vector3::new(0, 0, 1)),
        BlockSide::TOP => (Vector3::new(1, 0, 0), Vector3::new(0, 0, -1)),
        BlockSide::LEFT => (Vector3::new(0, 0, 1), Vector3::new(0, 1, 0)),
        BlockSide::RIGHT => (Vector3::new(0, 0, -1), Vector3::new(0, 1, 0)),
    }
}

fn to_f32(vector: Vector3<i32>) -> Vector3<f32> {
    Vector3::new(vector.x as f32, vector.y as f32, vector.z as f32)
}

/// Represents a single quad face of a voxel in the mesh.
///
/// A face is defined by four corner points (lower-left, lower-right,
/// upper-right, upper-left) in layer-local coordinates, plus the side of the
/// block it covers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Face {
    pub ll: Point3<f32>,
    pub lr: Point3<f32>,
    pub ur: Point3<f32>,
    pub ul: Point3<f32>,
    pub block_side: BlockSide,
}

impl Face {
    /// Creates the face `block_side` of the block whose minimum corner is at
    /// layer-local `(i, j, k)`.
    pub fn new(i: f32, j: f32, k: f32, block_side: BlockSide) -> Self {
        let normal = to_f32(block_side.normal());
        let (u, v) = tangents(block_side);
        let (u, v) = (to_f32(u), to_f32(v));
        let center = Point3::new(i + 0.5, j + 0.5, k + 0.5) + normal * 0.5;
        let corner = |(su, sv): (i32, i32)| center + u * (0.5 * su as f32) + v * (0.5 * sv as f32);

        Face {
            ll: corner(CORNER_SIGNS[0]),
            lr: corner(CORNER_SIGNS[1]),
            ur: corner(CORNER_SIGNS[2]),
            ul: corner(CORNER_SIGNS[3]),
            block_side,
        }
    }

    /// Corners in lower-left, lower-right, upper-right, upper-left order.
    pub fn corners(&self) -> [Point3<f32>; 4] {
        [self.ll, self.lr, self.ur, self.ul]
    }
}

/// Texture coordinates of the four corners, matching [`Face::corners`].
pub const FACE_UVS: [[f32; 2]; 4] = [[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]];

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::InnerSpace;

    #[test]
    fn tangents_span_the_normal() {
        for side in BlockSide::all() {
            let (u, v) = tangents(side);
            assert_eq!(u.cross(v), side.normal(), "{side:?}");
        }
    }

    #[test]
    fn faces_lie_on_the_block_boundary_and_wind_outward() {
        for side in BlockSide::all() {
            let face = Face::new(2.0, 3.0, 4.0, side);
            let normal = to_f32(side.normal());
            let winding = (face.lr - face.ll).cross(face.ur - face.ll).normalize();
            assert!((winding - normal).magnitude() < 1e-6, "{side:?}");

            for corner in face.corners() {
                for axis in 0..3 {
                    assert!(corner[axis] >= [2.0, 3.0, 4.0][axis]);
                    assert!(corner[axis] <= [3.0, 4.0, 5.0][axis]);
                }
            }
        }

        let top = Face::new(0.0, 0.0, 0.0, BlockSide::TOP);
        assert!(top.corners().iter().all(|corner| corner.y == 1.0));
    }
}
