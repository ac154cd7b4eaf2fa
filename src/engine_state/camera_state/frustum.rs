//! View-volume culling.
//!
//! The six clip planes are extracted from a view-projection matrix
//! (Gribb/Hartmann). A box is outside the volume when its vertex furthest
//! along a plane's normal (the positive vertex) is still behind that plane.

use cgmath::{InnerSpace, Matrix, Matrix4, Point3, Vector3, Vector4};

use crate::engine_state::voxels::chunk::{ChunkCoord, CHUNK_DEPTH, CHUNK_HEIGHT, CHUNK_WIDTH};

/// An axis-aligned bounding box in world space.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Aabb {
    pub fn new(min: Point3<f32>, max: Point3<f32>) -> Self {
        Aabb { min, max }
    }

    /// The full-height box of a chunk.
    pub fn of_chunk(coord: ChunkCoord) -> Self {
        let origin = coord.world_origin();
        let min = Point3::new(origin.x as f32, 0.0, origin.z as f32);
        Aabb {
            min,
            max: min + Vector3::new(CHUNK_WIDTH as f32, CHUNK_HEIGHT as f32, CHUNK_DEPTH as f32),
        }
    }

    pub fn center(&self) -> Point3<f32> {
        Point3::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
            (self.min.z + self.max.z) * 0.5,
        )
    }

    /// The corner furthest along `normal`.
    fn positive_vertex(&self, normal: Vector3<f32>) -> Point3<f32> {
        Point3::new(
            if normal.x >= 0.0 { self.max.x } else { self.min.x },
            if normal.y >= 0.0 { self.max.y } else { self.min.y },
            if normal.z >= 0.0 { self.max.z } else { self.min.z },
        )
    }
}

/// The six planes of a view volume, normals pointing inward.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Frustum {
    planes: [Vector4<f32>; 6],
}

impl Frustum {
    /// Extracts the planes of a WGPU-style view-projection matrix, whose
    /// clip-space depth runs from 0 to 1.
    pub fn from_matrix(view_projection: &Matrix4<f32>) -> Self {
        let row = |index: usize| view_projection.row(index);
        let planes = [
            row(3) + row(0), // left
            row(3) - row(0), // right
            row(3) + row(1), // bottom
            row(3) - row(1), // top
            row(2),          // near
            row(3) - row(2), // far
        ]
        .map(|plane| {
            let length = plane.truncate().magnitude();
            if length > f32::EPSILON {
                plane / length
            } else {
                plane
            }
        });

        Frustum { planes }
    }

    fn distance(plane: &Vector4<f32>, point: Point3<f32>) -> f32 {
        plane.x * point.x + plane.y * point.y + plane.z * point.z + plane.w
    }

    pub fn contains_point(&self, point: Point3<f32>) -> bool {
        self.planes.iter().all(|plane| Self::distance(plane, point) >= 0.0)
    }

    /// Whether any part of `aabb` may be inside the volume.
    ///
    /// Conservative: a box near a corner of the volume can pass while lying
    /// just outside it.
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        self.planes
            .iter()
            .all(|plane| Self::distance(plane, aabb.positive_vertex(plane.truncate())) >= 0.0)
    }
}
