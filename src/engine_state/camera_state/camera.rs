//! # Camera Implementation
//!
//! This module contains the cameras the render pipeline draws from:
//! - `Camera`: the observer's perspective camera
//! - `Projection`: perspective projection settings
//! - `LightCamera`: an orthographic volume looking along a directional light
//! - `CameraUniform`: Packed data structure for GPU shaders
//!
//! Both cameras produce a [`PassView`], the view-projection matrix and culling
//! frustum of one pass.

use cgmath::*;
use std::f32::consts::FRAC_PI_2;

use super::{frustum::Frustum, PassView};
use crate::engine_state::buffer_state::PassKind;

/// Transformation matrix to convert from OpenGL's coordinate system to WGPU's.
///
/// NDC depth in WGPU ranges from 0 to 1 instead of -1 to 1. This matrix
/// performs two main transformations:
/// 1. Scales the Z coordinate from [-1, 1] to [-0.5, 0.5]
/// 2. Translates the Z coordinate from [-0.5, 0.5] to [0, 1]
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: cgmath::Matrix4<f32> = cgmath::Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,  // Scale Z from [-1,1] to [-0.5,0.5]
    0.0, 0.0, 0.5, 1.0,  // Translate Z from [-0.5,0.5] to [0,1]
);

/// Safe limit for pitch to prevent gimbal lock
const SAFE_FRAC_PI_2: f32 = FRAC_PI_2 - 0.0001;

/// Represents a first-person camera in 3D space.
///
/// # Fields
/// - `position`: The camera's position in world space
/// - `yaw`: Horizontal rotation (around Y axis) in radians, 0 looks along +X
/// - `pitch`: Vertical rotation (around X axis) in radians
/// - `projection`: The perspective projection of the camera
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Point3<f32>,
    pub yaw: Rad<f32>,
    pub pitch: Rad<f32>,
    pub projection: Projection,
}

impl Camera {
    /// Creates a new camera with the specified position and orientation.
    ///
    /// # Arguments
    /// * `position` - Initial position of the camera in world space
    /// * `yaw` - Initial yaw (horizontal rotation around Y axis)
    /// * `pitch` - Initial pitch, clamped just short of straight up or down
    /// * `projection` - Perspective projection settings
    ///
    /// # Example
    /// ```rust
    /// use cgmath::{Deg, Point3};
    /// use voxel_terrain::engine_state::camera_state::camera::{Camera, Projection};
    ///
    /// let camera = Camera::new(
    ///     Point3::new(0.0, 80.0, 0.0),
    ///     Deg(0.0),
    ///     Deg(-20.0),
    ///     Projection::new(1280, 720, Deg(70.0), 0.1, 1000.0),
    /// );
    /// assert!(camera.forward().x > 0.0);
    /// ```
    pub fn new<V: Into<Point3<f32>>, Y: Into<Rad<f32>>, P: Into<Rad<f32>>>(
        position: V,
        yaw: Y,
        pitch: P,
        projection: Projection,
    ) -> Self {
        let mut camera = Self {
            position: position.into(),
            yaw: yaw.into(),
            pitch: pitch.into(),
            projection,
        };
        camera.clamp_pitch();
        camera
    }

    fn clamp_pitch(&mut self) {
        if self.pitch < -Rad(SAFE_FRAC_PI_2) {
            self.pitch = -Rad(SAFE_FRAC_PI_2);
        } else if self.pitch > Rad(SAFE_FRAC_PI_2) {
            self.pitch = Rad(SAFE_FRAC_PI_2);
        }
    }

    /// The normalized direction the camera is facing.
    pub fn forward(&self) -> Vector3<f32> {
        let (yaw_sin, yaw_cos) = self.yaw.0.sin_cos();
        let (pitch_sin, pitch_cos) = self.pitch.0.sin_cos();
        Vector3::new(pitch_cos * yaw_cos, pitch_sin, pitch_cos * yaw_sin).normalize()
    }

    /// Turns the camera by the given angles.
    pub fn rotate<Y: Into<Rad<f32>>, P: Into<Rad<f32>>>(&mut self, yaw: Y, pitch: P) {
        self.yaw += yaw.into();
        self.pitch += pitch.into();
        self.clamp_pitch();
    }

    /// Calculates the view matrix for this camera.
    ///
    /// The view matrix transforms world coordinates to view (camera) space.
    pub fn calc_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_to_rh(self.position, self.forward(), Vector3::unit_y())
    }

    /// Combined projection and view matrix.
    pub fn view_projection(&self) -> Matrix4<f32> {
        self.projection.calc_matrix() * self.calc_matrix()
    }

    /// View of the camera pass.
    pub fn pass_view(&self) -> PassView {
        let view_projection = self.view_projection();
        PassView {
            kind: PassKind::Camera,
            eye: self.position,
            view_projection,
            frustum: Frustum::from_matrix(&view_projection),
        }
    }
}

/// Represents a camera's projection matrix and related parameters.
///
/// It manages the aspect ratio, field of view, and near/far clipping planes.
#[derive(Debug, Clone)]
pub struct Projection {
    /// Aspect ratio (width / height)
    aspect: f32,
    /// Vertical field of view in radians
    fovy: Rad<f32>,
    /// Near clipping plane distance
    znear: f32,
    /// Far clipping plane distance
    zfar: f32,
}

impl Projection {
    /// Creates a new projection with the given parameters.
    ///
    /// # Arguments
    /// * `width` - Viewport width in pixels
    /// * `height` - Viewport height in pixels
    /// * `fovy` - Vertical field of view (can be any type convertible to `Rad<f32>`)
    /// * `znear` - Near clipping plane distance
    /// * `zfar` - Far clipping plane distance
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        let aspect = width as f32 / height.max(1) as f32;
        let fovy: Rad<f32> = fovy.into();
        Self {
            aspect,
            fovy,
            znear,
            zfar,
        }
    }

    /// Updates the projection's aspect ratio for viewport resizing.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height.max(1) as f32;
    }

    pub fn zfar(&self) -> f32 {
        self.zfar
    }

    /// Calculates the projection matrix.
    ///
    /// Combines the perspective projection with the OpenGL to WGPU coordinate system transform.
    pub fn calc_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }
}

/// An orthographic box looking along a directional light.
///
/// The box is centred on `center`, `2 * half_extent` wide and tall, and
/// `depth` long along the light direction. The shadow pass culls and draws
/// with it.
#[derive(Debug, Clone)]
pub struct LightCamera {
    pub center: Point3<f32>,
    direction: Vector3<f32>,
    pub half_extent: f32,
    pub depth: f32,
}

impl LightCamera {
    /// Creates a light camera.
    ///
    /// # Arguments
    /// * `center` - Centre of the lit volume, usually the observer
    /// * `direction` - Direction the light travels in; need not be normalized
    /// * `half_extent` - Half the width and height of the volume
    /// * `depth` - Length of the volume along the light direction
    pub fn new(center: Point3<f32>, direction: Vector3<f32>, half_extent: f32, depth: f32) -> Self {
        let direction = if direction.magnitude2() > f32::EPSILON {
            direction.normalize()
        } else {
            -Vector3::unit_y()
        };
        LightCamera {
            center,
            direction,
            half_extent,
            depth,
        }
    }

    pub fn direction(&self) -> Vector3<f32> {
        self.direction
    }

    /// Moves the volume to follow the observer.
    pub fn recenter(&mut self, center: Point3<f32>) {
        self.center = center;
    }

    /// The point the light looks from: the near face of the volume.
    pub fn eye(&self) -> Point3<f32> {
        self.center - self.direction * (self.depth * 0.5)
    }

    pub fn view_projection(&self) -> Matrix4<f32> {
        let up = if self.direction.y.abs() > 0.99 {
            Vector3::unit_z()
        } else {
            Vector3::unit_y()
        };
        let view = Matrix4::look_to_rh(self.eye(), self.direction, up);
        let projection = ortho(
            -self.half_extent,
            self.half_extent,
            -self.half_extent,
            self.half_extent,
            0.0,
            self.depth,
        );
        OPENGL_TO_WGPU_MATRIX * projection * view
    }

    /// View of the shadow pass.
    pub fn pass_view(&self) -> PassView {
        let view_projection = self.view_projection();
        PassView {
            kind: PassKind::Shadow,
            eye: self.eye(),
            view_projection,
            frustum: Frustum::from_matrix(&view_projection),
        }
    }
}

/// GPU-friendly representation of camera data for shaders.
///
/// This struct is used to pass camera data to the GPU in a format that matches
/// the layout expected by the shaders.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    // We can't use cgmath with bytemuck directly so we'll have to convert the Matrix4 into a 4x4 f32 array
    view_proj: [[f32; 4]; 4],
    position: [f32; 4],
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraUniform {
    /// Creates a new camera uniform with an identity matrix and zero position.
    pub fn new() -> Self {
        Self {
            view_proj: Matrix4::identity().into(),
            position: [0.0; 4],
        }
    }

    /// Creates the uniform for one pass.
    pub fn from_view(view: &PassView) -> Self {
        let mut uniform = Self::new();
        uniform.update(view.eye, view.view_projection);
        uniform
    }

    /// Updates the view-projection matrix and eye position.
    pub fn update(&mut self, eye: Point3<f32>, view_projection: Matrix4<f32>) {
        self.view_proj = view_projection.into();
        self.position = [eye.x, eye.y, eye.z, 1.0];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Camera {
        Camera::new(
            Point3::new(0.0, 0.0, 0.0),
            Deg(0.0),
            Deg(0.0),
            Projection::new(800, 600, Deg(60.0), 0.1, 100.0),
        )
    }

    #[test]
    fn forward_follows_yaw_and_pitch() {
        let mut camera = camera();
        assert!((camera.forward() - Vector3::unit_x()).magnitude() < 1e-5);

        camera.rotate(Deg(90.0), Deg(0.0));
        assert!((camera.forward() - Vector3::unit_z()).magnitude() < 1e-5);

        camera.rotate(Deg(0.0), Deg(200.0));
        assert!(camera.pitch.0 < FRAC_PI_2);
        assert!(camera.forward().y > 0.99);
    }

    #[test]
    fn points_ahead_project_inside_clip_space() {
        let camera = camera();
        let clip = camera.view_projection() * Vector4::new(10.0, 0.0, 0.0, 1.0);
        let depth = clip.z / clip.w;
        assert!(clip.w > 0.0);
        assert!((0.0..=1.0).contains(&depth));
        assert!((clip.x / clip.w).abs() < 1e-4);
    }

    #[test]
    fn light_volume_spans_its_depth() {
        let light = LightCamera::new(Point3::new(0.0, 64.0, 0.0), Vector3::new(0.3, -1.0, 0.2), 64.0, 256.0);
        let view_projection = light.view_projection();
        let near = view_projection * light.eye().to_homogeneous();
        let far = view_projection * (light.eye() + light.direction() * 256.0).to_homogeneous();
        assert!(near.z.abs() < 1e-4);
        assert!((far.z - 1.0).abs() < 1e-4);

        let straight_down = LightCamera::new(Point3::origin(), -Vector3::unit_y(), 16.0, 32.0);
        let center = straight_down.view_projection() * Point3::new(0.0, 0.0, 0.0).to_homogeneous();
        assert!((center.z - 0.5).abs() < 1e-4);
    }
}
