//! # Camera State
//!
//! This module holds everything the render pipeline needs to know about the
//! points it renders from:
//! - `Camera`/`Projection`: the observer's perspective camera
//! - `LightCamera`: the orthographic volume of the shadow pass
//! - `Frustum`/`Aabb`: view-volume culling
//! - `CameraUniform`: GPU representation of a pass's camera data
//!
//! Each pass is described by a [`PassView`].

use cgmath::{Matrix4, Point3};

use super::buffer_state::PassKind;

pub mod camera;
pub mod frustum;

pub use camera::{Camera, CameraUniform, LightCamera, Projection};
pub use frustum::{Aabb, Frustum};

/// Everything one render pass needs from its camera.
#[derive(Copy, Clone, Debug)]
pub struct PassView {
    pub kind: PassKind,
    /// The point distances are measured from.
    pub eye: Point3<f32>,
    pub view_projection: Matrix4<f32>,
    pub frustum: Frustum,
}
