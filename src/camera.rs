use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{RenderError, Result};

/// Per-frame camera shared read-only by every vertex invocation of a draw.
///
/// `position` is carried through to the GPU uniform but the shading math does
/// not read it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub projection: Mat4,
    #[serde(default)]
    pub position: Vec3,
}

impl Default for Camera {
    fn default() -> Self {
        Self::identity()
    }
}

impl Camera {
    pub fn new(projection: Mat4, position: Vec3) -> Self {
        Self {
            projection,
            position,
        }
    }

    /// Camera whose projection leaves positions untouched.
    pub fn identity() -> Self {
        Self::new(Mat4::IDENTITY, Vec3::ZERO)
    }

    /// Orthographic projection of the given rectangle onto clip space.
    pub fn orthographic(left: f32, right: f32, bottom: f32, top: f32) -> Self {
        Self::new(
            Mat4::orthographic_rh(left, right, bottom, top, -1.0, 1.0),
            Vec3::ZERO,
        )
    }

    /// Orthographic view of `width` x `height` units centered on the origin.
    pub fn orthographic_sized(width: f32, height: f32) -> Self {
        let mut camera = Self::identity();
        camera.set_size(width, height);
        camera
    }

    /// Refits the projection to a centered `width` x `height` orthographic view,
    /// keeping the position.
    pub fn set_size(&mut self, width: f32, height: f32) {
        let half_w = width.max(1.0) * 0.5;
        let half_h = height.max(1.0) * 0.5;
        self.projection = Mat4::orthographic_rh(-half_w, half_w, -half_h, half_h, -1.0, 1.0);
    }

    /// Rejects cameras that would feed NaN or infinity to the pipeline.
    pub fn validate(&self) -> Result<()> {
        if self.projection.is_finite() && self.position.is_finite() {
            Ok(())
        } else {
            Err(RenderError::NonFiniteCamera)
        }
    }

    pub fn to_uniform(&self) -> CameraUniform {
        CameraUniform {
            projection: self.projection.to_cols_array_2d(),
            position: self.position.into(),
            _pad: 0.0,
        }
    }
}

/// Layout of the camera at group 0, binding 0.
///
/// Mirrors `struct Camera { projection: mat4x4<f32>, position: vec3<f32> }`,
/// whose WGSL size rounds up to 80 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CameraUniform {
    pub projection: [[f32; 4]; 4],
    pub position: [f32; 3],
    pub _pad: f32,
}

impl CameraUniform {
    pub const SIZE: u64 = std::mem::size_of::<CameraUniform>() as u64;
}
