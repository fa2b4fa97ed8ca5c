//! The polygon shader stage.
//!
//! `POLYGON_WGSL` is what the GPU pipeline compiles. The functions and the
//! `PolygonShader` type below are the same two stages written on the CPU, so
//! the software rasterizer and the tests can run them without a device.

use glam::Vec4;

use crate::camera::Camera;
use crate::vertex::PolygonVertex;

/// WGSL source exposing `vs_main` and `fs_main`.
pub const POLYGON_WGSL: &str = include_str!("polygon.wgsl");

pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";

/// What the vertex stage hands to the rasterizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexOutput<V> {
    pub clip_position: Vec4,
    pub varying: V,
}

/// Per-vertex data the rasterizer can blend across a triangle.
pub trait Interpolate: Copy {
    /// Weighted sum of the three corner values; weights sum to one.
    fn interpolate(corners: [Self; 3], weights: [f32; 3]) -> Self;
}

impl Interpolate for Vec4 {
    fn interpolate(corners: [Self; 3], weights: [f32; 3]) -> Self {
        corners[0] * weights[0] + corners[1] * weights[1] + corners[2] * weights[2]
    }
}

/// A vertex + fragment program pair.
///
/// Implementations must be pure: the rasterizer may invoke either stage in
/// any order, any number of times, and shares `Uniform` across invocations.
pub trait ShaderStage {
    type Uniform: Sync;
    type Vertex: Sync;
    type Varying: Interpolate;

    fn vertex_stage(
        &self,
        uniform: &Self::Uniform,
        vertex: &Self::Vertex,
    ) -> VertexOutput<Self::Varying>;

    fn fragment_stage(&self, varying: Self::Varying) -> Vec4;
}

/// Flat-colored polygons under a camera projection.
#[derive(Debug, Default, Clone, Copy)]
pub struct PolygonShader;

impl ShaderStage for PolygonShader {
    type Uniform = Camera;
    type Vertex = PolygonVertex;
    type Varying = Vec4;

    fn vertex_stage(&self, camera: &Camera, vertex: &PolygonVertex) -> VertexOutput<Vec4> {
        let object = vertex.position().extend(0.0).extend(1.0);
        VertexOutput {
            clip_position: camera.projection * object,
            varying: vertex.color(),
        }
    }

    fn fragment_stage(&self, color: Vec4) -> Vec4 {
        color
    }
}

/// Maps one vertex to clip space; the color passes through untouched.
pub fn vertex_stage(camera: &Camera, vertex: &PolygonVertex) -> VertexOutput<Vec4> {
    PolygonShader.vertex_stage(camera, vertex)
}

/// Emits the interpolated color unchanged.
pub fn fragment_stage(color: Vec4) -> Vec4 {
    PolygonShader.fragment_stage(color)
}
