//! Flat-colored 2D polygon rendering stage.
//!
//! The crate centers on one shader: a vertex stage that projects 2D
//! positions through a camera matrix and a fragment stage that emits the
//! interpolated vertex color. It ships as WGSL for a wgpu pipeline and as
//! plain Rust functions driven by a software rasterizer, so the same scene
//! can be rendered on a GPU or headless on the CPU. Window and surface
//! management stay outside of the crate.

pub mod camera;
pub mod error;
pub mod mesh;
pub mod raster;
pub mod render;
pub mod scene;
pub mod settings;
pub mod shader;
pub mod vertex;

pub use camera::{Camera, CameraUniform};
pub use error::{RenderError, Result};
pub use mesh::Mesh;
pub use raster::{ColorTarget, DrawStats, Rasterizer};
pub use render::{render_scene, Backend, GpuContext, PolygonRenderer};
pub use scene::{Scene, ScenePolygon};
pub use settings::{BlendMode, RenderSettings};
pub use shader::{fragment_stage, vertex_stage, PolygonShader, ShaderStage, VertexOutput};
pub use vertex::PolygonVertex;
