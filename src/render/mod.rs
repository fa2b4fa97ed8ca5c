//! Hosts that run the polygon shader over a `Scene`.
//!
//! `Backend::Gpu` drives the WGSL stage through wgpu; `Backend::Cpu` drives the
//! reference stage through the software rasterizer. Both clear the target,
//! draw polygons in file order and return the attachment as a `ColorTarget`.

pub mod gpu;

use std::sync::Arc;

use log::debug;

pub use gpu::{GpuContext, PolygonRenderer};

use crate::error::Result;
use crate::raster::{ColorTarget, Rasterizer};
use crate::scene::Scene;
use crate::shader::PolygonShader;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    Cpu,
    #[default]
    Gpu,
}

impl Backend {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "cpu" => Some(Self::Cpu),
            "gpu" => Some(Self::Gpu),
            _ => None,
        }
    }
}

/// Renders `scene` with the software rasterizer.
pub fn render_cpu(scene: &Scene) -> Result<ColorTarget> {
    scene.validate()?;
    let settings = &scene.settings;
    let mut target = ColorTarget::new(settings.width, settings.height)?;
    target.clear(settings.clear_color);

    let rasterizer = Rasterizer::new(PolygonShader, settings.blend);
    for polygon in &scene.polygons {
        let stats = rasterizer.draw(
            &mut target,
            &scene.camera,
            &polygon.mesh.vertices,
            polygon.mesh.indices.as_deref(),
        );
        debug!("{}: {stats:?}", polygon.name);
    }
    Ok(target)
}

/// Renders `scene` on the device held by `context`.
pub fn render_gpu(scene: &Scene, context: Arc<GpuContext>) -> Result<ColorTarget> {
    scene.validate()?;
    let mut renderer = PolygonRenderer::new(context, scene.settings)?;
    renderer.update_camera(scene.camera)?;
    for polygon in &scene.polygons {
        renderer.prep_polygon(polygon.mesh.clone());
    }
    renderer.finish_prep()?;
    renderer.render()
}

/// Renders `scene` with `backend`, acquiring a device first when needed.
pub fn render_scene(scene: &Scene, backend: Backend) -> Result<ColorTarget> {
    match backend {
        Backend::Cpu => render_cpu(scene),
        Backend::Gpu => render_gpu(scene, Arc::new(GpuContext::new_blocking()?)),
    }
}
