use std::env;
use std::fs;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use log::{info, warn};

use polygon_stage::render::{render_cpu, render_gpu};
use polygon_stage::{Backend, ColorTarget, GpuContext, RenderError, Scene};

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        log::error!("{err:?}");
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse(env::args().skip(1))?;
    let xml = fs::read_to_string(&options.path)
        .with_context(|| format!("failed to read scene {}", options.path))?;
    let scene = Scene::from_xml(&xml).context("failed to parse scene XML")?;

    println!(
        "Loaded scene with {} polygons ({} vertices, {} triangles)",
        scene.polygons.len(),
        scene.vertex_count(),
        scene.triangle_count()
    );
    for polygon in &scene.polygons {
        println!(
            " - {}: {} vertices, {} triangles",
            polygon.name,
            polygon.mesh.vertices.len(),
            polygon.mesh.triangle_count()
        );
    }

    if options.summary_only {
        return Ok(());
    }

    let (target, backend) = render(&scene, options.backend)?;
    println!(
        "Rendered {}x{} with {} backend",
        target.width(),
        target.height(),
        backend_name(backend)
    );

    if let Some(out) = &options.out {
        target
            .save_png(out)
            .with_context(|| format!("failed to write {out}"))?;
        info!("wrote {out}");
        println!("Wrote {out}");
    }
    Ok(())
}

/// Renders on the requested backend, dropping to the CPU when no GPU device
/// can be opened.
fn render(scene: &Scene, backend: Backend) -> Result<(ColorTarget, Backend)> {
    match backend {
        Backend::Cpu => Ok((render_cpu(scene)?, Backend::Cpu)),
        Backend::Gpu => match GpuContext::new_blocking() {
            Ok(context) => Ok((render_gpu(scene, Arc::new(context))?, Backend::Gpu)),
            Err(err @ (RenderError::NoAdapter | RenderError::RequestDevice(_))) => {
                warn!("GPU unavailable: {err}");
                eprintln!("{err}. Falling back to the cpu backend.");
                Ok((render_cpu(scene)?, Backend::Cpu))
            }
            Err(err) => Err(err.into()),
        },
    }
}

fn backend_name(backend: Backend) -> &'static str {
    match backend {
        Backend::Cpu => "cpu",
        Backend::Gpu => "gpu",
    }
}

#[derive(Debug, PartialEq)]
struct CliOptions {
    path: String,
    out: Option<String>,
    backend: Backend,
    summary_only: bool,
}

impl CliOptions {
    const USAGE: &'static str =
        "Usage: polygon-stage <scene.xml> [--out <file.png>] [--backend cpu|gpu] [--summary-only]";

    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut args = args.into_iter();
        let Some(path) = args.next() else {
            return Err(anyhow!(Self::USAGE));
        };
        let mut out = None;
        let mut backend = Backend::default();
        let mut summary_only = false;
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--out" => {
                    out = Some(
                        args.next()
                            .ok_or_else(|| anyhow!("--out expects a file path"))?,
                    );
                }
                "--backend" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--backend expects cpu or gpu"))?;
                    backend = Backend::parse(&value)
                        .ok_or_else(|| anyhow!("Unknown backend: {value}. Expected cpu or gpu"))?;
                }
                "--summary-only" => summary_only = true,
                other => {
                    return Err(anyhow!("Unknown argument: {other}. {}", Self::USAGE));
                }
            }
        }
        Ok(Self {
            path,
            out,
            backend,
            summary_only,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_all_flags() {
        let options = CliOptions::parse(args(&[
            "scene.xml",
            "--backend",
            "cpu",
            "--out",
            "frame.png",
            "--summary-only",
        ]))
        .unwrap();
        assert_eq!(
            options,
            CliOptions {
                path: "scene.xml".to_string(),
                out: Some("frame.png".to_string()),
                backend: Backend::Cpu,
                summary_only: true,
            }
        );
    }

    #[test]
    fn defaults_to_gpu_without_output() {
        let options = CliOptions::parse(args(&["scene.xml"])).unwrap();
        assert_eq!(options.backend, Backend::Gpu);
        assert!(options.out.is_none());
        assert!(!options.summary_only);
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(CliOptions::parse(args(&[])).is_err());
        assert!(CliOptions::parse(args(&["scene.xml", "--backend", "metal"])).is_err());
        assert!(CliOptions::parse(args(&["scene.xml", "--out"])).is_err());
        assert!(CliOptions::parse(args(&["scene.xml", "--fast"])).is_err());
    }
}
