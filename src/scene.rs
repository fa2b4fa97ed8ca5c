use anyhow::{anyhow, bail, Context, Result};
use glam::{Mat4, Vec3, Vec4};
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::camera::Camera;
use crate::mesh::Mesh;
use crate::settings::{BlendMode, RenderSettings};
use crate::vertex::PolygonVertex;

/// Everything needed for one offscreen render: target settings, the camera
/// and the pre-triangulated polygons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Scene {
    pub settings: RenderSettings,
    pub camera: Camera,
    pub polygons: Vec<ScenePolygon>,
}

/// Named polygon mesh as written in the scene file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenePolygon {
    pub name: String,
    pub mesh: Mesh,
}

impl Scene {
    /// Parses a `<scene>` document.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid scene XML")?;
        let root = document.root_element();
        if !root.has_tag_name("scene") {
            bail!("root element must be <scene>");
        }

        let defaults = RenderSettings::default();
        let blend = match optional_text(&root, "blend") {
            Some(value) => BlendMode::parse(&value)
                .ok_or_else(|| anyhow!("unknown blend mode {value:?}"))?,
            None => defaults.blend,
        };
        let settings = RenderSettings {
            width: parse_u32(optional_text(&root, "width"), defaults.width)?,
            height: parse_u32(optional_text(&root, "height"), defaults.height)?,
            clear_color: parse_vec4(optional_text(&root, "clear"), defaults.clear_color)
                .context("invalid <clear>")?,
            blend,
        };

        let camera = match root.children().find(|n| n.has_tag_name("camera")) {
            Some(node) => parse_camera(&node).context("invalid <camera>")?,
            None => Camera::identity(),
        };

        let polygons = root
            .children()
            .filter(|n| n.has_tag_name("polygon"))
            .enumerate()
            .map(|(index, node)| {
                parse_polygon(&node, index).with_context(|| format!("invalid polygon #{index}"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            settings,
            camera,
            polygons,
        })
    }

    /// Runs the host-side checks on the camera and every mesh.
    pub fn validate(&self) -> crate::Result<()> {
        self.camera.validate()?;
        for polygon in &self.polygons {
            polygon.mesh.validate()?;
        }
        Ok(())
    }

    pub fn vertex_count(&self) -> usize {
        self.polygons.iter().map(|p| p.mesh.vertices.len()).sum()
    }

    pub fn triangle_count(&self) -> usize {
        self.polygons.iter().map(|p| p.mesh.triangle_count()).sum()
    }
}

fn parse_camera(node: &Node<'_, '_>) -> Result<Camera> {
    let projection = if let Some(value) = optional_text(node, "projection") {
        let cols = parse_floats(&value, 16, "projection")?;
        Mat4::from_cols_slice(&cols)
    } else if let Some(value) = optional_text(node, "ortho") {
        let v = parse_floats(&value, 4, "ortho")?;
        Camera::orthographic(v[0], v[1], v[2], v[3]).projection
    } else if let Some(value) = optional_text(node, "sized") {
        let v = parse_floats(&value, 2, "sized")?;
        Camera::orthographic_sized(v[0], v[1]).projection
    } else {
        Mat4::IDENTITY
    };
    let position = match optional_text(node, "position") {
        Some(value) => {
            let v = parse_floats(&value, 3, "position")?;
            Vec3::new(v[0], v[1], v[2])
        }
        None => Vec3::ZERO,
    };
    Ok(Camera::new(projection, position))
}

fn parse_polygon(node: &Node<'_, '_>, index: usize) -> Result<ScenePolygon> {
    let name = optional_text(node, "name").unwrap_or_else(|| format!("polygon{index}"));
    let vertices = node
        .children()
        .filter(|n| n.has_tag_name("vertex"))
        .map(|vertex| -> Result<PolygonVertex> {
            let pos = parse_floats(&required_text(&vertex, "pos")?, 2, "pos")?;
            let color = parse_vec4(optional_text(&vertex, "color"), Vec4::ONE)?;
            Ok(PolygonVertex::new([pos[0], pos[1]], color))
        })
        .collect::<Result<Vec<_>>>()?;
    let indices = optional_text(node, "indices")
        .map(|value| {
            value
                .split_whitespace()
                .map(|index| {
                    index
                        .parse::<u16>()
                        .map_err(|err| anyhow!("invalid index {index:?}: {err}"))
                })
                .collect::<Result<Vec<_>>>()
        })
        .transpose()?;
    Ok(ScenePolygon {
        name,
        mesh: Mesh { vertices, indices },
    })
}

fn required_text(node: &Node<'_, '_>, tag: &str) -> Result<String> {
    optional_text(node, tag).ok_or_else(|| anyhow!("<{tag}> tag is missing"))
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    node.children()
        .find(|child| child.has_tag_name(tag))
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn parse_floats(value: &str, expected: usize, what: &str) -> Result<Vec<f32>> {
    let numbers = value
        .split_whitespace()
        .map(|component| {
            component
                .parse::<f32>()
                .map_err(|err| anyhow!("failed to parse {what} component {component:?}: {err}"))
        })
        .collect::<Result<Vec<_>>>()?;
    if numbers.len() != expected {
        bail!(
            "{what} expects {expected} components, found {}",
            numbers.len()
        );
    }
    Ok(numbers)
}

fn parse_vec4(value: Option<String>, default: Vec4) -> Result<Vec4> {
    match value {
        Some(value) => Ok(Vec4::from_slice(&parse_floats(&value, 4, "color")?)),
        None => Ok(default),
    }
}

fn parse_u32(value: Option<String>, default: u32) -> Result<u32> {
    match value {
        Some(value) => value
            .parse::<u32>()
            .map_err(|err| anyhow!("failed to parse integer: {err}")),
        None => Ok(default),
    }
}
