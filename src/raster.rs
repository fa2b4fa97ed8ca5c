//! Software rasterizer that runs a `ShaderStage` on the CPU.
//!
//! It follows the fixed-function rules a GPU applies between the two stages:
//! perspective divide, viewport mapping (NDC +Y up, framebuffer +Y down),
//! pixel centers at half-integers, a top-left fill rule and
//! perspective-correct interpolation. Triangles are drawn regardless of
//! winding. Triangles with a vertex at or behind `w = 0` are skipped rather
//! than clipped.

use std::path::Path;

use glam::{Vec2, Vec4};
use log::{debug, warn};

use crate::error::{RenderError, Result};
use crate::settings::BlendMode;
use crate::shader::{Interpolate, ShaderStage, VertexOutput};

/// CPU color attachment holding linear `Vec4` pixels, row-major from the top.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorTarget {
    width: u32,
    height: u32,
    pixels: Vec<Vec4>,
}

impl ColorTarget {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidTargetSize { width, height });
        }
        Ok(Self {
            width,
            height,
            pixels: vec![Vec4::ZERO; width as usize * height as usize],
        })
    }

    /// Builds a target from tightly packed RGBA8 rows.
    pub fn from_rgba8(width: u32, height: u32, bytes: &[u8]) -> Result<Self> {
        let mut target = Self::new(width, height)?;
        for (pixel, texel) in target.pixels.iter_mut().zip(bytes.chunks_exact(4)) {
            *pixel = Vec4::new(
                texel[0] as f32,
                texel[1] as f32,
                texel[2] as f32,
                texel[3] as f32,
            ) / 255.0;
        }
        Ok(target)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Fills every pixel; stored values saturate to `[0, 1]` like a unorm
    /// attachment.
    pub fn clear(&mut self, color: Vec4) {
        self.pixels.fill(saturate(color));
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Vec4> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get(self.offset(x, y)).copied()
    }

    pub fn pixels(&self) -> &[Vec4] {
        &self.pixels
    }

    /// Quantizes to RGBA8 the way a `Rgba8Unorm` attachment stores color.
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.pixels
            .iter()
            .flat_map(|pixel| {
                pixel
                    .to_array()
                    .map(|channel| (channel.clamp(0.0, 1.0) * 255.0).round() as u8)
            })
            .collect()
    }

    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<()> {
        image::save_buffer(
            path,
            &self.to_rgba8(),
            self.width,
            self.height,
            image::ExtendedColorType::Rgba8,
        )?;
        Ok(())
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

/// Counters from a single draw.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrawStats {
    pub triangles: usize,
    pub skipped: usize,
    pub fragments: usize,
}

/// Drives a shader over triangle lists into a `ColorTarget`.
#[derive(Debug, Clone)]
pub struct Rasterizer<S> {
    shader: S,
    blend: BlendMode,
}

impl<S: ShaderStage> Rasterizer<S> {
    pub fn new(shader: S, blend: BlendMode) -> Self {
        Self { shader, blend }
    }

    /// Draws `vertices` as a triangle list, optionally through `indices`.
    ///
    /// The vertex stage runs once per vertex; the fragment stage once per
    /// covered pixel. Triangles referencing a missing vertex are skipped.
    pub fn draw(
        &self,
        target: &mut ColorTarget,
        uniform: &S::Uniform,
        vertices: &[S::Vertex],
        indices: Option<&[u16]>,
    ) -> DrawStats {
        let outputs: Vec<VertexOutput<S::Varying>> = vertices
            .iter()
            .map(|vertex| self.shader.vertex_stage(uniform, vertex))
            .collect();

        let mut stats = DrawStats::default();
        let element_count = indices.map_or(vertices.len(), <[u16]>::len);
        for t in 0..element_count / 3 {
            let base = t * 3;
            let corners = match indices {
                Some(indices) => [
                    indices[base] as usize,
                    indices[base + 1] as usize,
                    indices[base + 2] as usize,
                ],
                None => [base, base + 1, base + 2],
            };
            let (Some(a), Some(b), Some(c)) = (
                outputs.get(corners[0]),
                outputs.get(corners[1]),
                outputs.get(corners[2]),
            ) else {
                warn!("triangle {t} references a missing vertex; skipped");
                stats.skipped += 1;
                continue;
            };
            match self.fill_triangle(target, [*a, *b, *c]) {
                Some(fragments) => {
                    stats.triangles += 1;
                    stats.fragments += fragments;
                }
                None => stats.skipped += 1,
            }
        }

        debug!(
            "rasterized {} triangles ({} skipped), {} fragments",
            stats.triangles, stats.skipped, stats.fragments
        );
        stats
    }

    /// Returns the number of fragments written, or `None` if the triangle
    /// was rejected before scan conversion.
    fn fill_triangle(
        &self,
        target: &mut ColorTarget,
        corners: [VertexOutput<S::Varying>; 3],
    ) -> Option<usize> {
        if corners
            .iter()
            .any(|c| !c.clip_position.is_finite() || c.clip_position.w <= 0.0)
        {
            return None;
        }

        let size = Vec2::new(target.width as f32, target.height as f32);
        let mut screen = [Vec2::ZERO; 3];
        let mut depth = [0.0f32; 3];
        let mut inv_w = [0.0f32; 3];
        for (i, corner) in corners.iter().enumerate() {
            let clip = corner.clip_position;
            let ndc = clip.truncate() / clip.w;
            screen[i] = Vec2::new((ndc.x + 1.0) * 0.5, (1.0 - ndc.y) * 0.5) * size;
            depth[i] = ndc.z;
            inv_w[i] = 1.0 / clip.w;
        }
        let mut varyings = corners.map(|c| c.varying);

        let mut area = edge(screen[0], screen[1], screen[2]);
        if area == 0.0 || !area.is_finite() {
            return None;
        }
        if area < 0.0 {
            screen.swap(1, 2);
            depth.swap(1, 2);
            inv_w.swap(1, 2);
            varyings.swap(1, 2);
            area = -area;
        }

        let edges = [(1, 2), (2, 0), (0, 1)];
        let top_left = edges.map(|(a, b)| is_top_left(screen[a], screen[b]));

        let min = screen[0].min(screen[1]).min(screen[2]).floor().max(Vec2::ZERO);
        let max = screen[0]
            .max(screen[1])
            .max(screen[2])
            .ceil()
            .min(size);
        let (x0, y0) = (min.x as u32, min.y as u32);
        let (x1, y1) = (max.x as u32, max.y as u32);

        let mut fragments = 0;
        for y in y0..y1 {
            for x in x0..x1 {
                let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let weights = edges.map(|(a, b)| edge(screen[a], screen[b], p));
                let covered = weights
                    .iter()
                    .zip(top_left)
                    .all(|(&w, tl)| w > 0.0 || (w == 0.0 && tl));
                if !covered {
                    continue;
                }

                let bary = weights.map(|w| w / area);
                let z = bary[0] * depth[0] + bary[1] * depth[1] + bary[2] * depth[2];
                if !(0.0..=1.0).contains(&z) {
                    continue;
                }

                let persp = [bary[0] * inv_w[0], bary[1] * inv_w[1], bary[2] * inv_w[2]];
                let norm = persp[0] + persp[1] + persp[2];
                let varying =
                    <S::Varying as Interpolate>::interpolate(varyings, persp.map(|v| v / norm));
                let color = saturate(self.shader.fragment_stage(varying));

                let offset = target.offset(x, y);
                let dst = target.pixels[offset];
                target.pixels[offset] = saturate(self.blend.apply(color, dst));
                fragments += 1;
            }
        }
        Some(fragments)
    }
}

fn saturate(color: Vec4) -> Vec4 {
    color.clamp(Vec4::ZERO, Vec4::ONE)
}

/// Twice the signed area of `(a, b, p)`; positive when `p` is inside the
/// edge for a triangle with positive area.
fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Top edges are horizontal with the rest of the triangle below; left edges
/// run upward on screen.
fn is_top_left(a: Vec2, b: Vec2) -> bool {
    let d = b - a;
    (d.y == 0.0 && d.x > 0.0) || d.y < 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use crate::shader::PolygonShader;
    use crate::vertex::PolygonVertex;
    use glam::{Mat4, Vec3};

    const RED: [f32; 4] = [1.0, 0.0, 0.0, 1.0];
    const GREEN: [f32; 4] = [0.0, 1.0, 0.0, 1.0];
    const BLUE: [f32; 4] = [0.0, 0.0, 1.0, 1.0];

    fn rasterizer(blend: BlendMode) -> Rasterizer<PolygonShader> {
        Rasterizer::new(PolygonShader, blend)
    }

    fn rgb_triangle() -> Vec<PolygonVertex> {
        vec![
            PolygonVertex::new([0.0, 0.0], RED),
            PolygonVertex::new([1.0, 0.0], GREEN),
            PolygonVertex::new([0.0, 1.0], BLUE),
        ]
    }

    fn assert_close(actual: Vec4, expected: Vec4, tolerance: f32) {
        assert!(
            (actual - expected).abs().max_element() <= tolerance,
            "{actual:?} != {expected:?}"
        );
    }

    #[test]
    fn zero_sized_target_is_rejected() {
        assert!(matches!(
            ColorTarget::new(0, 4),
            Err(RenderError::InvalidTargetSize { width: 0, height: 4 })
        ));
    }

    #[test]
    fn centroid_is_the_average_of_corner_colors() {
        let mut target = ColorTarget::new(300, 300).unwrap();
        let stats = rasterizer(BlendMode::Replace).draw(
            &mut target,
            &Camera::identity(),
            &rgb_triangle(),
            None,
        );
        assert_eq!(stats.triangles, 1);

        // NDC centroid (1/3, 1/3) lands on framebuffer (200, 100).
        let pixel = target.pixel(200, 100).unwrap();
        let third = 1.0 / 3.0;
        assert_close(pixel, Vec4::new(third, third, third, 1.0), 0.01);
    }

    #[test]
    fn corners_take_their_vertex_color() {
        let mut target = ColorTarget::new(200, 200).unwrap();
        rasterizer(BlendMode::Replace).draw(
            &mut target,
            &Camera::identity(),
            &rgb_triangle(),
            None,
        );
        // Just inside each corner of the triangle.
        assert_close(target.pixel(100, 99).unwrap(), RED.into(), 0.02);
        assert_close(target.pixel(198, 99).unwrap(), GREEN.into(), 0.02);
        assert_close(target.pixel(100, 1).unwrap(), BLUE.into(), 0.02);
        // Outside stays cleared.
        assert_eq!(target.pixel(50, 150), Some(Vec4::ZERO));
    }

    #[test]
    fn camera_position_does_not_change_the_image() {
        let projection = Mat4::from_scale(Vec3::new(0.5, 0.5, 1.0));
        let mut reference = ColorTarget::new(64, 64).unwrap();
        rasterizer(BlendMode::Replace).draw(
            &mut reference,
            &Camera::new(projection, Vec3::ZERO),
            &rgb_triangle(),
            None,
        );

        let mut moved = ColorTarget::new(64, 64).unwrap();
        rasterizer(BlendMode::Replace).draw(
            &mut moved,
            &Camera::new(projection, Vec3::new(12.0, -3.0, 40.0)),
            &rgb_triangle(),
            None,
        );
        assert_eq!(reference, moved);
    }

    #[test]
    fn singular_projection_covers_nothing() {
        let mut target = ColorTarget::new(32, 32).unwrap();
        target.clear(Vec4::new(0.2, 0.2, 0.2, 1.0));
        let before = target.clone();
        let stats = rasterizer(BlendMode::Replace).draw(
            &mut target,
            &Camera::new(Mat4::ZERO, Vec3::ZERO),
            &rgb_triangle(),
            None,
        );
        assert_eq!(stats.fragments, 0);
        assert_eq!(stats.skipped, 1);
        assert_eq!(target, before);
    }

    #[test]
    fn shared_edges_are_filled_exactly_once() {
        let half_red = [1.0, 0.0, 0.0, 0.5];
        let vertices = vec![
            PolygonVertex::new([-1.0, -1.0], half_red),
            PolygonVertex::new([1.0, -1.0], half_red),
            PolygonVertex::new([1.0, 1.0], half_red),
            PolygonVertex::new([-1.0, 1.0], half_red),
        ];
        let mut target = ColorTarget::new(16, 16).unwrap();
        target.clear(Vec4::new(0.0, 0.0, 0.0, 1.0));
        let stats = rasterizer(BlendMode::Alpha).draw(
            &mut target,
            &Camera::identity(),
            &vertices,
            Some(&[0, 1, 2, 0, 2, 3]),
        );
        assert_eq!(stats.fragments, 16 * 16);
        for pixel in target.pixels() {
            assert_close(*pixel, Vec4::new(0.5, 0.0, 0.0, 1.0), 1e-6);
        }
    }

    #[test]
    fn submission_order_does_not_matter_for_disjoint_triangles() {
        let vertices = vec![
            PolygonVertex::new([-1.0, -1.0], RED),
            PolygonVertex::new([0.0, -1.0], RED),
            PolygonVertex::new([-1.0, 0.0], RED),
            PolygonVertex::new([0.2, 0.2], BLUE),
            PolygonVertex::new([1.0, 0.2], GREEN),
            PolygonVertex::new([0.2, 1.0], BLUE),
        ];
        let forward = [0u16, 1, 2, 3, 4, 5];
        let backward = [5u16, 4, 3, 2, 1, 0];

        let mut a = ColorTarget::new(40, 40).unwrap();
        let mut b = ColorTarget::new(40, 40).unwrap();
        let raster = rasterizer(BlendMode::Replace);
        raster.draw(&mut a, &Camera::identity(), &vertices, Some(&forward));
        raster.draw(&mut b, &Camera::identity(), &vertices, Some(&backward));
        for (lhs, rhs) in a.pixels().iter().zip(b.pixels()) {
            assert_close(*lhs, *rhs, 1e-5);
        }
        let covered = |t: &ColorTarget| t.pixels().iter().filter(|p| **p != Vec4::ZERO).count();
        assert_eq!(covered(&a), covered(&b));
    }

    #[test]
    fn missing_vertices_skip_the_triangle() {
        let mut target = ColorTarget::new(8, 8).unwrap();
        let stats = rasterizer(BlendMode::Replace).draw(
            &mut target,
            &Camera::identity(),
            &rgb_triangle(),
            Some(&[0, 1, 9]),
        );
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.fragments, 0);
    }

    #[test]
    fn out_of_range_colors_saturate_between_draws() {
        let quad = |color: [f32; 4]| {
            vec![
                PolygonVertex::new([-1.0, -1.0], color),
                PolygonVertex::new([1.0, -1.0], color),
                PolygonVertex::new([1.0, 1.0], color),
                PolygonVertex::new([-1.0, 1.0], color),
            ]
        };
        let indices = [0u16, 1, 2, 0, 2, 3];
        let raster = rasterizer(BlendMode::Alpha);
        let mut target = ColorTarget::new(4, 4).unwrap();
        target.clear(Vec4::new(0.0, 0.0, 0.0, 1.0));

        raster.draw(
            &mut target,
            &Camera::identity(),
            &quad([1.5, 0.0, 0.0, 1.0]),
            Some(&indices),
        );
        assert_eq!(target.pixel(1, 1), Some(Vec4::new(1.0, 0.0, 0.0, 1.0)));

        raster.draw(
            &mut target,
            &Camera::identity(),
            &quad([0.0, 0.0, 0.0, 0.25]),
            Some(&indices),
        );
        assert_eq!(&target.to_rgba8()[..4], &[191, 0, 0, 255]);
    }

    #[test]
    fn clear_saturates_the_stored_color() {
        let mut target = ColorTarget::new(1, 1).unwrap();
        target.clear(Vec4::new(2.0, -1.0, 0.5, 1.0));
        assert_eq!(target.pixel(0, 0), Some(Vec4::new(1.0, 0.0, 0.5, 1.0)));
    }

    #[test]
    fn rgba8_quantization_rounds_and_clamps() {
        let mut target = ColorTarget::new(1, 1).unwrap();
        target.clear(Vec4::new(0.5, 1.5, -0.2, 1.0));
        assert_eq!(target.to_rgba8(), vec![128, 255, 0, 255]);
        let back = ColorTarget::from_rgba8(1, 1, &[0, 255, 51, 255]).unwrap();
        assert_close(back.pixel(0, 0).unwrap(), Vec4::new(0.0, 1.0, 0.2, 1.0), 1e-6);
    }
}
