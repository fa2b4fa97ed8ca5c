use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec4};
use serde::{Deserialize, Serialize};

/// One polygon corner as stored in the vertex buffer.
///
/// Color sits at offset 16 so it stays 16-byte aligned; the gap after `pos`
/// is padding and never read by the shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct PolygonVertex {
    pub pos: [f32; 2],
    #[serde(skip)]
    pub pad: [u32; 2],
    pub color: [f32; 4],
}

impl PolygonVertex {
    pub const STRIDE: u64 = std::mem::size_of::<PolygonVertex>() as u64;

    const ATTRIBUTES: [wgpu::VertexAttribute; 2] = [
        wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x2,
            offset: 0,
            shader_location: 0,
        },
        wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x4,
            offset: 16,
            shader_location: 1,
        },
    ];

    pub fn new(pos: impl Into<Vec2>, color: impl Into<Vec4>) -> Self {
        Self {
            pos: pos.into().into(),
            pad: [0; 2],
            color: color.into().into(),
        }
    }

    pub fn position(&self) -> Vec2 {
        Vec2::from(self.pos)
    }

    pub fn color(&self) -> Vec4 {
        Vec4::from(self.color)
    }

    pub fn is_finite(&self) -> bool {
        self.position().is_finite() && self.color().is_finite()
    }

    /// Buffer layout matching `@location(0) position` and `@location(1) color`.
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: Self::STRIDE,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}
