use glam::Vec4;
use serde::{Deserialize, Serialize};

/// How fragment output combines with what the target already holds.
///
/// This is pipeline state chosen by the host, never by the shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    /// The fragment overwrites the destination.
    #[default]
    Replace,
    /// Straight-alpha "over" compositing.
    Alpha,
}

impl BlendMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "replace" => Some(Self::Replace),
            "alpha" => Some(Self::Alpha),
            _ => None,
        }
    }

    /// CPU equivalent of the fixed-function blend unit.
    pub fn apply(self, src: Vec4, dst: Vec4) -> Vec4 {
        match self {
            Self::Replace => src,
            Self::Alpha => {
                let a = src.w;
                let rgb = src.truncate() * a + dst.truncate() * (1.0 - a);
                rgb.extend(a + dst.w * (1.0 - a))
            }
        }
    }

    pub fn to_wgpu(self) -> wgpu::BlendState {
        match self {
            Self::Replace => wgpu::BlendState::REPLACE,
            Self::Alpha => wgpu::BlendState::ALPHA_BLENDING,
        }
    }
}

/// Target size, clear color and blending for one render.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    pub clear_color: Vec4,
    #[serde(default)]
    pub blend: BlendMode,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
            clear_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            blend: BlendMode::Replace,
        }
    }
}
