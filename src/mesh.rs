use serde::{Deserialize, Serialize};

use crate::error::{RenderError, Result};
use crate::vertex::PolygonVertex;

/// Pre-triangulated polygon data ready for upload.
///
/// Without indices every three consecutive vertices form a triangle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub vertices: Vec<PolygonVertex>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indices: Option<Vec<u16>>,
}

impl Mesh {
    pub fn new(vertices: Vec<PolygonVertex>) -> Self {
        Self {
            vertices,
            indices: None,
        }
    }

    pub fn indexed(vertices: Vec<PolygonVertex>, indices: Vec<u16>) -> Self {
        Self {
            vertices,
            indices: Some(indices),
        }
    }

    /// Number of vertices the draw call walks.
    pub fn element_count(&self) -> usize {
        self.indices
            .as_ref()
            .map_or(self.vertices.len(), |indices| indices.len())
    }

    pub fn triangle_count(&self) -> usize {
        self.element_count() / 3
    }

    /// Vertex index triples in submission order.
    pub fn triangles(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        let count = self.triangle_count();
        (0..count).map(move |t| {
            let base = t * 3;
            match &self.indices {
                Some(indices) => [
                    indices[base] as usize,
                    indices[base + 1] as usize,
                    indices[base + 2] as usize,
                ],
                None => [base, base + 1, base + 2],
            }
        })
    }

    /// Checks the draw inputs the pipeline cannot check for itself.
    pub fn validate(&self) -> Result<()> {
        let count = self.element_count();
        if count % 3 != 0 {
            return Err(RenderError::IncompleteTriangle { count });
        }
        if let Some(index) = self.vertices.iter().position(|v| !v.is_finite()) {
            return Err(RenderError::NonFiniteVertex { index });
        }
        if let Some(indices) = &self.indices {
            let len = self.vertices.len();
            if let Some(&index) = indices.iter().find(|&&i| i as usize >= len) {
                return Err(RenderError::IndexOutOfRange {
                    index: index as usize,
                    len,
                });
            }
        }
        Ok(())
    }
}
