//! Installation geometry
//!
//! The controller treats the geometry as opaque: it only needs the pixel
//! count, the canonical pixel order, and a payload to hand to instruments.
//! The document's top-level `pixels` array defines that order; everything
//! else (nodes, edges, coordinates) is passed through untouched.

use crate::error::{PixelWeaveError, Result, ResultExt};
use crate::types::PixelId;
use serde_json::Value;
use std::path::Path;

/// Immutable geometry of one installation
#[derive(Debug, Clone)]
pub struct Model {
    pixel_ids: Vec<PixelId>,
    document: Value,
}

impl Model {
    /// Import a model from its JSON document
    pub fn from_json(document: Value) -> Result<Self> {
        let pixels = document
            .as_object()
            .ok_or_else(|| PixelWeaveError::Model("model document must be a JSON object".into()))?
            .get("pixels")
            .and_then(Value::as_array)
            .ok_or_else(|| PixelWeaveError::Model("model is missing a 'pixels' array".into()))?;

        let pixel_ids = pixels
            .iter()
            .enumerate()
            .map(|(position, pixel)| {
                match pixel.get("id") {
                    None => Ok(PixelId(position as u64)),
                    Some(id) => id.as_u64().map(PixelId).ok_or_else(|| {
                        PixelWeaveError::Model(format!(
                            "pixel at position {} has a non-integer id: {}",
                            position, id
                        ))
                    }),
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            pixel_ids,
            document,
        })
    }

    /// Parse a model from JSON text
    pub fn from_json_str(text: &str) -> Result<Self> {
        let document: Value = serde_json::from_str(text)?;
        Self::from_json(document)
    }

    /// Load a model from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model {}", path.display()))?;
        let model = Self::from_json_str(&text)
            .with_context(|| format!("Failed to import model {}", path.display()))?;
        tracing::info!("Loaded model {:?} with {} pixels", path, model.pixel_count());
        Ok(model)
    }

    /// Build a model with `count` anonymous pixels
    pub fn with_pixel_count(count: usize) -> Self {
        let pixels: Vec<Value> = (0..count)
            .map(|i| serde_json::json!({ "id": i }))
            .collect();
        Self {
            pixel_ids: (0..count as u64).map(PixelId).collect(),
            document: serde_json::json!({ "pixels": pixels }),
        }
    }

    /// Number of addressable pixels
    pub fn pixel_count(&self) -> usize {
        self.pixel_ids.len()
    }

    /// Pixel identifiers in canonical order
    pub fn pixel_ids(&self) -> &[PixelId] {
        &self.pixel_ids
    }

    /// Geometry payload handed to instruments and preview clients
    pub fn export(&self) -> Value {
        self.document.clone()
    }
}
