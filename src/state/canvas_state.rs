use serde::{Deserialize, Serialize};

use crate::layer::LayerSummary;

/// Whether the canvas is sketching from scratch or editing an existing image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CanvasMode {
    Generate,
    Edit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasMetadata {
    /// Milliseconds since the UNIX epoch of the last content mutation
    pub last_modified: u64,
    pub mode: CanvasMode,
    pub width: u32,
    pub height: u32,
}

/// Read-only projection of the layer store.
///
/// Computed on demand and never mutated; comparing two projections is how
/// semantic changes are detected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasState {
    pub has_base_image: bool,
    pub has_drawing: bool,
    pub has_text: bool,
    pub has_mask: bool,
    pub layers: Vec<LayerSummary>,
    pub metadata: CanvasMetadata,
}

impl CanvasState {
    /// True if any layer has content
    pub fn has_content(&self) -> bool {
        self.has_base_image || self.has_drawing || self.has_text || self.has_mask
    }

    /// True if anything was drawn on top of the base image
    pub fn has_edits(&self) -> bool {
        self.has_drawing || self.has_text || self.has_mask
    }
}
