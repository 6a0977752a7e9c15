use std::fmt;

use serde::{Deserialize, Serialize};

use crate::state::CanvasState;

/// Named semantic change of the canvas.
///
/// The `*Added`/`*Removed` pairs are the ones [`ChangeDetector::detect_changes`]
/// derives from flag toggles; the rest are emitted directly by layer store
/// operations.
///
/// [`ChangeDetector::detect_changes`]: crate::event::ChangeDetector::detect_changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeKind {
    BaseImageAdded,
    BaseImageRemoved,
    DrawingAdded,
    DrawingRemoved,
    TextAdded,
    TextRemoved,
    MaskAdded,
    MaskRemoved,
    TextUpdated,
    ShapeAdded,
    ObjectMoved,
    DrawingCleared,
    CanvasCleared,
    LayerVisibilityChanged,
    LayerLockChanged,
    LayerPropertiesChanged,
    LayerRemoved,
    MaskModeStarted,
    MaskModeEnded,
    StateRestored,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::BaseImageAdded => "base-image-added",
            ChangeKind::BaseImageRemoved => "base-image-removed",
            ChangeKind::DrawingAdded => "drawing-added",
            ChangeKind::DrawingRemoved => "drawing-removed",
            ChangeKind::TextAdded => "text-added",
            ChangeKind::TextRemoved => "text-removed",
            ChangeKind::MaskAdded => "mask-added",
            ChangeKind::MaskRemoved => "mask-removed",
            ChangeKind::TextUpdated => "text-updated",
            ChangeKind::ShapeAdded => "shape-added",
            ChangeKind::ObjectMoved => "object-moved",
            ChangeKind::DrawingCleared => "drawing-cleared",
            ChangeKind::CanvasCleared => "canvas-cleared",
            ChangeKind::LayerVisibilityChanged => "layer-visibility-changed",
            ChangeKind::LayerLockChanged => "layer-lock-changed",
            ChangeKind::LayerPropertiesChanged => "layer-properties-changed",
            ChangeKind::LayerRemoved => "layer-removed",
            ChangeKind::MaskModeStarted => "mask-mode-started",
            ChangeKind::MaskModeEnded => "mask-mode-ended",
            ChangeKind::StateRestored => "state-restored",
        }
    }

    /// Flag toggles between two projections, in flag order
    pub fn diff(previous: &CanvasState, current: &CanvasState) -> Vec<ChangeKind> {
        let pairs = [
            (previous.has_base_image, current.has_base_image, ChangeKind::BaseImageAdded, ChangeKind::BaseImageRemoved),
            (previous.has_drawing, current.has_drawing, ChangeKind::DrawingAdded, ChangeKind::DrawingRemoved),
            (previous.has_text, current.has_text, ChangeKind::TextAdded, ChangeKind::TextRemoved),
            (previous.has_mask, current.has_mask, ChangeKind::MaskAdded, ChangeKind::MaskRemoved),
        ];
        pairs
            .into_iter()
            .filter(|(before, after, _, _)| before != after)
            .map(|(_, after, added, removed)| if after { added } else { removed })
            .collect()
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the change log, as delivered to listeners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub kind: ChangeKind,
    /// Free-form payload, e.g. the id of the affected object
    pub details: serde_json::Value,
    /// Milliseconds since the UNIX epoch
    pub timestamp: u64,
    /// Set when the change was produced while restoring a snapshot
    pub during_restore: bool,
}
