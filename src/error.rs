use thiserror::Error;
use uuid::Uuid;

use crate::layer::LayerKind;

/// Errors produced by the canvas core.
///
/// Unknown ids on interactive calls (`undo`, `switch_to_version`, ...) are
/// reported through `bool`/`Option` returns instead; the `Unknown*` variants
/// only appear where an operation also has to report encode failures.
#[derive(Debug, Error)]
pub enum CanvasError {
    #[error("Unknown layer: {0}")]
    UnknownLayer(Uuid),

    #[error("Unknown version: {0}")]
    UnknownVersion(Uuid),

    #[error("Unknown history entry: {0}")]
    UnknownHistoryEntry(Uuid),

    #[error("Layer {0} is locked")]
    LayerLocked(LayerKind),

    #[error("Failed to render: {0}")]
    Render(String),

    #[error("Failed to restore snapshot: {0}")]
    Restore(String),

    #[error("Image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Failed to (de)serialize layer blob: {0}")]
    Blob(#[from] bincode::Error),

    #[error("Failed to (de)serialize metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("Region {width}x{height} at ({x}, {y}) lies outside the {canvas_width}x{canvas_height} canvas")]
    InvalidRegion {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        canvas_width: u32,
        canvas_height: u32,
    },

    #[error("Invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Failed to load font: {0}")]
    Font(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for canvas operations
pub type CanvasResult<T> = Result<T, CanvasError>;
