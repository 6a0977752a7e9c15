#![warn(clippy::all, rust_2018_idioms)]

pub mod compositor;
pub mod config;
pub mod element;
pub mod error;
pub mod event;
pub mod export;
pub mod generation;
pub mod history;
pub mod id_generator;
pub mod layer;
pub mod layer_store;
pub mod raster;
pub mod session;
pub mod state;
pub mod tools;
pub mod util;
pub mod version;

pub use compositor::{Compositor, RenderContext};
pub use config::CanvasConfig;
pub use element::{Drawable, Element, ShapeKind, ShapeStyle, Stroke, TextObject, TextStyle};
pub use error::{CanvasError, CanvasResult};
pub use event::{ChangeKind, ChangeRecord, ContentAnalysis, ContentType, ListenerError};
pub use export::{CanvasSnapshot, EncodedImage, ExportBundle, ExportEngine, ExportMetadata, ImageFormat};
pub use generation::{GeneratedImage, GenerationError, GenerationRequest, GenerationTicket, ImageGenerator};
pub use history::{CaptureDebouncer, HistoryEntry, HistoryManager};
pub use layer::{BlendMode, Layer, LayerKind, LayerSummary};
pub use layer_store::LayerStore;
pub use session::CanvasSession;
pub use state::{CanvasMode, CanvasState, SnapshotData, SnapshotStore, SnapshotTarget};
pub use tools::{ToolMode, ToolSettings};
pub use version::{Version, VersionManager, VersionTree};
