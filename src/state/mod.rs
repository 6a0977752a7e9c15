mod canvas_state;
mod persistence;
mod snapshot;

pub use canvas_state::{CanvasMetadata, CanvasMode, CanvasState};
pub use persistence::{SnapshotStore, StoredTree};
pub use snapshot::{
    ReferenceLayerBlob, SnapshotData, SnapshotMetadata, SnapshotTarget, decode_layer_blob, encode_layer_blob,
};
