use serde::{Deserialize, Serialize};

use super::CanvasMode;
use crate::element::Drawable;
use crate::error::CanvasResult;
use crate::layer::LayerSummary;

/// Byte-serialized capture of all layer contents at one instant.
///
/// Every field is optional: a missing blob means "leave that layer empty"
/// on restore.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotData {
    pub base_image: Option<Vec<u8>>,
    pub drawing_layer: Option<Vec<u8>>,
    pub text_layer: Option<Vec<u8>>,
    pub mask_layer: Option<Vec<u8>>,
    /// Reference layers, bincode of `Vec<ReferenceLayerBlob>`
    pub reference_layers: Option<Vec<u8>>,
    /// JSON encoded [`SnapshotMetadata`]
    pub metadata: Option<Vec<u8>>,
}

impl SnapshotData {
    /// True if no layer blob is present
    pub fn is_empty(&self) -> bool {
        self.base_image.is_none()
            && self.drawing_layer.is_none()
            && self.text_layer.is_none()
            && self.mask_layer.is_none()
            && self.reference_layers.is_none()
    }

    /// Total size of all blobs, metadata included
    pub fn byte_len(&self) -> usize {
        [
            &self.base_image,
            &self.drawing_layer,
            &self.text_layer,
            &self.mask_layer,
            &self.reference_layers,
            &self.metadata,
        ]
        .into_iter()
        .flatten()
        .map(Vec::len)
        .sum()
    }

    pub fn decode_metadata(&self) -> CanvasResult<Option<SnapshotMetadata>> {
        self.metadata
            .as_deref()
            .map(SnapshotMetadata::from_bytes)
            .transpose()
    }
}

/// Human readable part of a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub width: u32,
    pub height: u32,
    pub mode: CanvasMode,
    /// Milliseconds since the UNIX epoch
    pub captured_at: u64,
    /// Properties of every layer at capture time, canonical order
    pub layers: Vec<LayerSummary>,
}

impl SnapshotMetadata {
    pub fn to_bytes(&self) -> CanvasResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> CanvasResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// A reference layer's properties together with its content blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceLayerBlob {
    pub summary: LayerSummary,
    pub content: Vec<u8>,
}

/// Something whose layer content can be captured and restored.
///
/// History and version managers only talk to the canvas through this trait.
pub trait SnapshotTarget {
    fn capture_snapshot(&self) -> CanvasResult<SnapshotData>;

    /// Small PNG preview, if thumbnails are enabled
    fn capture_thumbnail(&self) -> Option<Vec<u8>>;

    /// Replace all layer content with the snapshot's.
    ///
    /// On error the previous content must still be in place.
    fn restore_snapshot(&mut self, data: &SnapshotData) -> CanvasResult<()>;
}

pub fn encode_layer_blob(content: &[Drawable]) -> CanvasResult<Vec<u8>> {
    Ok(bincode::serialize(content)?)
}

pub fn decode_layer_blob(bytes: &[u8]) -> CanvasResult<Vec<Drawable>> {
    Ok(bincode::deserialize(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Element, ShapeStyle, TextStyle, factory};
    use egui::{Color32, Rect, pos2, vec2};

    #[test]
    fn test_layer_blob_preserves_content() {
        let content = vec![
            factory::create_stroke(vec![pos2(1.0, 2.0), pos2(3.0, 4.0)], 2.0, Color32::RED),
            factory::create_rectangle(
                Rect::from_min_size(pos2(5.0, 5.0), vec2(10.0, 20.0)),
                ShapeStyle::filled(Color32::GREEN),
            ),
            factory::create_text("hello", pos2(0.0, 0.0), TextStyle::default()),
        ];
        let bytes = encode_layer_blob(&content).unwrap();
        let decoded = decode_layer_blob(&bytes).unwrap();
        assert_eq!(decoded, content);
        assert_eq!(decoded[2].id(), content[2].id());
    }

    #[test]
    fn test_garbage_blob_is_an_error() {
        assert!(decode_layer_blob(&[0xff, 0xff, 0xff]).is_err());
    }

    #[test]
    fn test_empty_snapshot() {
        let data = SnapshotData::default();
        assert!(data.is_empty());
        assert_eq!(data.byte_len(), 0);
        assert!(data.decode_metadata().unwrap().is_none());
    }
}
