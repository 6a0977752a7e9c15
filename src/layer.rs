use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::element::{Drawable, Element};

/// Role of a layer. Also fixes the default stacking order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayerKind {
    Base,
    Reference,
    Drawing,
    Text,
    Mask,
}

impl LayerKind {
    /// Fixed layers created with every canvas, bottom to top
    pub const FIXED: [LayerKind; 4] = [LayerKind::Base, LayerKind::Drawing, LayerKind::Text, LayerKind::Mask];

    /// Position in the canonical stacking order (base < reference < drawing < text < mask)
    pub fn rank(self) -> i32 {
        match self {
            LayerKind::Base => 0,
            LayerKind::Reference => 1,
            LayerKind::Drawing => 2,
            LayerKind::Text => 3,
            LayerKind::Mask => 4,
        }
    }

    /// Default z-index. Spaced out so explicit indices can slot in between.
    pub fn default_z_index(self) -> i32 {
        self.rank() * 100
    }

    pub fn default_name(self) -> &'static str {
        match self {
            LayerKind::Base => "Base Image",
            LayerKind::Reference => "Reference",
            LayerKind::Drawing => "Drawing",
            LayerKind::Text => "Text",
            LayerKind::Mask => "Mask",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LayerKind::Base => "base",
            LayerKind::Reference => "reference",
            LayerKind::Drawing => "drawing",
            LayerKind::Text => "text",
            LayerKind::Mask => "mask",
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a layer combines with the layers below it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
}

impl BlendMode {
    /// Returns all blend modes
    pub fn all() -> &'static [BlendMode] {
        &[
            BlendMode::Normal,
            BlendMode::Multiply,
            BlendMode::Screen,
            BlendMode::Overlay,
            BlendMode::Darken,
            BlendMode::Lighten,
        ]
    }
}

/// A single layer of the canvas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    /// Unique identifier for the layer
    pub id: Uuid,
    pub kind: LayerKind,
    /// Display name of the layer
    pub name: String,
    /// Whether the layer is currently visible
    pub visible: bool,
    /// Locked layers reject content changes
    pub locked: bool,
    /// Opacity in 0..=1
    pub opacity: f32,
    pub blend_mode: BlendMode,
    pub z_index: i32,
    /// Objects owned by this layer, bottom to top
    pub content: Vec<Drawable>,
}

impl Layer {
    pub fn new(kind: LayerKind) -> Self {
        Self::with_name(kind, kind.default_name())
    }

    pub fn with_name(kind: LayerKind, name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            name: name.to_string(),
            visible: true,
            locked: false,
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            z_index: kind.default_z_index(),
            content: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn object_count(&self) -> usize {
        self.content.len()
    }

    /// Adds an object on top of the layer's content
    pub fn push(&mut self, drawable: Drawable) {
        self.content.push(drawable);
    }

    pub fn find(&self, object_id: usize) -> Option<&Drawable> {
        self.content.iter().find(|d| d.id() == object_id)
    }

    pub fn find_mut(&mut self, object_id: usize) -> Option<&mut Drawable> {
        self.content.iter_mut().find(|d| d.id() == object_id)
    }

    /// Removes and returns the object with the given id
    pub fn remove(&mut self, object_id: usize) -> Option<Drawable> {
        let index = self.content.iter().position(|d| d.id() == object_id)?;
        Some(self.content.remove(index))
    }

    pub fn clear(&mut self) {
        self.content.clear();
    }

    /// Topmost object under `pos`
    pub fn object_at(&self, pos: egui::Pos2) -> Option<&Drawable> {
        self.content.iter().rev().find(|d| d.hit_test(pos))
    }

    pub fn summary(&self) -> LayerSummary {
        LayerSummary {
            id: self.id,
            kind: self.kind,
            name: self.name.clone(),
            visible: self.visible,
            locked: self.locked,
            opacity: self.opacity,
            blend_mode: self.blend_mode,
            z_index: self.z_index,
            object_count: self.content.len(),
        }
    }
}

/// Content-free description of a layer, used in canvas state and export metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerSummary {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: LayerKind,
    pub name: String,
    pub visible: bool,
    pub locked: bool,
    pub opacity: f32,
    pub blend_mode: BlendMode,
    pub z_index: i32,
    pub object_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::factory;
    use egui::{Color32, pos2};

    #[test]
    fn test_default_order_matches_kind_order() {
        let mut kinds = LayerKind::FIXED.to_vec();
        kinds.sort_by_key(|k| k.default_z_index());
        assert_eq!(kinds, LayerKind::FIXED.to_vec());
        assert!(LayerKind::Reference.default_z_index() < LayerKind::Drawing.default_z_index());
    }

    #[test]
    fn test_remove_by_id() {
        let mut layer = Layer::new(LayerKind::Drawing);
        let stroke = factory::create_stroke(vec![pos2(0.0, 0.0), pos2(5.0, 5.0)], 1.0, Color32::RED);
        let id = stroke.id();
        layer.push(stroke);
        assert_eq!(layer.object_count(), 1);
        assert!(layer.remove(id + 1_000_000).is_none());
        assert!(layer.remove(id).is_some());
        assert!(layer.is_empty());
    }
}
