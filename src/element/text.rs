use egui::{Color32, Pos2, Rect, Vec2};
use serde::{Deserialize, Serialize};

use super::Element;
use crate::id_generator::generate_id;

/// Approximate advance of one character relative to the font size.
/// Used for bounds when no font metrics are at hand.
const AVERAGE_ADVANCE: f32 = 0.6;
const LINE_HEIGHT: f32 = 1.2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    pub font_size: f32,
    pub font_family: String,
    pub color: Color32,
    pub bold: bool,
    pub italic: bool,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_size: 24.0,
            font_family: "sans-serif".to_owned(),
            color: Color32::BLACK,
            bold: false,
            italic: false,
        }
    }
}

/// A piece of text owned by the text layer, keyed by its id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextObject {
    id: usize,
    text: String,
    /// Top-left corner of the first line
    position: Pos2,
    style: TextStyle,
}

impl TextObject {
    pub fn new(text: impl Into<String>, position: Pos2, style: TextStyle) -> Self {
        Self {
            id: generate_id(),
            text: text.into(),
            position,
            style,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn position(&self) -> Pos2 {
        self.position
    }

    pub fn style(&self) -> &TextStyle {
        &self.style
    }

    pub fn set_style(&mut self, style: TextStyle) {
        self.style = style;
    }
}

impl Element for TextObject {
    fn id(&self) -> usize {
        self.id
    }

    fn element_type(&self) -> &'static str {
        "text"
    }

    fn rect(&self) -> Rect {
        let lines = self.text.split('\n');
        let longest = lines.clone().map(|l| l.chars().count()).max().unwrap_or(0);
        let line_count = lines.count().max(1);
        let size = Vec2::new(
            longest as f32 * self.style.font_size * AVERAGE_ADVANCE,
            line_count as f32 * self.style.font_size * LINE_HEIGHT,
        );
        Rect::from_min_size(self.position, size)
    }

    fn hit_test(&self, pos: Pos2) -> bool {
        self.rect().contains(pos)
    }

    fn translate(&mut self, delta: Vec2) -> Result<(), String> {
        self.position += delta;
        Ok(())
    }
}
