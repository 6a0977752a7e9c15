use egui::{Color32, Pos2, Rect, Vec2};
use serde::{Deserialize, Serialize};

use super::Element;
use crate::element::common;
use crate::id_generator::generate_id;

/// How a stroke combines with the pixels already on its layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StrokeMode {
    /// Paint the stroke colour over the layer
    #[default]
    Paint,
    /// Remove coverage from the layer (eraser)
    Erase,
}

/// A freehand polyline with a constant width
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    id: usize,
    points: Vec<Pos2>,
    color: Color32,
    width: f32,
    mode: StrokeMode,
}

impl Stroke {
    /// Create a new stroke with a fresh id
    pub fn new(points: Vec<Pos2>, color: Color32, width: f32) -> Self {
        Self {
            id: generate_id(),
            points,
            color,
            width: width.max(0.5),
            mode: StrokeMode::Paint,
        }
    }

    /// Create an erasing stroke
    pub fn eraser(points: Vec<Pos2>, width: f32) -> Self {
        Self {
            mode: StrokeMode::Erase,
            ..Self::new(points, Color32::TRANSPARENT, width)
        }
    }

    pub fn points(&self) -> &[Pos2] {
        &self.points
    }

    pub fn color(&self) -> Color32 {
        self.color
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn mode(&self) -> StrokeMode {
        self.mode
    }
}

impl Element for Stroke {
    fn id(&self) -> usize {
        self.id
    }

    fn element_type(&self) -> &'static str {
        "stroke"
    }

    fn rect(&self) -> Rect {
        common::calculate_bounds(&self.points, self.width / 2.0)
    }

    fn hit_test(&self, pos: Pos2) -> bool {
        let reach = self.width / 2.0 + common::HIT_TOLERANCE;
        match self.points.as_slice() {
            [] => false,
            [single] => (pos - *single).length() <= reach,
            points => points
                .windows(2)
                .any(|w| common::distance_to_line_segment(pos, w[0], w[1]) <= reach),
        }
    }

    fn translate(&mut self, delta: Vec2) -> Result<(), String> {
        for point in &mut self.points {
            *point += delta;
        }
        Ok(())
    }
}

/// Stroke being built from pointer samples
#[derive(Debug, Clone)]
pub struct MutableStroke {
    points: Vec<Pos2>,
    color: Color32,
    width: f32,
    mode: StrokeMode,
}

impl MutableStroke {
    pub fn new(color: Color32, width: f32, mode: StrokeMode) -> Self {
        Self {
            points: Vec::new(),
            color,
            width,
            mode,
        }
    }

    /// Add a point, skipping exact repeats of the previous sample
    pub fn add_point(&mut self, point: Pos2) {
        if self.points.last() != Some(&point) {
            self.points.push(point);
        }
    }

    pub fn points(&self) -> &[Pos2] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Convert to an immutable Stroke
    pub fn into_stroke(self) -> Stroke {
        match self.mode {
            StrokeMode::Paint => Stroke::new(self.points, self.color, self.width),
            StrokeMode::Erase => Stroke::eraser(self.points, self.width),
        }
    }
}
