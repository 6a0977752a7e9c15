use egui::{Color32, Pos2, Rect, Vec2};
use serde::{Deserialize, Serialize};

use super::Element;
use crate::element::common;
use crate::id_generator::generate_id;

/// Geometry of a shape object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShapeKind {
    Rectangle,
    /// Ellipse inscribed in the shape bounds
    Ellipse,
    /// Closed polygon, e.g. from the lasso tool. Points are absolute.
    Polygon(Vec<Pos2>),
}

/// Fill and outline of a shape
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShapeStyle {
    pub fill: Option<Color32>,
    pub stroke_color: Color32,
    pub stroke_width: f32,
}

impl ShapeStyle {
    pub fn outline(color: Color32, width: f32) -> Self {
        Self {
            fill: None,
            stroke_color: color,
            stroke_width: width,
        }
    }

    pub fn filled(color: Color32) -> Self {
        Self {
            fill: Some(color),
            stroke_color: color,
            stroke_width: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    id: usize,
    kind: ShapeKind,
    bounds: Rect,
    style: ShapeStyle,
}

impl Shape {
    pub fn new(kind: ShapeKind, bounds: Rect, style: ShapeStyle) -> Self {
        Self {
            id: generate_id(),
            kind,
            bounds,
            style,
        }
    }

    /// A polygon shape whose bounds are derived from its points
    pub fn polygon(points: Vec<Pos2>, style: ShapeStyle) -> Self {
        let bounds = common::calculate_bounds(&points, 0.0);
        Self::new(ShapeKind::Polygon(points), bounds, style)
    }

    pub fn kind(&self) -> &ShapeKind {
        &self.kind
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn style(&self) -> &ShapeStyle {
        &self.style
    }

    /// Whether `pos` lies inside the filled area of the shape
    pub fn contains(&self, pos: Pos2) -> bool {
        match &self.kind {
            ShapeKind::Rectangle => self.bounds.contains(pos),
            ShapeKind::Ellipse => {
                let center = self.bounds.center();
                let rx = self.bounds.width() / 2.0;
                let ry = self.bounds.height() / 2.0;
                if rx <= 0.0 || ry <= 0.0 {
                    return false;
                }
                let dx = (pos.x - center.x) / rx;
                let dy = (pos.y - center.y) / ry;
                dx * dx + dy * dy <= 1.0
            }
            ShapeKind::Polygon(points) => common::point_in_polygon(pos, points),
        }
    }
}

impl Element for Shape {
    fn id(&self) -> usize {
        self.id
    }

    fn element_type(&self) -> &'static str {
        match self.kind {
            ShapeKind::Rectangle => "rectangle",
            ShapeKind::Ellipse => "ellipse",
            ShapeKind::Polygon(_) => "polygon",
        }
    }

    fn rect(&self) -> Rect {
        self.bounds.expand(self.style.stroke_width / 2.0)
    }

    fn hit_test(&self, pos: Pos2) -> bool {
        // Outlines are grabbable anywhere inside as well
        self.rect().expand(common::HIT_TOLERANCE).contains(pos)
            && (self.contains(pos) || self.style.fill.is_none())
    }

    fn translate(&mut self, delta: Vec2) -> Result<(), String> {
        self.bounds = self.bounds.translate(delta);
        if let ShapeKind::Polygon(points) = &mut self.kind {
            for point in points {
                *point += delta;
            }
        }
        Ok(())
    }
}
