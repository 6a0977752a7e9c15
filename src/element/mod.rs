use egui::{Pos2, Rect, Vec2};
use serde::{Deserialize, Serialize};

mod common;
pub mod image;
pub mod shape;
pub mod stroke;
pub mod text;

pub use common::MIN_ELEMENT_SIZE;
pub use self::image::{ImageObject, Placement};
pub use self::shape::{Shape, ShapeKind, ShapeStyle};
pub use self::stroke::{MutableStroke, Stroke, StrokeMode};
pub use self::text::{TextObject, TextStyle};

pub(crate) use common::{distance_to_line_segment, validate_rect};

/// Common trait that all drawable objects implement
pub trait Element {
    /// Get the unique identifier for this object
    fn id(&self) -> usize;

    /// Get the object type as a string
    fn element_type(&self) -> &'static str;

    /// Get the bounding rectangle in canvas coordinates
    fn rect(&self) -> Rect;

    /// Test if the object contains the given position
    fn hit_test(&self, pos: Pos2) -> bool;

    /// Translate the object by the given delta
    fn translate(&mut self, delta: Vec2) -> Result<(), String>;
}

/// Everything a layer can hold.
///
/// Each variant is owned by exactly one layer; moving content between layers
/// means removing it from one and inserting it into the other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Drawable {
    Stroke(Stroke),
    Shape(Shape),
    Text(TextObject),
    Image(ImageObject),
}

impl Drawable {
    pub fn as_text(&self) -> Option<&TextObject> {
        match self {
            Drawable::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_text_mut(&mut self) -> Option<&mut TextObject> {
        match self {
            Drawable::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&ImageObject> {
        match self {
            Drawable::Image(image) => Some(image),
            _ => None,
        }
    }
}

impl Element for Drawable {
    fn id(&self) -> usize {
        match self {
            Drawable::Stroke(s) => s.id(),
            Drawable::Shape(s) => s.id(),
            Drawable::Text(t) => t.id(),
            Drawable::Image(i) => i.id(),
        }
    }

    fn element_type(&self) -> &'static str {
        match self {
            Drawable::Stroke(s) => s.element_type(),
            Drawable::Shape(s) => s.element_type(),
            Drawable::Text(t) => t.element_type(),
            Drawable::Image(i) => i.element_type(),
        }
    }

    fn rect(&self) -> Rect {
        match self {
            Drawable::Stroke(s) => s.rect(),
            Drawable::Shape(s) => s.rect(),
            Drawable::Text(t) => t.rect(),
            Drawable::Image(i) => i.rect(),
        }
    }

    fn hit_test(&self, pos: Pos2) -> bool {
        match self {
            Drawable::Stroke(s) => s.hit_test(pos),
            Drawable::Shape(s) => s.hit_test(pos),
            Drawable::Text(t) => t.hit_test(pos),
            Drawable::Image(i) => i.hit_test(pos),
        }
    }

    fn translate(&mut self, delta: Vec2) -> Result<(), String> {
        match self {
            Drawable::Stroke(s) => s.translate(delta),
            Drawable::Shape(s) => s.translate(delta),
            Drawable::Text(t) => t.translate(delta),
            Drawable::Image(i) => i.translate(delta),
        }
    }
}

impl From<Stroke> for Drawable {
    fn from(stroke: Stroke) -> Self {
        Drawable::Stroke(stroke)
    }
}

impl From<Shape> for Drawable {
    fn from(shape: Shape) -> Self {
        Drawable::Shape(shape)
    }
}

impl From<TextObject> for Drawable {
    fn from(text: TextObject) -> Self {
        Drawable::Text(text)
    }
}

impl From<ImageObject> for Drawable {
    fn from(image: ImageObject) -> Self {
        Drawable::Image(image)
    }
}

/// Factory functions for creating drawables
pub mod factory {
    use super::*;
    use egui::Color32;

    /// Create a new stroke drawable
    pub fn create_stroke(points: Vec<Pos2>, width: f32, color: Color32) -> Drawable {
        Drawable::Stroke(Stroke::new(points, color, width))
    }

    /// Create a new rectangle drawable
    pub fn create_rectangle(bounds: Rect, style: ShapeStyle) -> Drawable {
        Drawable::Shape(Shape::new(ShapeKind::Rectangle, bounds, style))
    }

    /// Create a new ellipse drawable
    pub fn create_ellipse(bounds: Rect, style: ShapeStyle) -> Drawable {
        Drawable::Shape(Shape::new(ShapeKind::Ellipse, bounds, style))
    }

    /// Create a new text drawable
    pub fn create_text(text: &str, position: Pos2, style: TextStyle) -> Drawable {
        Drawable::Text(TextObject::new(text, position, style))
    }
}
