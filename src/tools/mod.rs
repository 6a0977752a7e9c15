use std::fmt;

use egui::{Color32, Pos2, Rect, Vec2};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::CanvasConfig;
use crate::element::{MutableStroke, Shape, ShapeKind, ShapeStyle, Stroke, StrokeMode, validate_rect};

/// Tool selected on the canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolMode {
    #[default]
    Brush,
    Eraser,
    Select,
    Lasso,
    Rectangle,
    Circle,
    Text,
    Move,
}

/// Whether pointer input creates content or picks existing content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InteractionMode {
    Drawing,
    Selection,
}

impl ToolMode {
    pub fn all() -> &'static [ToolMode] {
        &[
            ToolMode::Brush,
            ToolMode::Eraser,
            ToolMode::Select,
            ToolMode::Lasso,
            ToolMode::Rectangle,
            ToolMode::Circle,
            ToolMode::Text,
            ToolMode::Move,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ToolMode::Brush => "brush",
            ToolMode::Eraser => "eraser",
            ToolMode::Select => "select",
            ToolMode::Lasso => "lasso",
            ToolMode::Rectangle => "rectangle",
            ToolMode::Circle => "circle",
            ToolMode::Text => "text",
            ToolMode::Move => "move",
        }
    }

    pub fn interaction(self) -> InteractionMode {
        match self {
            ToolMode::Select | ToolMode::Move => InteractionMode::Selection,
            _ => InteractionMode::Drawing,
        }
    }
}

impl fmt::Display for ToolMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stroke parameters a tool draws with
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToolSettings {
    pub color: Color32,
    pub width: f32,
    /// Fill for closed shapes; mask shapes are filled so the region is covered
    pub fill: Option<Color32>,
    pub interaction: InteractionMode,
}

impl ToolSettings {
    pub fn for_mode(mode: ToolMode, config: &CanvasConfig, mask_mode: bool) -> Self {
        let color = if mask_mode { config.mask_stroke_color } else { config.brush_color };
        let width = match mode {
            ToolMode::Eraser => config.eraser_width,
            ToolMode::Rectangle | ToolMode::Circle | ToolMode::Lasso => config.shape_stroke_width,
            _ => config.brush_width,
        };
        let closed_shape = matches!(mode, ToolMode::Rectangle | ToolMode::Circle | ToolMode::Lasso);
        Self {
            color,
            width,
            fill: (mask_mode && closed_shape).then_some(color),
            interaction: mode.interaction(),
        }
    }

    fn shape_style(&self) -> ShapeStyle {
        ShapeStyle {
            fill: self.fill,
            stroke_color: self.color,
            stroke_width: self.width,
        }
    }
}

/// What a finished (or continuing) gesture asks the layer store to do
#[derive(Debug, Clone, PartialEq)]
pub enum ToolAction {
    AddStroke(Stroke),
    AddShape(Shape),
    PlaceText(Pos2),
    Select(Pos2),
    BeginMove(Pos2),
    MoveBy(Vec2),
    /// Release of a move gesture with the last movement since the previous sample
    EndMove(Vec2),
}

#[derive(Debug, Clone)]
enum Gesture {
    Stroke(MutableStroke),
    Drag { start: Pos2, current: Pos2 },
    Lasso(Vec<Pos2>),
    Move { last: Pos2 },
}

/// Turns pointer samples into [`ToolAction`]s for the current tool.
#[derive(Debug, Clone)]
pub struct ToolController {
    mode: ToolMode,
    settings: ToolSettings,
    gesture: Option<Gesture>,
}

impl ToolController {
    pub fn new(config: &CanvasConfig) -> Self {
        Self {
            mode: ToolMode::Brush,
            settings: ToolSettings::for_mode(ToolMode::Brush, config, false),
            gesture: None,
        }
    }

    pub fn mode(&self) -> ToolMode {
        self.mode
    }

    pub fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut ToolSettings {
        &mut self.settings
    }

    /// Switch tools, dropping any unfinished gesture
    pub fn set_mode(&mut self, mode: ToolMode, settings: ToolSettings) {
        if self.gesture.take().is_some() {
            debug!("Dropped unfinished {} gesture", self.mode);
        }
        self.mode = mode;
        self.settings = settings;
    }

    /// True while a stroke, drag or lasso is in progress
    pub fn is_drawing(&self) -> bool {
        matches!(
            self.gesture,
            Some(Gesture::Stroke(_) | Gesture::Drag { .. } | Gesture::Lasso(_))
        )
    }

    pub fn cancel(&mut self) {
        self.gesture = None;
    }

    pub fn pointer_down(&mut self, pos: Pos2) -> Option<ToolAction> {
        self.gesture = None;
        match self.mode {
            ToolMode::Brush | ToolMode::Eraser => {
                let mode = if self.mode == ToolMode::Eraser {
                    StrokeMode::Erase
                } else {
                    StrokeMode::Paint
                };
                let mut stroke = MutableStroke::new(self.settings.color, self.settings.width, mode);
                stroke.add_point(pos);
                self.gesture = Some(Gesture::Stroke(stroke));
                None
            }
            ToolMode::Rectangle | ToolMode::Circle => {
                self.gesture = Some(Gesture::Drag { start: pos, current: pos });
                None
            }
            ToolMode::Lasso => {
                self.gesture = Some(Gesture::Lasso(vec![pos]));
                None
            }
            ToolMode::Text => Some(ToolAction::PlaceText(pos)),
            ToolMode::Select => Some(ToolAction::Select(pos)),
            ToolMode::Move => {
                self.gesture = Some(Gesture::Move { last: pos });
                Some(ToolAction::BeginMove(pos))
            }
        }
    }

    pub fn pointer_move(&mut self, pos: Pos2) -> Option<ToolAction> {
        match self.gesture.as_mut()? {
            Gesture::Stroke(stroke) => {
                stroke.add_point(pos);
                None
            }
            Gesture::Drag { current, .. } => {
                *current = pos;
                None
            }
            Gesture::Lasso(points) => {
                if points.last() != Some(&pos) {
                    points.push(pos);
                }
                None
            }
            Gesture::Move { last } => {
                let delta = pos - *last;
                *last = pos;
                (delta != Vec2::ZERO).then_some(ToolAction::MoveBy(delta))
            }
        }
    }

    pub fn pointer_up(&mut self, pos: Pos2) -> Option<ToolAction> {
        // the release position counts as a final sample
        let trailing = self.pointer_move(pos);
        match self.gesture.take()? {
            Gesture::Stroke(stroke) => (!stroke.is_empty()).then(|| ToolAction::AddStroke(stroke.into_stroke())),
            Gesture::Drag { start, current } => {
                let bounds = Rect::from_two_pos(start, current);
                if validate_rect(&bounds).is_err() {
                    debug!("Ignoring degenerate {} drag", self.mode);
                    return None;
                }
                let kind = if self.mode == ToolMode::Circle {
                    ShapeKind::Ellipse
                } else {
                    ShapeKind::Rectangle
                };
                Some(ToolAction::AddShape(Shape::new(kind, bounds, self.settings.shape_style())))
            }
            Gesture::Lasso(points) => {
                if points.len() < 3 {
                    debug!("Ignoring lasso with {} points", points.len());
                    return None;
                }
                Some(ToolAction::AddShape(Shape::polygon(points, self.settings.shape_style())))
            }
            Gesture::Move { .. } => {
                let delta = match trailing {
                    Some(ToolAction::MoveBy(delta)) => delta,
                    _ => Vec2::ZERO,
                };
                Some(ToolAction::EndMove(delta))
            }
        }
    }
}
