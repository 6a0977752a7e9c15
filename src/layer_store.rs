use egui::{Color32, Pos2, Rect, Vec2};
use image::RgbaImage;
use log::{debug, info, warn};
use serde_json::json;
use uuid::Uuid;

use crate::compositor::{Compositor, RenderContext};
use crate::config::CanvasConfig;
use crate::element::{Drawable, Element, ImageObject, Shape, ShapeKind, ShapeStyle, Stroke, TextObject, TextStyle};
use crate::error::{CanvasError, CanvasResult};
use crate::event::{ChangeDetector, ChangeKind, ChangeRecord, ContentAnalysis, Listener, SubscriptionId, analyze_content};
use crate::export::{CanvasSnapshot, ExportEngine, ExportOptions};
use crate::id_generator;
use crate::layer::{BlendMode, Layer, LayerKind, LayerSummary};
use crate::state::{
    CanvasMetadata, CanvasMode, CanvasState, ReferenceLayerBlob, SnapshotData, SnapshotMetadata, SnapshotTarget,
    decode_layer_blob, encode_layer_blob,
};
use crate::tools::{ToolAction, ToolController, ToolMode, ToolSettings};
use crate::util::time;

/// Text placed by the text tool before the user types anything
pub const DEFAULT_TEXT: &str = "Text";

const BASE: usize = 0;
const DRAWING: usize = 1;
const TEXT: usize = 2;
const MASK: usize = 3;

fn fixed_slot(kind: LayerKind) -> Option<usize> {
    match kind {
        LayerKind::Base => Some(BASE),
        LayerKind::Drawing => Some(DRAWING),
        LayerKind::Text => Some(TEXT),
        LayerKind::Mask => Some(MASK),
        LayerKind::Reference => None,
    }
}

/// What to go back to when mask drawing ends
#[derive(Debug, Clone, Copy)]
struct MaskSession {
    previous_layer: Uuid,
    previous_tool: ToolMode,
}

#[derive(Debug, Clone, Copy)]
struct MoveState {
    object: usize,
    total: Vec2,
}

/// Owns every layer of the canvas and is the only thing that mutates them.
///
/// Base, drawing, text and mask layers always exist. Reference layers can be
/// added and removed. Mutations request a render; [`LayerStore::present`]
/// performs it.
#[derive(Debug)]
pub struct LayerStore {
    config: CanvasConfig,
    ctx: RenderContext,
    fixed: [Layer; 4],
    /// In insertion order
    references: Vec<Layer>,
    active_layer: Uuid,
    compositor: Compositor,
    detector: ChangeDetector,
    tools: ToolController,
    mask_session: Option<MaskSession>,
    moving: Option<MoveState>,
    selected: Option<usize>,
    is_restoring: bool,
    last_modified: u64,
    /// Bumped on every content mutation
    revision: u64,
}

impl LayerStore {
    pub fn new(config: CanvasConfig) -> CanvasResult<Self> {
        config.validate()?;
        let mut ctx = RenderContext::new(config.width, config.height);
        ctx.font = config.load_font()?;

        let fixed = LayerKind::FIXED.map(Layer::new);
        let active_layer = fixed[DRAWING].id;
        info!("Created {}x{} canvas", config.width, config.height);
        Ok(Self {
            ctx,
            fixed,
            references: Vec::new(),
            active_layer,
            compositor: Compositor::new(config.width, config.height),
            detector: ChangeDetector::new(config.event_log_capacity),
            tools: ToolController::new(&config),
            mask_session: None,
            moving: None,
            selected: None,
            is_restoring: false,
            last_modified: time::timestamp_millis(),
            revision: 0,
            config,
        })
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    pub fn width(&self) -> u32 {
        self.ctx.width
    }

    pub fn height(&self) -> u32 {
        self.ctx.height
    }

    // ---- layers ----

    /// All layers in canonical order, bottom to top.
    ///
    /// Sorted by z-index, then by kind, then by insertion order.
    pub fn layers(&self) -> Vec<&Layer> {
        let mut layers: Vec<&Layer> = self.fixed.iter().chain(self.references.iter()).collect();
        layers.sort_by_key(|l| (l.z_index, l.kind.rank()));
        layers
    }

    pub fn layer(&self, id: Uuid) -> Option<&Layer> {
        self.fixed.iter().chain(self.references.iter()).find(|l| l.id == id)
    }

    fn layer_mut(&mut self, id: Uuid) -> Option<&mut Layer> {
        self.fixed.iter_mut().chain(self.references.iter_mut()).find(|l| l.id == id)
    }

    /// The fixed layer of `kind`, or the first reference layer
    pub fn layer_of_kind(&self, kind: LayerKind) -> Option<&Layer> {
        match fixed_slot(kind) {
            Some(slot) => Some(&self.fixed[slot]),
            None => self.references.first(),
        }
    }

    pub fn active_layer_id(&self) -> Uuid {
        self.active_layer
    }

    /// Route subsequent drawing to layer `id`. Unknown ids are ignored.
    pub fn set_active_layer(&mut self, id: Uuid) -> bool {
        if self.layer(id).is_none() {
            warn!("Ignoring unknown active layer {}", id);
            return false;
        }
        self.active_layer = id;
        true
    }

    pub fn set_layer_visibility(&mut self, id: Uuid, visible: bool) -> bool {
        let Some(layer) = self.layer_mut(id) else {
            warn!("Cannot change visibility of unknown layer {}", id);
            return false;
        };
        layer.visible = visible;
        let kind = layer.kind;
        self.compositor.request_render();
        self.emit(
            ChangeKind::LayerVisibilityChanged,
            json!({ "layerId": id, "type": kind, "visible": visible }),
        );
        true
    }

    pub fn set_layer_locked(&mut self, id: Uuid, locked: bool) -> bool {
        let Some(layer) = self.layer_mut(id) else {
            warn!("Cannot change lock of unknown layer {}", id);
            return false;
        };
        layer.locked = locked;
        let kind = layer.kind;
        self.compositor.request_render();
        self.emit(
            ChangeKind::LayerLockChanged,
            json!({ "layerId": id, "type": kind, "locked": locked }),
        );
        true
    }

    /// Opacity is clamped to 0..=1
    pub fn set_layer_opacity(&mut self, id: Uuid, opacity: f32) -> bool {
        let opacity = if opacity.is_nan() { 1.0 } else { opacity.clamp(0.0, 1.0) };
        self.update_layer(id, json!({ "opacity": opacity }), |layer| layer.opacity = opacity)
    }

    pub fn set_layer_blend_mode(&mut self, id: Uuid, blend_mode: BlendMode) -> bool {
        self.update_layer(id, json!({ "blendMode": blend_mode }), |layer| layer.blend_mode = blend_mode)
    }

    pub fn set_layer_z_index(&mut self, id: Uuid, z_index: i32) -> bool {
        self.update_layer(id, json!({ "zIndex": z_index }), |layer| layer.z_index = z_index)
    }

    pub fn rename_layer(&mut self, id: Uuid, name: &str) -> bool {
        self.update_layer(id, json!({ "name": name }), |layer| layer.name = name.to_string())
    }

    fn update_layer(&mut self, id: Uuid, details: serde_json::Value, apply: impl FnOnce(&mut Layer)) -> bool {
        let Some(layer) = self.layer_mut(id) else {
            warn!("Cannot update unknown layer {}", id);
            return false;
        };
        apply(layer);
        self.compositor.request_render();
        self.emit(ChangeKind::LayerPropertiesChanged, json!({ "layerId": id, "changes": details }));
        true
    }

    /// Add a reference layer holding `image`, fitted to the canvas.
    pub fn add_reference_layer(&mut self, name: &str, image: RgbaImage) -> CanvasResult<Uuid> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(CanvasError::InvalidDimensions { width, height });
        }
        let mut layer = Layer::with_name(LayerKind::Reference, name);
        layer.push(ImageObject::fitted(image, self.width(), self.height()).into());
        let id = layer.id;
        self.references.push(layer);
        self.touch();
        self.emit(
            ChangeKind::LayerPropertiesChanged,
            json!({ "layerId": id, "type": LayerKind::Reference, "added": true }),
        );
        Ok(id)
    }

    /// Remove a reference layer. Fixed layers cannot be removed.
    pub fn remove_layer(&mut self, id: Uuid) -> bool {
        let Some(index) = self.references.iter().position(|l| l.id == id) else {
            warn!("Cannot remove layer {}: not a reference layer", id);
            return false;
        };
        let layer = self.references.remove(index);
        if self.active_layer == id {
            self.active_layer = self.fixed[DRAWING].id;
        }
        self.touch();
        self.emit(ChangeKind::LayerRemoved, json!({ "layerId": id, "name": layer.name }));
        true
    }

    // ---- content ----

    /// Decode `bytes` and make the image the canvas base.
    pub fn set_base_image(&mut self, bytes: &[u8]) -> CanvasResult<usize> {
        let image = image::load_from_memory(bytes)?.to_rgba8();
        self.set_base_image_pixels(image)
    }

    /// Replace the base image. The image is scaled to fit the canvas,
    /// preserving aspect ratio, and centred.
    pub fn set_base_image_pixels(&mut self, image: RgbaImage) -> CanvasResult<usize> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(CanvasError::InvalidDimensions { width, height });
        }
        self.ensure_unlocked(BASE)?;

        let object = ImageObject::fitted(image, self.width(), self.height());
        let placement = object.placement();
        let id = object.id();
        self.fixed[BASE].content = vec![object.into()];
        self.touch();
        self.emit(
            ChangeKind::BaseImageAdded,
            json!({
                "id": id,
                "width": width,
                "height": height,
                "scale": placement.scale,
                "left": placement.left,
                "top": placement.top,
            }),
        );
        Ok(id)
    }

    pub fn remove_base_image(&mut self) -> bool {
        if self.fixed[BASE].is_empty() || self.ensure_unlocked(BASE).is_err() {
            return false;
        }
        self.fixed[BASE].clear();
        self.touch();
        self.emit(ChangeKind::BaseImageRemoved, json!({}));
        true
    }

    pub fn base_image(&self) -> Option<&ImageObject> {
        self.fixed[BASE].content.iter().find_map(|d| d.as_image())
    }

    /// Add a text object to the text layer. `None` uses the default style in the brush colour.
    pub fn add_text(&mut self, text: &str, position: Pos2, style: Option<TextStyle>) -> CanvasResult<usize> {
        self.ensure_unlocked(TEXT)?;
        let style = style.unwrap_or_else(|| TextStyle {
            color: self.config.brush_color,
            ..TextStyle::default()
        });
        let object = TextObject::new(text, position, style);
        let id = object.id();
        self.fixed[TEXT].push(object.into());
        self.touch();
        self.emit(ChangeKind::TextAdded, json!({ "id": id, "text": text }));
        Ok(id)
    }

    /// Replace the string of text object `id`. False if unknown or locked.
    pub fn update_text(&mut self, id: usize, text: &str) -> bool {
        self.edit_text(id, |object| object.set_text(text))
    }

    pub fn update_text_style(&mut self, id: usize, style: TextStyle) -> bool {
        self.edit_text(id, |object| object.set_style(style))
    }

    fn edit_text(&mut self, id: usize, apply: impl FnOnce(&mut TextObject)) -> bool {
        if self.ensure_unlocked(TEXT).is_err() {
            return false;
        }
        let Some(object) = self.fixed[TEXT].find_mut(id).and_then(Drawable::as_text_mut) else {
            warn!("Unknown text object {}", id);
            return false;
        };
        apply(object);
        let text = object.text().to_string();
        self.touch();
        self.emit(ChangeKind::TextUpdated, json!({ "id": id, "text": text }));
        true
    }

    pub fn remove_text(&mut self, id: usize) -> bool {
        if self.ensure_unlocked(TEXT).is_err() {
            return false;
        }
        if self.fixed[TEXT].remove(id).is_none() {
            warn!("Unknown text object {}", id);
            return false;
        }
        if self.selected == Some(id) {
            self.selected = None;
        }
        self.touch();
        self.emit(ChangeKind::TextRemoved, json!({ "id": id }));
        true
    }

    pub fn text_object(&self, id: usize) -> Option<&TextObject> {
        self.fixed[TEXT].find(id).and_then(Drawable::as_text)
    }

    pub fn text_objects(&self) -> Vec<&TextObject> {
        self.fixed[TEXT].content.iter().filter_map(Drawable::as_text).collect()
    }

    /// Add a finished freehand stroke to the active drawing surface.
    ///
    /// Strokes do not emit change events; `detect_changes` picks them up.
    pub fn add_stroke(&mut self, stroke: Stroke) -> CanvasResult<usize> {
        let target = self.draw_target();
        self.push_to(target, stroke.into())
    }

    /// Add a shape to the active drawing surface
    pub fn add_shape(&mut self, kind: ShapeKind, bounds: Rect, style: ShapeStyle) -> CanvasResult<usize> {
        let shape = match kind {
            ShapeKind::Polygon(points) => Shape::polygon(points, style),
            kind => Shape::new(kind, bounds, style),
        };
        let id = self.push_to(self.draw_target(), shape.into())?;
        self.emit(ChangeKind::ShapeAdded, json!({ "id": id }));
        Ok(id)
    }

    /// Translate object `id`, wherever it lives
    pub fn move_object(&mut self, id: usize, delta: Vec2) -> bool {
        if let Err(e) = self.translate_object(id, delta) {
            warn!("Cannot move object {}: {}", id, e);
            return false;
        }
        self.emit(ChangeKind::ObjectMoved, json!({ "id": id, "dx": delta.x, "dy": delta.y }));
        true
    }

    /// Topmost object under `pos` on a visible layer, with its layer id
    pub fn object_at(&self, pos: Pos2) -> Option<(Uuid, &Drawable)> {
        self.layers()
            .into_iter()
            .rev()
            .filter(|l| l.visible)
            .find_map(|l| l.object_at(pos).map(|d| (l.id, d)))
    }

    pub fn selected_object(&self) -> Option<usize> {
        self.selected
    }

    /// Empty every unlocked layer
    pub fn clear_all(&mut self) {
        let mut skipped = Vec::new();
        for layer in self.fixed.iter_mut().chain(self.references.iter_mut()) {
            if layer.locked {
                skipped.push(layer.kind);
            } else {
                layer.clear();
            }
        }
        if !skipped.is_empty() {
            warn!("clear_all left locked layers untouched: {:?}", skipped);
        }
        self.selected = None;
        self.touch();
        self.emit(ChangeKind::CanvasCleared, json!({ "skippedLocked": skipped }));
    }

    pub fn clear_drawing(&mut self) -> bool {
        if self.ensure_unlocked(DRAWING).is_err() {
            return false;
        }
        self.fixed[DRAWING].clear();
        self.touch();
        self.emit(ChangeKind::DrawingCleared, json!({}));
        true
    }

    // ---- mask mode ----

    /// Draw on the mask layer with the mask colour until `end_mask_drawing`
    pub fn start_mask_drawing(&mut self) {
        if self.mask_session.is_some() {
            return;
        }
        self.mask_session = Some(MaskSession {
            previous_layer: self.active_layer,
            previous_tool: self.tools.mode(),
        });
        self.active_layer = self.fixed[MASK].id;
        self.set_tool(ToolMode::Brush);
        self.emit(ChangeKind::MaskModeStarted, json!({}));
    }

    pub fn end_mask_drawing(&mut self) {
        let Some(session) = self.mask_session.take() else {
            return;
        };
        self.active_layer = if self.layer(session.previous_layer).is_some() {
            session.previous_layer
        } else {
            self.fixed[DRAWING].id
        };
        self.set_tool(session.previous_tool);
        self.emit(ChangeKind::MaskModeEnded, json!({}));
    }

    pub fn is_mask_mode(&self) -> bool {
        self.mask_session.is_some()
    }

    // ---- tools and pointer input ----

    /// Select a tool; its stroke settings come from the configuration
    pub fn set_tool(&mut self, mode: ToolMode) {
        let settings = ToolSettings::for_mode(mode, &self.config, self.is_mask_mode());
        self.tools.set_mode(mode, settings);
        self.moving = None;
        debug!("Tool set to {}", mode);
    }

    pub fn tool(&self) -> ToolMode {
        self.tools.mode()
    }

    pub fn tool_settings(&self) -> &ToolSettings {
        self.tools.settings()
    }

    pub fn set_tool_color(&mut self, color: Color32) {
        self.tools.settings_mut().color = color;
    }

    pub fn set_tool_width(&mut self, width: f32) {
        self.tools.settings_mut().width = width.max(0.5);
    }

    /// True while a stroke or shape drag is in progress
    pub fn is_drawing(&self) -> bool {
        self.tools.is_drawing()
    }

    pub fn is_restoring(&self) -> bool {
        self.is_restoring
    }

    /// Returns the id of an object created, selected or grabbed by the press
    pub fn pointer_down(&mut self, pos: Pos2) -> Option<usize> {
        let action = self.tools.pointer_down(pos)?;
        self.apply_action(action)
    }

    pub fn pointer_move(&mut self, pos: Pos2) -> Option<usize> {
        let action = self.tools.pointer_move(pos)?;
        self.apply_action(action)
    }

    /// Returns the id of the object the gesture produced or moved
    pub fn pointer_up(&mut self, pos: Pos2) -> Option<usize> {
        let action = self.tools.pointer_up(pos)?;
        self.apply_action(action)
    }

    fn apply_action(&mut self, action: ToolAction) -> Option<usize> {
        let result = match action {
            ToolAction::AddStroke(stroke) => self.add_stroke(stroke).map(Some),
            ToolAction::AddShape(shape) => self
                .push_to(self.draw_target(), shape.into())
                .map(Some),
            ToolAction::PlaceText(pos) => {
                let id = self.add_text(DEFAULT_TEXT, pos, None);
                self.selected = id.as_ref().ok().copied();
                id.map(Some)
            }
            ToolAction::Select(pos) => {
                self.selected = self.object_at(pos).map(|(_, d)| d.id());
                Ok(self.selected)
            }
            ToolAction::BeginMove(pos) => {
                self.selected = self.object_at(pos).map(|(_, d)| d.id());
                self.moving = self.selected.map(|object| MoveState {
                    object,
                    total: Vec2::ZERO,
                });
                Ok(self.selected)
            }
            ToolAction::MoveBy(delta) => self.drag_selected(delta),
            ToolAction::EndMove(delta) => {
                let result = self.drag_selected(delta);
                if let Some(state) = self.moving.take() {
                    if state.total != Vec2::ZERO {
                        self.emit(
                            ChangeKind::ObjectMoved,
                            json!({ "id": state.object, "dx": state.total.x, "dy": state.total.y }),
                        );
                    }
                }
                result
            }
        };
        match result {
            Ok(id) => id,
            Err(e) => {
                warn!("Tool {} failed: {}", self.tools.mode(), e);
                None
            }
        }
    }

    fn drag_selected(&mut self, delta: Vec2) -> CanvasResult<Option<usize>> {
        let Some(state) = self.moving else {
            return Ok(None);
        };
        if delta != Vec2::ZERO {
            self.translate_object(state.object, delta)?;
            if let Some(moving) = self.moving.as_mut() {
                moving.total += delta;
            }
        }
        Ok(Some(state.object))
    }

    // ---- state and change detection ----

    /// Pure projection of the current content
    pub fn canvas_state(&self) -> CanvasState {
        let has_base_image = !self.fixed[BASE].is_empty();
        CanvasState {
            has_base_image,
            has_drawing: !self.fixed[DRAWING].is_empty(),
            has_text: !self.fixed[TEXT].is_empty(),
            has_mask: !self.fixed[MASK].is_empty(),
            layers: self.layers().into_iter().map(Layer::summary).collect(),
            metadata: CanvasMetadata {
                last_modified: self.last_modified,
                mode: if has_base_image { CanvasMode::Edit } else { CanvasMode::Generate },
                width: self.width(),
                height: self.height(),
            },
        }
    }

    /// Changes since the last detection or emitted event.
    ///
    /// The first call only establishes the baseline and returns nothing.
    pub fn detect_changes(&mut self) -> Vec<ChangeKind> {
        let state = self.canvas_state();
        self.detector.detect_changes(state)
    }

    pub fn analyze_content(&self) -> ContentAnalysis {
        analyze_content(&self.canvas_state())
    }

    pub fn subscribe(&self, listener: Listener) -> SubscriptionId {
        self.detector.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.detector.unsubscribe(id)
    }

    pub fn event_log(&self) -> impl Iterator<Item = &ChangeRecord> {
        self.detector.event_log()
    }

    pub fn last_modified(&self) -> u64 {
        self.last_modified
    }

    /// Changes whenever layer content changes; selection and view state leave it alone
    pub fn revision(&self) -> u64 {
        self.revision
    }

    // ---- rendering and export ----

    /// Render if anything changed since the last call, and return the surface
    pub fn present(&mut self) -> &RgbaImage {
        let layers = self.fixed.iter().chain(self.references.iter());
        let mut ordered: Vec<&Layer> = layers.collect();
        ordered.sort_by_key(|l| (l.z_index, l.kind.rank()));
        self.compositor.present(ordered, &self.ctx)
    }

    pub fn is_render_requested(&self) -> bool {
        self.compositor.is_render_requested()
    }

    pub fn render_count(&self) -> u64 {
        self.compositor.render_count()
    }

    /// Frozen copy of the layers for exporting
    pub fn snapshot(&self) -> CanvasSnapshot {
        CanvasSnapshot::new(
            self.layers().into_iter().cloned().collect(),
            self.ctx.clone(),
            ExportOptions {
                background: self.config.background,
                mask_blur_sigma: self.config.mask_blur_sigma,
                thumbnail_size: self.config.thumbnail_size,
            },
            self.canvas_state(),
        )
    }

    pub fn export_engine(&self) -> ExportEngine {
        ExportEngine::new(self.snapshot())
    }

    // ---- internals ----

    fn emit(&mut self, kind: ChangeKind, details: serde_json::Value) {
        let state = self.canvas_state();
        let during_restore = self.is_restoring;
        self.detector.emit_change(kind, details, state, during_restore);
    }

    fn touch(&mut self) {
        self.last_modified = time::timestamp_millis();
        self.revision += 1;
        self.compositor.request_render();
    }

    fn ensure_unlocked(&self, slot: usize) -> CanvasResult<()> {
        let layer = &self.fixed[slot];
        if layer.locked {
            warn!("Layer {} is locked", layer.kind);
            return Err(CanvasError::LayerLocked(layer.kind));
        }
        Ok(())
    }

    /// Layer freehand and shape input goes to
    fn draw_target(&self) -> Uuid {
        match self.layer(self.active_layer).map(|l| l.kind) {
            Some(LayerKind::Drawing | LayerKind::Mask | LayerKind::Reference) => self.active_layer,
            _ => self.fixed[DRAWING].id,
        }
    }

    fn push_to(&mut self, layer_id: Uuid, drawable: Drawable) -> CanvasResult<usize> {
        let layer = self.layer_mut(layer_id).ok_or(CanvasError::UnknownLayer(layer_id))?;
        if layer.locked {
            warn!("Layer {} is locked", layer.kind);
            return Err(CanvasError::LayerLocked(layer.kind));
        }
        let id = drawable.id();
        debug!("Adding {} {} to {} layer", drawable.element_type(), id, layer.kind);
        layer.push(drawable);
        self.touch();
        Ok(id)
    }

    fn translate_object(&mut self, id: usize, delta: Vec2) -> CanvasResult<()> {
        let layer = self
            .fixed
            .iter_mut()
            .chain(self.references.iter_mut())
            .find(|l| l.find(id).is_some())
            .ok_or_else(|| CanvasError::Render(format!("no object with id {id}")))?;
        if layer.locked {
            return Err(CanvasError::LayerLocked(layer.kind));
        }
        if let Some(object) = layer.find_mut(id) {
            object.translate(delta).map_err(CanvasError::Render)?;
        }
        self.touch();
        Ok(())
    }

    fn snapshot_metadata(&self) -> SnapshotMetadata {
        let state = self.canvas_state();
        SnapshotMetadata {
            width: self.width(),
            height: self.height(),
            mode: state.metadata.mode,
            captured_at: time::timestamp_millis(),
            layers: state.layers,
        }
    }
}

/// Layer contents decoded from a snapshot, ready to swap in
struct DecodedSnapshot {
    fixed: [Vec<Drawable>; 4],
    references: Vec<(LayerSummary, Vec<Drawable>)>,
    metadata: Option<SnapshotMetadata>,
}

impl DecodedSnapshot {
    fn decode(data: &SnapshotData) -> CanvasResult<Self> {
        let blob = |bytes: &Option<Vec<u8>>| -> CanvasResult<Vec<Drawable>> {
            bytes.as_deref().map(decode_layer_blob).transpose().map(Option::unwrap_or_default)
        };
        let fixed = [
            blob(&data.base_image)?,
            blob(&data.drawing_layer)?,
            blob(&data.text_layer)?,
            blob(&data.mask_layer)?,
        ];
        let references = match &data.reference_layers {
            Some(bytes) => {
                let stored: Vec<ReferenceLayerBlob> = bincode::deserialize(bytes)?;
                stored
                    .into_iter()
                    .map(|r| -> CanvasResult<_> { Ok((r.summary, decode_layer_blob(&r.content)?)) })
                    .collect::<CanvasResult<Vec<_>>>()?
            }
            None => Vec::new(),
        };
        let decoded = Self {
            fixed,
            references,
            metadata: data.decode_metadata()?,
        };
        decoded.validate()?;
        Ok(decoded)
    }

    fn validate(&self) -> CanvasResult<()> {
        let all = self
            .fixed
            .iter()
            .flatten()
            .chain(self.references.iter().flat_map(|(_, content)| content));
        for drawable in all {
            if let Drawable::Image(image) = drawable {
                if !image.is_well_formed() {
                    return Err(CanvasError::Restore(format!("image {} has a malformed pixel buffer", image.id())));
                }
            }
        }
        Ok(())
    }

    fn max_object_id(&self) -> usize {
        self.fixed
            .iter()
            .flatten()
            .chain(self.references.iter().flat_map(|(_, content)| content))
            .map(|d| d.id())
            .max()
            .unwrap_or(0)
    }
}

fn apply_summary(layer: &mut Layer, summary: &LayerSummary) {
    layer.name = summary.name.clone();
    layer.visible = summary.visible;
    layer.locked = summary.locked;
    layer.opacity = summary.opacity;
    layer.blend_mode = summary.blend_mode;
    layer.z_index = summary.z_index;
}

impl SnapshotTarget for LayerStore {
    fn capture_snapshot(&self) -> CanvasResult<SnapshotData> {
        let blob = |slot: usize| -> CanvasResult<Option<Vec<u8>>> {
            let layer = &self.fixed[slot];
            if layer.is_empty() {
                Ok(None)
            } else {
                encode_layer_blob(&layer.content).map(Some)
            }
        };
        let reference_layers = if self.references.is_empty() {
            None
        } else {
            let stored = self
                .references
                .iter()
                .map(|layer| -> CanvasResult<_> {
                    Ok(ReferenceLayerBlob {
                        summary: layer.summary(),
                        content: encode_layer_blob(&layer.content)?,
                    })
                })
                .collect::<CanvasResult<Vec<_>>>()?;
            Some(bincode::serialize(&stored)?)
        };
        Ok(SnapshotData {
            base_image: blob(BASE)?,
            drawing_layer: blob(DRAWING)?,
            text_layer: blob(TEXT)?,
            mask_layer: blob(MASK)?,
            reference_layers,
            metadata: Some(self.snapshot_metadata().to_bytes()?),
        })
    }

    fn capture_thumbnail(&self) -> Option<Vec<u8>> {
        if !self.config.capture_thumbnails {
            return None;
        }
        match self.export_engine().export_thumbnail() {
            Ok(encoded) => Some(encoded.bytes),
            Err(e) => {
                warn!("Failed to capture thumbnail: {}", e);
                None
            }
        }
    }

    /// Clears every layer, then reapplies whatever the snapshot holds.
    ///
    /// All blobs are decoded before anything is cleared, so a bad snapshot
    /// leaves the current content untouched.
    fn restore_snapshot(&mut self, data: &SnapshotData) -> CanvasResult<()> {
        let decoded = match DecodedSnapshot::decode(data) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::error!("Rejected snapshot: {}", e);
                return Err(CanvasError::Restore(e.to_string()));
            }
        };

        self.is_restoring = true;
        self.tools.cancel();
        self.moving = None;
        self.selected = None;
        self.mask_session = None;
        self.set_tool(self.tools.mode());

        id_generator::reserve_through(decoded.max_object_id());
        let DecodedSnapshot {
            fixed,
            references,
            metadata,
        } = decoded;

        for (layer, content) in self.fixed.iter_mut().zip(fixed) {
            layer.content = content;
            if let Some(summary) = metadata
                .as_ref()
                .and_then(|m| m.layers.iter().find(|s| s.kind == layer.kind))
            {
                apply_summary(layer, summary);
            }
        }
        self.references = references
            .into_iter()
            .map(|(summary, content)| {
                let mut layer = Layer::with_name(LayerKind::Reference, &summary.name);
                layer.id = summary.id;
                apply_summary(&mut layer, &summary);
                layer.content = content;
                layer
            })
            .collect();
        if self.layer(self.active_layer).is_none() {
            self.active_layer = self.fixed[DRAWING].id;
        }

        self.touch();
        self.emit(ChangeKind::StateRestored, json!({}));
        self.is_restoring = false;
        debug!("Restored snapshot ({} bytes)", data.byte_len());
        Ok(())
    }
}
