use egui::{Color32, Pos2, Rect, Vec2};
use image::{Rgba, RgbaImage};
use layered_canvas::element::Element;
use layered_canvas::{
    CanvasConfig, CanvasError, ChangeKind, LayerKind, LayerStore, ShapeKind, ShapeStyle, SnapshotTarget, Stroke,
    ToolMode,
};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn small_store() -> LayerStore {
    LayerStore::new(CanvasConfig::with_size(64, 48)).unwrap()
}

fn horizontal_stroke(y: f32, color: Color32) -> Stroke {
    Stroke::new(vec![Pos2::new(8.0, y), Pos2::new(56.0, y)], color, 6.0)
}

#[test]
fn test_zero_sized_canvas_is_rejected() {
    init();
    assert!(matches!(
        LayerStore::new(CanvasConfig::with_size(0, 10)),
        Err(CanvasError::InvalidDimensions { width: 0, height: 10 })
    ));
}

#[test]
fn test_reference_layers_sit_between_base_and_drawing() {
    init();
    let mut store = small_store();
    let first = store.add_reference_layer("sketch", RgbaImage::new(8, 8)).unwrap();
    let second = store.add_reference_layer("pose", RgbaImage::new(8, 8)).unwrap();

    let kinds: Vec<LayerKind> = store.layers().iter().map(|l| l.kind).collect();
    assert_eq!(
        kinds,
        vec![
            LayerKind::Base,
            LayerKind::Reference,
            LayerKind::Reference,
            LayerKind::Drawing,
            LayerKind::Text,
            LayerKind::Mask
        ]
    );
    // insertion order among equal z-indices
    let ids: Vec<_> = store.layers().iter().filter(|l| l.kind == LayerKind::Reference).map(|l| l.id).collect();
    assert_eq!(ids, vec![first, second]);
}

#[test]
fn test_z_index_reorders_layers() {
    init();
    let mut store = small_store();
    let base = store.layer_of_kind(LayerKind::Base).unwrap().id;
    assert!(store.set_layer_z_index(base, 1_000));
    assert_eq!(store.layers().last().unwrap().id, base);
}

#[test]
fn test_fixed_layers_cannot_be_removed() {
    init();
    let mut store = small_store();
    let drawing = store.layer_of_kind(LayerKind::Drawing).unwrap().id;
    assert!(!store.remove_layer(drawing));
    assert_eq!(store.layers().len(), 4);

    let reference = store.add_reference_layer("ref", RgbaImage::new(4, 4)).unwrap();
    store.set_active_layer(reference);
    assert!(store.remove_layer(reference));
    assert_eq!(store.active_layer_id(), drawing);
    assert!(store.event_log().any(|r| r.kind == ChangeKind::LayerRemoved));
}

#[test]
fn test_unknown_layer_ids_return_false() {
    init();
    let mut store = small_store();
    let unknown = uuid::Uuid::new_v4();
    assert!(!store.set_layer_visibility(unknown, false));
    assert!(!store.set_layer_locked(unknown, true));
    assert!(!store.set_layer_opacity(unknown, 0.5));
    assert!(!store.set_active_layer(unknown));
    assert!(store.layer(unknown).is_none());
}

#[test]
fn test_hidden_layer_is_not_composited() {
    init();
    let mut store = small_store();
    store.add_stroke(horizontal_stroke(24.0, Color32::RED)).unwrap();

    assert!(store.is_render_requested());
    let pixel = *store.present().get_pixel(32, 24);
    assert!(pixel[3] > 0 && pixel[0] > pixel[2]);
    assert!(!store.is_render_requested());

    let drawing = store.layer_of_kind(LayerKind::Drawing).unwrap().id;
    store.set_layer_visibility(drawing, false);
    assert_eq!(*store.present().get_pixel(32, 24), Rgba([0, 0, 0, 0]));
    // content is kept while hidden
    assert_eq!(store.layer(drawing).unwrap().object_count(), 1);
}

#[test]
fn test_present_without_mutation_does_not_rerender() {
    init();
    let mut store = small_store();
    store.add_stroke(horizontal_stroke(10.0, Color32::BLUE)).unwrap();
    store.present();
    let renders = store.render_count();
    store.present();
    assert_eq!(store.render_count(), renders);
}

#[test]
fn test_opacity_is_clamped() {
    init();
    let mut store = small_store();
    let text = store.layer_of_kind(LayerKind::Text).unwrap().id;
    store.set_layer_opacity(text, 3.0);
    assert_eq!(store.layer(text).unwrap().opacity, 1.0);
    store.set_layer_opacity(text, -1.0);
    assert_eq!(store.layer(text).unwrap().opacity, 0.0);
}

#[test]
fn test_base_image_is_fitted_and_centred() {
    init();
    let mut store = LayerStore::new(CanvasConfig::with_size(800, 600)).unwrap();
    store.set_base_image_pixels(RgbaImage::new(1000, 500)).unwrap();

    let placement = store.base_image().unwrap().placement();
    assert!((placement.scale - 0.8).abs() < 1e-6);
    assert!((placement.left - 80.0).abs() < 1e-4);
    assert!((placement.top - 100.0).abs() < 1e-4);
}

#[test]
fn test_set_base_image_replaces_previous() {
    init();
    let mut store = small_store();
    store.set_base_image_pixels(RgbaImage::new(10, 10)).unwrap();
    let second = store.set_base_image_pixels(RgbaImage::new(20, 10)).unwrap();
    let base = store.layer_of_kind(LayerKind::Base).unwrap();
    assert_eq!(base.object_count(), 1);
    assert_eq!(store.base_image().unwrap().id(), second);
}

#[test]
fn test_set_base_image_rejects_garbage_bytes() {
    init();
    let mut store = small_store();
    assert!(matches!(store.set_base_image(b"not an image"), Err(CanvasError::Image(_))));
    assert!(store.base_image().is_none());
}

#[test]
fn test_text_lifecycle() {
    init();
    let mut store = small_store();
    let id = store.add_text("hello", Pos2::new(4.0, 4.0), None).unwrap();
    assert!(store.update_text(id, "world"));
    assert_eq!(store.text_object(id).unwrap().text(), "world");
    assert!(!store.update_text(id + 10_000, "nope"));
    assert!(store.remove_text(id));
    assert!(store.text_objects().is_empty());

    let kinds: Vec<ChangeKind> = store.event_log().map(|r| r.kind).collect();
    assert_eq!(kinds, vec![ChangeKind::TextAdded, ChangeKind::TextUpdated, ChangeKind::TextRemoved]);
}

#[test]
fn test_clear_all_skips_locked_layers() {
    init();
    let mut store = small_store();
    store.add_stroke(horizontal_stroke(12.0, Color32::BLACK)).unwrap();
    store.add_text("stay", Pos2::new(2.0, 2.0), None).unwrap();
    let text = store.layer_of_kind(LayerKind::Text).unwrap().id;
    store.set_layer_locked(text, true);

    store.clear_all();

    assert!(store.layer_of_kind(LayerKind::Drawing).unwrap().is_empty());
    assert_eq!(store.text_objects().len(), 1);
    assert!(store.event_log().any(|r| r.kind == ChangeKind::CanvasCleared));
}

#[test]
fn test_locked_drawing_layer_rejects_strokes() {
    init();
    let mut store = small_store();
    let drawing = store.layer_of_kind(LayerKind::Drawing).unwrap().id;
    store.set_layer_locked(drawing, true);
    assert!(matches!(
        store.add_stroke(horizontal_stroke(5.0, Color32::BLACK)),
        Err(CanvasError::LayerLocked(LayerKind::Drawing))
    ));
    assert!(!store.clear_drawing());
}

#[test]
fn test_mask_mode_routes_brush_to_mask_layer() {
    init();
    let mut store = small_store();
    store.set_tool(ToolMode::Rectangle);
    store.start_mask_drawing();
    assert!(store.is_mask_mode());
    assert_eq!(store.tool(), ToolMode::Brush);
    assert_eq!(store.tool_settings().color, store.config().mask_stroke_color);

    store.pointer_down(Pos2::new(10.0, 10.0));
    assert!(store.is_drawing());
    store.pointer_move(Pos2::new(20.0, 20.0));
    let id = store.pointer_up(Pos2::new(30.0, 20.0)).unwrap();

    let mask = store.layer_of_kind(LayerKind::Mask).unwrap();
    assert!(mask.find(id).is_some());
    assert!(store.layer_of_kind(LayerKind::Drawing).unwrap().is_empty());

    store.end_mask_drawing();
    assert!(!store.is_mask_mode());
    assert_eq!(store.tool(), ToolMode::Rectangle);
    assert_eq!(store.active_layer_id(), store.layer_of_kind(LayerKind::Drawing).unwrap().id);
}

#[test]
fn test_rectangle_tool_adds_shape() {
    init();
    let mut store = small_store();
    store.set_tool(ToolMode::Rectangle);
    store.pointer_down(Pos2::new(5.0, 5.0));
    store.pointer_move(Pos2::new(15.0, 12.0));
    let id = store.pointer_up(Pos2::new(25.0, 20.0)).unwrap();

    let (_, object) = store.object_at(Pos2::new(15.0, 12.0)).unwrap();
    assert_eq!(object.id(), id);
    assert_eq!(object.element_type(), "rectangle");
}

#[test]
fn test_text_tool_places_default_text() {
    init();
    let mut store = small_store();
    store.set_tool(ToolMode::Text);
    let id = store.pointer_down(Pos2::new(6.0, 6.0)).unwrap();
    assert_eq!(store.selected_object(), Some(id));
    assert_eq!(store.text_object(id).unwrap().text(), layered_canvas::layer_store::DEFAULT_TEXT);
}

#[test]
fn test_move_object_translates() {
    init();
    let mut store = small_store();
    let id = store
        .add_shape(
            ShapeKind::Rectangle,
            Rect::from_min_max(Pos2::new(2.0, 2.0), Pos2::new(12.0, 12.0)),
            ShapeStyle::filled(Color32::GREEN),
        )
        .unwrap();
    assert!(store.move_object(id, Vec2::new(30.0, 0.0)));
    let (_, object) = store.object_at(Pos2::new(37.0, 7.0)).unwrap();
    assert_eq!(object.id(), id);
    assert!(!store.move_object(id + 10_000, Vec2::new(1.0, 1.0)));
}

#[test]
fn test_snapshot_round_trip_keeps_layers() {
    init();
    let mut store = small_store();
    store.set_base_image_pixels(RgbaImage::from_pixel(16, 12, Rgba([10, 20, 30, 255]))).unwrap();
    store.add_stroke(horizontal_stroke(20.0, Color32::RED)).unwrap();
    let text_id = store.add_text("caption", Pos2::new(3.0, 30.0), None).unwrap();
    let reference = store.add_reference_layer("ref", RgbaImage::new(6, 6)).unwrap();
    let mask = store.layer_of_kind(LayerKind::Mask).unwrap().id;
    store.set_layer_opacity(mask, 0.25);

    let snapshot = store.capture_snapshot().unwrap();
    let before = store.canvas_state();

    store.clear_all();
    store.set_layer_opacity(mask, 1.0);
    assert!(store.text_objects().is_empty());

    store.restore_snapshot(&snapshot).unwrap();
    let after = store.canvas_state();
    assert_eq!(after.has_base_image, before.has_base_image);
    assert_eq!(after.has_drawing, before.has_drawing);
    assert_eq!(after.has_text, before.has_text);
    assert_eq!(after.layers, before.layers);
    assert_eq!(store.text_object(text_id).unwrap().text(), "caption");
    assert!(store.layer(reference).is_some());
    assert_eq!(store.layer(mask).unwrap().opacity, 0.25);

    let restored = store.event_log().last().unwrap();
    assert_eq!(restored.kind, ChangeKind::StateRestored);
    assert!(restored.during_restore);
    assert!(!store.is_restoring());
}

#[test]
fn test_new_objects_after_restore_get_fresh_ids() {
    init();
    let mut store = small_store();
    let old = store.add_text("a", Pos2::new(1.0, 1.0), None).unwrap();
    let snapshot = store.capture_snapshot().unwrap();
    store.restore_snapshot(&snapshot).unwrap();
    let new = store.add_text("b", Pos2::new(1.0, 20.0), None).unwrap();
    assert!(new > old);
}
