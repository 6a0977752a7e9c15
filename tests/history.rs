use egui::{Color32, Pos2};
use layered_canvas::{
    CanvasConfig, CanvasError, CanvasResult, HistoryManager, ImageFormat, LayerStore, SnapshotData, SnapshotTarget,
    Stroke,
};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn small_store() -> LayerStore {
    let config = CanvasConfig {
        capture_thumbnails: false,
        ..CanvasConfig::with_size(48, 32)
    };
    LayerStore::new(config).unwrap()
}

fn stroke_at(y: f32) -> Stroke {
    Stroke::new(vec![Pos2::new(4.0, y), Pos2::new(40.0, y)], Color32::BLACK, 2.0)
}

fn full_image(store: &LayerStore) -> Vec<u8> {
    store.export_engine().export_full_image(ImageFormat::Png, 100).unwrap().bytes
}

/// Delegates to a layer store but can be told to reject restores
struct FlakyCanvas {
    store: LayerStore,
    fail_restore: bool,
}

impl SnapshotTarget for FlakyCanvas {
    fn capture_snapshot(&self) -> CanvasResult<SnapshotData> {
        self.store.capture_snapshot()
    }

    fn capture_thumbnail(&self) -> Option<Vec<u8>> {
        None
    }

    fn restore_snapshot(&mut self, data: &SnapshotData) -> CanvasResult<()> {
        if self.fail_restore {
            return Err(CanvasError::Restore("rejected".into()));
        }
        self.store.restore_snapshot(data)
    }
}

#[test]
fn test_capacity_evicts_oldest() {
    init();
    let store = small_store();
    let mut history = HistoryManager::new(50);
    let ids: Vec<_> = (0..51)
        .map(|i| history.capture_state(&store, &format!("state {i}")).unwrap())
        .collect();

    assert_eq!(history.len(), 50);
    assert!(history.get(ids[0]).is_none());
    assert!(history.get(ids[1]).is_some());
    assert_eq!(history.current_index(), Some(49));
    assert_eq!(history.current().unwrap().id, ids[50]);
}

#[test]
fn test_undo_redo_restores_pixels() {
    init();
    let mut store = small_store();
    let mut history = HistoryManager::new(10);
    history.capture_state(&store, "empty").unwrap();
    store.add_stroke(stroke_at(10.0)).unwrap();
    history.capture_state(&store, "one stroke").unwrap();
    store.add_stroke(stroke_at(20.0)).unwrap();
    history.capture_state(&store, "two strokes").unwrap();
    let latest = full_image(&store);

    assert!(history.undo(&mut store));
    assert_ne!(full_image(&store), latest);
    assert_eq!(store.layer_of_kind(layered_canvas::LayerKind::Drawing).unwrap().object_count(), 1);

    assert!(history.redo(&mut store));
    assert_eq!(full_image(&store), latest);
    assert!(!history.can_redo());
}

#[test]
fn test_undo_at_oldest_entry_is_rejected() {
    init();
    let mut store = small_store();
    let mut history = HistoryManager::new(10);
    assert!(!history.undo(&mut store));
    assert!(!history.redo(&mut store));

    history.capture_state(&store, "empty").unwrap();
    store.add_stroke(stroke_at(10.0)).unwrap();
    let before = full_image(&store);

    assert!(!history.can_undo());
    assert!(!history.undo(&mut store));
    assert_eq!(history.current_index(), Some(0));
    assert_eq!(full_image(&store), before);
}

#[test]
fn test_capture_after_undo_drops_redo_branch() {
    init();
    let mut store = small_store();
    let mut history = HistoryManager::new(10);
    history.capture_state(&store, "a").unwrap();
    let b = history.capture_state(&store, "b").unwrap();
    history.capture_state(&store, "c").unwrap();

    history.undo(&mut store);
    history.undo(&mut store);
    history.capture_state(&store, "d").unwrap();

    let descriptions: Vec<&str> = history.entries().map(|e| e.description.as_str()).collect();
    assert_eq!(descriptions, vec!["a", "d"]);
    assert!(history.get(b).is_none());
    assert!(!history.can_redo());
}

#[test]
fn test_go_to_state() {
    init();
    let mut store = small_store();
    let mut history = HistoryManager::new(10);
    let empty = history.capture_state(&store, "empty").unwrap();
    store.add_stroke(stroke_at(10.0)).unwrap();
    history.capture_state(&store, "stroke").unwrap();

    assert!(!history.go_to_state(&mut store, uuid::Uuid::new_v4()));
    assert_eq!(history.current_index(), Some(1));

    assert!(history.go_to_state(&mut store, empty));
    assert_eq!(history.current_index(), Some(0));
    assert!(!store.canvas_state().has_drawing);
    assert!(history.can_redo());
}

#[test]
fn test_failed_restore_keeps_cursor() {
    init();
    let mut canvas = FlakyCanvas {
        store: small_store(),
        fail_restore: false,
    };
    let mut history = HistoryManager::new(10);
    history.capture_state(&canvas, "empty").unwrap();
    canvas.store.add_stroke(stroke_at(10.0)).unwrap();
    history.capture_state(&canvas, "stroke").unwrap();

    canvas.fail_restore = true;
    assert!(!history.undo(&mut canvas));
    assert_eq!(history.current_index(), Some(1));
    assert!(canvas.store.canvas_state().has_drawing);

    canvas.fail_restore = false;
    assert!(history.undo(&mut canvas));
    assert_eq!(history.current_index(), Some(0));
}

#[test]
fn test_entries_carry_thumbnails_when_enabled() {
    init();
    let store = LayerStore::new(CanvasConfig::with_size(48, 32)).unwrap();
    let mut history = HistoryManager::new(5);
    let id = history.capture_state(&store, "with thumbnail").unwrap();
    let thumbnail = history.get(id).unwrap().thumbnail.as_ref().unwrap();
    assert_eq!(&thumbnail[..4], b"\x89PNG");
}

#[test]
fn test_clear_empties_history() {
    init();
    let store = small_store();
    let mut history = HistoryManager::new(5);
    history.capture_state(&store, "a").unwrap();
    history.clear();
    assert!(history.is_empty());
    assert_eq!(history.current_index(), None);
    assert!(history.current().is_none());
}
