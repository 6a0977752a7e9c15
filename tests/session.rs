use std::io::Cursor;
use std::time::{Duration, Instant};

use egui::{Color32, Pos2, Rect};
use futures::executor::block_on;
use image::{Rgba, RgbaImage};
use layered_canvas::session::INITIAL_STATE;
use layered_canvas::{
    CanvasConfig, CanvasSession, Element, GeneratedImage, GenerationError, GenerationRequest, ImageGenerator, ShapeKind,
    ShapeStyle, Stroke, ToolMode, VersionManager,
};
use parking_lot::Mutex;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn config() -> CanvasConfig {
    CanvasConfig {
        capture_thumbnails: false,
        ..CanvasConfig::with_size(48, 32)
    }
}

fn session() -> CanvasSession {
    CanvasSession::new(config()).unwrap()
}

fn stroke() -> Stroke {
    Stroke::new(vec![Pos2::new(4.0, 8.0), Pos2::new(40.0, 8.0)], Color32::BLACK, 2.0)
}

fn png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let mut bytes = Vec::new();
    RgbaImage::from_pixel(width, height, Rgba(color))
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

/// Returns a fixed image and remembers the requests it saw
struct FixedGenerator {
    image: Vec<u8>,
    seen: Mutex<Vec<GenerationRequest>>,
}

impl ImageGenerator for FixedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage, GenerationError> {
        self.seen.lock().push(request.clone());
        Ok(GeneratedImage {
            bytes: self.image.clone(),
        })
    }
}

struct FailingGenerator;

impl ImageGenerator for FailingGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<GeneratedImage, GenerationError> {
        Err(GenerationError::Adapter("model offline".into()))
    }
}

#[test]
fn test_new_session_starts_with_initial_state() {
    init();
    let session = session();
    assert_eq!(session.history().len(), 1);
    assert_eq!(session.history().current().unwrap().description, INITIAL_STATE);
    assert_eq!(session.versions().len(), 1);
    assert!(!session.history().can_undo());
}

#[test]
fn test_edits_are_captured_after_quiet_period() {
    init();
    let mut session = session();
    let start = Instant::now();
    session.edit(start, "Add stroke", |store| store.add_stroke(stroke())).unwrap();
    session.edit(start + Duration::from_millis(100), "Add text", |store| {
        store.add_text("hi", Pos2::new(2.0, 2.0), None)
    })
    .unwrap();

    assert_eq!(session.tick(start + Duration::from_millis(300)), None);
    let id = session.tick(start + Duration::from_millis(400)).unwrap();
    assert_eq!(session.history().len(), 2);
    assert_eq!(session.history().get(id).unwrap().description, "Add text");
    assert_eq!(session.tick(start + Duration::from_secs(5)), None);
}

#[test]
fn test_capture_waits_for_stroke_to_finish() {
    init();
    let mut session = session();
    let start = Instant::now();
    session.edit(start, "Add text", |store| store.add_text("hi", Pos2::new(2.0, 20.0), None)).unwrap();
    session.pointer_down(start, Pos2::new(4.0, 4.0));
    session.pointer_move(Pos2::new(10.0, 10.0));
    assert!(session.store().is_drawing());
    // the text edit is due but a stroke is in progress
    assert_eq!(session.tick(start + Duration::from_secs(1)), None);

    let finished = start + Duration::from_secs(2);
    assert!(session.pointer_up(finished, Pos2::new(20.0, 10.0)).is_some());
    assert_eq!(session.tick(finished + Duration::from_millis(100)), None);
    let id = session.tick(finished + Duration::from_millis(300)).unwrap();
    assert_eq!(session.history().get(id).unwrap().description, "brush");
    assert_eq!(session.history().len(), 2);
    assert!(session.store().canvas_state().has_drawing);
}

#[test]
fn test_undo_captures_pending_edit_first() {
    init();
    let mut session = session();
    session.edit(Instant::now(), "Add stroke", |store| store.add_stroke(stroke())).unwrap();

    assert!(session.undo());
    assert!(!session.store().canvas_state().has_drawing);
    assert_eq!(session.history().len(), 2);

    assert!(session.redo());
    assert!(session.store().canvas_state().has_drawing);
    assert_eq!(session.history().current_index(), Some(1));
}

#[test]
fn test_edit_after_undo_drops_redo_branch() {
    init();
    let mut session = session();
    let start = Instant::now();
    session.edit(start, "Add stroke", |store| store.add_stroke(stroke())).unwrap();
    session.flush();
    assert!(session.undo());

    session.edit(start, "Add text", |store| store.add_text("keep", Pos2::new(2.0, 20.0), None)).unwrap();
    assert!(!session.redo());
    assert_eq!(session.store().text_objects().len(), 1);
    assert!(!session.store().canvas_state().has_drawing);
    let descriptions: Vec<&str> = session.history().entries().map(|e| e.description.as_str()).collect();
    assert_eq!(descriptions, vec![INITIAL_STATE, "Add text"]);
}

/// Session with one filled square and the given tool, with history settled
fn session_with_square(mode: ToolMode) -> CanvasSession {
    let mut session = session();
    session.edit(Instant::now(), "Add square", |store| {
        store.add_shape(
            ShapeKind::Rectangle,
            Rect::from_min_max(Pos2::new(10.0, 10.0), Pos2::new(20.0, 20.0)),
            ShapeStyle::filled(Color32::RED),
        )
    })
    .unwrap();
    session.edit(Instant::now(), "tool", |store| store.set_tool(mode));
    session.flush();
    session
}

#[test]
fn test_select_click_is_not_an_edit() {
    init();
    let mut session = session_with_square(ToolMode::Select);
    let before = session.history().len();
    let now = Instant::now();

    assert!(session.pointer_down(now, Pos2::new(15.0, 15.0)).is_some());
    session.pointer_up(now, Pos2::new(15.0, 15.0));
    assert!(session.store().selected_object().is_some());
    assert_eq!(session.flush(), None);
    assert_eq!(session.history().len(), before);
}

#[test]
fn test_move_drag_is_captured_once() {
    init();
    let mut session = session_with_square(ToolMode::Move);
    let before = session.history().len();
    let now = Instant::now();

    assert!(session.pointer_down(now, Pos2::new(15.0, 15.0)).is_some());
    // grabbing alone changes nothing
    assert_eq!(session.tick(now + Duration::from_secs(1)), None);
    session.pointer_move(Pos2::new(25.0, 15.0));
    session.pointer_up(now, Pos2::new(30.0, 15.0));

    let id = session.flush().unwrap();
    assert_eq!(session.history().get(id).unwrap().description, "move");
    assert_eq!(session.history().len(), before + 1);
}

#[test]
fn test_undo_on_fresh_session_is_rejected() {
    init();
    let mut session = session();
    assert!(!session.undo());
    assert!(!session.redo());
}

#[test]
fn test_version_switch_is_undoable() {
    init();
    let mut session = session();
    let root = session.versions().root_id();
    session.edit(Instant::now(), "Add stroke", |store| store.add_stroke(stroke())).unwrap();
    let sketch = session.create_version("sketch", "", Vec::new()).unwrap();
    assert_eq!(session.history().len(), 2);

    assert!(session.switch_to_version(root));
    assert!(!session.store().canvas_state().has_drawing);
    assert_eq!(session.history().current().unwrap().description, "Switched to 'Initial'");

    assert!(session.undo());
    assert!(session.store().canvas_state().has_drawing);
    assert_eq!(session.versions().get(sketch).unwrap().name, "sketch");
    assert!(!session.switch_to_version(uuid::Uuid::new_v4()));
}

#[test]
fn test_branch_and_merge_through_session() {
    init();
    let mut session = session();
    let root = session.versions().root_id();
    let main = session.create_version("main", "", Vec::new()).unwrap();
    let branch = session.create_branch(root, "alt", "").unwrap();
    let merged = session.merge_versions(main, branch, "merged").unwrap();

    assert_eq!(session.versions().current_version_id(), merged);
    assert!(!session.versions().is_main_branch(branch));
    let descriptions: Vec<&str> = session.history().entries().map(|e| e.description.as_str()).collect();
    assert_eq!(descriptions, vec![INITIAL_STATE, "Branch 'alt'", "Merge 'merged'"]);
}

#[test]
fn test_resume_from_version_tree() {
    init();
    let mut first = session();
    first.edit(Instant::now(), "Add stroke", |store| store.add_stroke(stroke())).unwrap();
    let sketch = first.create_version("sketch", "", Vec::new()).unwrap();
    let tree = VersionManager::from_tree(first.versions().tree().clone(), 10);

    let resumed = CanvasSession::with_versions(config(), tree).unwrap();
    assert_eq!(resumed.versions().current_version_id(), sketch);
    assert!(resumed.store().canvas_state().has_drawing);
    assert_eq!(resumed.history().len(), 1);
}

#[test]
fn test_generation_replaces_base_image() {
    init();
    let mut session = session();
    session.edit(Instant::now(), "Add stroke", |store| store.add_stroke(stroke())).unwrap();
    let generator = FixedGenerator {
        image: png(96, 64, [0, 128, 255, 255]),
        seen: Mutex::new(Vec::new()),
    };

    let id = block_on(session.generate(&generator, "a lighthouse", vec!["watercolor".into()])).unwrap();

    assert_eq!(session.store().base_image().map(|b| b.id()), Some(id));
    let seen = generator.seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].prompt, "a lighthouse");
    assert_eq!(seen[0].style_hints, vec!["watercolor".to_string()]);
    assert!(seen[0].image.is_some());
    assert!(seen[0].mask.is_none());
    assert_eq!(session.history().current().unwrap().description, "Generated image");
}

#[test]
fn test_empty_canvas_request_has_no_artifacts() {
    init();
    let mut session = session();
    let (_, request) = block_on(session.begin_generation("anything", Vec::new())).unwrap();
    assert!(request.image.is_none());
    assert!(request.mask.is_none());
}

#[test]
fn test_mask_is_sent_when_painted() {
    init();
    let mut session = session();
    session.edit(Instant::now(), "Mask", |store| {
        store.start_mask_drawing();
        store.add_stroke(stroke())
    })
    .unwrap();
    let (_, request) = block_on(session.begin_generation("fill", Vec::new())).unwrap();
    let mask = request.mask.unwrap();
    assert_eq!(&mask[..4], b"\x89PNG");
}

#[test]
fn test_stale_generation_result_is_dropped() {
    init();
    let mut session = session();
    let (first, _) = block_on(session.begin_generation("one", Vec::new())).unwrap();
    let (second, _) = block_on(session.begin_generation("two", Vec::new())).unwrap();

    let image = GeneratedImage {
        bytes: png(8, 8, [255, 0, 0, 255]),
    };
    assert!(matches!(
        session.apply_generation(first, image.clone()),
        Err(GenerationError::Stale { .. })
    ));
    assert!(session.store().base_image().is_none());

    assert!(session.apply_generation(second, image).is_ok());
    assert!(session.store().base_image().is_some());
}

#[test]
fn test_generation_failures_leave_canvas_alone() {
    init();
    let mut session = session();
    let result = block_on(session.generate(&FailingGenerator, "x", Vec::new()));
    assert!(matches!(result, Err(GenerationError::Adapter(_))));

    let (ticket, _) = block_on(session.begin_generation("x", Vec::new())).unwrap();
    assert!(matches!(
        session.apply_generation(ticket, GeneratedImage { bytes: Vec::new() }),
        Err(GenerationError::EmptyResult)
    ));
    let (ticket, _) = block_on(session.begin_generation("x", Vec::new())).unwrap();
    assert!(matches!(
        session.apply_generation(ticket, GeneratedImage { bytes: b"junk".to_vec() }),
        Err(GenerationError::Canvas(_))
    ));
    assert!(session.store().base_image().is_none());
    assert_eq!(session.history().len(), 1);
}
