use std::time::Instant;

use egui::Pos2;
use log::{debug, error, info};
use uuid::Uuid;

use crate::config::CanvasConfig;
use crate::error::CanvasResult;
use crate::export::ExportBundle;
use crate::generation::{
    GeneratedImage, GenerationError, GenerationRequest, GenerationSequencer, GenerationTicket, ImageGenerator,
};
use crate::history::{CaptureDebouncer, HistoryManager};
use crate::layer_store::LayerStore;
use crate::state::SnapshotTarget;
use crate::version::VersionManager;

pub const INITIAL_STATE: &str = "Initial state";

/// One canvas with its undo history and version tree.
///
/// Sessions are independent of each other; nothing here is global.
#[derive(Debug)]
pub struct CanvasSession {
    store: LayerStore,
    history: HistoryManager,
    versions: VersionManager,
    debouncer: CaptureDebouncer,
    sequencer: GenerationSequencer,
    /// Store revision when the current pointer gesture started
    gesture_revision: u64,
}

impl CanvasSession {
    pub fn new(config: CanvasConfig) -> CanvasResult<Self> {
        let debouncer = CaptureDebouncer::new(config.capture_debounce());
        let mut history = HistoryManager::new(config.max_history_size);
        let max_versions = config.max_versions;
        let store = LayerStore::new(config)?;
        history.capture_state(&store, INITIAL_STATE)?;
        let versions = VersionManager::new(&store, max_versions)?;
        Ok(Self {
            store,
            history,
            versions,
            debouncer,
            sequencer: GenerationSequencer::new(),
            gesture_revision: 0,
        })
    }

    /// Resume with an existing version tree; the canvas shows its current version
    pub fn with_versions(config: CanvasConfig, versions: VersionManager) -> CanvasResult<Self> {
        let mut session = Self::new(config)?;
        let current = versions.current_version_id();
        session.versions = versions;
        if let Some(version) = session.versions.get(current) {
            session.store.restore_snapshot(&version.data)?;
        }
        session.history.clear();
        session.history.capture_state(&session.store, INITIAL_STATE)?;
        Ok(session)
    }

    pub fn store(&self) -> &LayerStore {
        &self.store
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn versions(&self) -> &VersionManager {
        &self.versions
    }

    /// Mutate the canvas and schedule a history capture for it
    pub fn edit<R>(&mut self, now: Instant, description: &str, f: impl FnOnce(&mut LayerStore) -> R) -> R {
        let result = f(&mut self.store);
        self.debouncer.note_mutation(now, description);
        result
    }

    /// Selecting or grabbing an object is not an edit; only content changes are captured
    pub fn pointer_down(&mut self, now: Instant, pos: Pos2) -> Option<usize> {
        let before = self.store.revision();
        let result = self.store.pointer_down(pos);
        self.gesture_revision = self.store.revision();
        if self.gesture_revision != before {
            self.debouncer.note_mutation(now, self.store.tool().as_str());
        }
        result
    }

    pub fn pointer_move(&mut self, pos: Pos2) -> Option<usize> {
        self.store.pointer_move(pos)
    }

    /// Drags applied by `pointer_move` are noted here, once the gesture ends
    pub fn pointer_up(&mut self, now: Instant, pos: Pos2) -> Option<usize> {
        let result = self.store.pointer_up(pos);
        if self.store.revision() != self.gesture_revision {
            self.debouncer.note_mutation(now, self.store.tool().as_str());
        }
        result
    }

    /// Drive the debounced capture. Returns the id of a new history entry.
    pub fn tick(&mut self, now: Instant) -> Option<Uuid> {
        let suppressed = self.store.is_restoring() || self.store.is_drawing();
        let description = self.debouncer.poll(now, suppressed)?;
        self.capture(&description)
    }

    /// Capture a pending edit right away so it can be undone
    pub fn flush(&mut self) -> Option<Uuid> {
        let description = self.debouncer.flush()?;
        self.capture(&description)
    }

    fn capture(&mut self, description: &str) -> Option<Uuid> {
        match self.history.capture_state(&self.store, description) {
            Ok(id) => Some(id),
            Err(e) => {
                error!("History capture '{}' failed: {}", description, e);
                None
            }
        }
    }

    pub fn undo(&mut self) -> bool {
        self.flush();
        self.history.undo(&mut self.store)
    }

    /// A pending edit is captured first, which drops the redo branch
    pub fn redo(&mut self) -> bool {
        self.flush();
        self.history.redo(&mut self.store)
    }

    pub fn go_to_state(&mut self, id: Uuid) -> bool {
        self.flush();
        self.history.go_to_state(&mut self.store, id)
    }

    pub fn create_version(&mut self, name: &str, description: &str, tags: Vec<String>) -> CanvasResult<Uuid> {
        self.flush();
        self.versions.create_version(&self.store, name, description, tags)
    }

    pub fn create_branch(&mut self, from: Uuid, name: &str, description: &str) -> CanvasResult<Uuid> {
        self.flush();
        let id = self.versions.create_branch(&mut self.store, from, name, description)?;
        self.capture(&format!("Branch '{name}'"));
        Ok(id)
    }

    /// Show version `id` on the canvas; recorded in the undo history
    pub fn switch_to_version(&mut self, id: Uuid) -> bool {
        self.flush();
        if !self.versions.switch_to_version(&mut self.store, id) {
            return false;
        }
        let name = self.versions.get(id).map(|v| v.name.clone()).unwrap_or_default();
        self.capture(&format!("Switched to '{name}'"));
        true
    }

    pub fn merge_versions(&mut self, a: Uuid, b: Uuid, name: &str) -> CanvasResult<Uuid> {
        self.flush();
        let id = self.versions.merge_versions(&mut self.store, a, b, name)?;
        self.capture(&format!("Merge '{name}'"));
        Ok(id)
    }

    pub async fn export_bundle(&self) -> CanvasResult<ExportBundle> {
        self.store.export_engine().export_bundle().await
    }

    /// Export the canvas and issue a ticket for the request built from it
    pub async fn begin_generation(
        &mut self,
        prompt: &str,
        style_hints: Vec<String>,
    ) -> CanvasResult<(GenerationTicket, GenerationRequest)> {
        let bundle = self.store.export_engine().export_bundle().await?;
        let ticket = self.sequencer.issue();
        debug!("Issued generation {} for {:?}", ticket, bundle.metadata.analysis.content_type);
        Ok((ticket, GenerationRequest::from_bundle(prompt, &bundle, style_hints)))
    }

    /// Place a generated image as the new base image, unless a newer
    /// request has been issued since `ticket`.
    pub fn apply_generation(&mut self, ticket: GenerationTicket, image: GeneratedImage) -> Result<usize, GenerationError> {
        self.sequencer.check(ticket)?;
        if image.bytes.is_empty() {
            return Err(GenerationError::EmptyResult);
        }
        self.flush();
        let id = self.store.set_base_image(&image.bytes)?;
        self.capture("Generated image");
        info!("Applied generation {}", ticket);
        Ok(id)
    }

    /// Export, call `generator`, and apply its result
    pub async fn generate(
        &mut self,
        generator: &impl ImageGenerator,
        prompt: &str,
        style_hints: Vec<String>,
    ) -> Result<usize, GenerationError> {
        let (ticket, request) = self.begin_generation(prompt, style_hints).await?;
        let image = generator.generate(&request).await?;
        self.apply_generation(ticket, image)
    }
}
