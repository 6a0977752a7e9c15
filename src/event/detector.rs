use std::collections::VecDeque;

use log::debug;
use serde::{Deserialize, Serialize};

use super::bus::{EventBus, Listener, SubscriptionId};
use super::events::{ChangeKind, ChangeRecord};
use crate::state::CanvasState;
use crate::util::time;

/// Coarse classification of what is on the canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentType {
    Empty,
    DrawingOnly,
    ImageOnly,
    ImageWithEdits,
    Complex,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentAnalysis {
    pub content_type: ContentType,
    pub ready_for_generation: bool,
    pub suggested_action: String,
}

/// Classify a canvas projection.
///
/// Checked in order: empty, drawing without base image, base image alone,
/// base image with edits, anything else (text and/or mask without a base).
pub fn analyze_content(state: &CanvasState) -> ContentAnalysis {
    let (content_type, ready, action) = if !state.has_content() {
        (ContentType::Empty, false, "Draw a sketch or load an image to get started")
    } else if state.has_drawing && !state.has_base_image {
        (ContentType::DrawingOnly, true, "Generate an image from the sketch")
    } else if state.has_base_image && !state.has_edits() {
        (ContentType::ImageOnly, true, "Describe how the image should change")
    } else if state.has_base_image {
        (ContentType::ImageWithEdits, true, "Apply the marked edits to the image")
    } else {
        (
            ContentType::Complex,
            state.has_text,
            "Add a sketch or a base image so the annotations have something to refer to",
        )
    };
    ContentAnalysis {
        content_type,
        ready_for_generation: ready,
        suggested_action: action.to_owned(),
    }
}

/// Turns canvas mutations into discrete change records.
#[derive(Debug)]
pub struct ChangeDetector {
    last_state: Option<CanvasState>,
    log: VecDeque<ChangeRecord>,
    log_capacity: usize,
    bus: EventBus,
}

impl ChangeDetector {
    pub fn new(log_capacity: usize) -> Self {
        Self {
            last_state: None,
            log: VecDeque::with_capacity(log_capacity),
            log_capacity: log_capacity.max(1),
            bus: EventBus::new(),
        }
    }

    /// Compare `current` with the cached projection and report flag toggles.
    ///
    /// The first call only records the baseline and reports nothing.
    pub fn detect_changes(&mut self, current: CanvasState) -> Vec<ChangeKind> {
        let changes = match &self.last_state {
            Some(previous) => ChangeKind::diff(previous, &current),
            None => Vec::new(),
        };
        if !changes.is_empty() {
            debug!("Detected canvas changes: {:?}", changes);
        }
        self.last_state = Some(current);
        changes
    }

    /// Record a change, notify listeners and update the cached projection.
    pub fn emit_change(
        &mut self,
        kind: ChangeKind,
        details: serde_json::Value,
        current: CanvasState,
        during_restore: bool,
    ) -> ChangeRecord {
        let record = ChangeRecord {
            kind,
            details,
            timestamp: time::timestamp_millis(),
            during_restore,
        };
        if self.log.len() == self.log_capacity {
            self.log.pop_front();
        }
        self.log.push_back(record.clone());
        self.last_state = Some(current);
        self.bus.emit(&record);
        record
    }

    pub fn subscribe(&self, listener: Listener) -> SubscriptionId {
        self.bus.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Most recent records, oldest first
    pub fn event_log(&self) -> impl Iterator<Item = &ChangeRecord> {
        self.log.iter()
    }

    pub fn last_state(&self) -> Option<&CanvasState> {
        self.last_state.as_ref()
    }
}
