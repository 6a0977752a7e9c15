use std::collections::VecDeque;

use log::{debug, warn};
use uuid::Uuid;

use crate::error::CanvasResult;
use crate::state::{SnapshotData, SnapshotTarget};
use crate::util::time;

mod debounce;

pub use debounce::CaptureDebouncer;

/// One captured snapshot. Never modified after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub id: Uuid,
    /// Milliseconds since the UNIX epoch
    pub timestamp: u64,
    pub description: String,
    pub data: SnapshotData,
    pub thumbnail: Option<Vec<u8>>,
}

/// Bounded, linear undo/redo log of canvas snapshots
#[derive(Debug)]
pub struct HistoryManager {
    entries: VecDeque<HistoryEntry>,
    /// `None` only while the log is empty
    current_index: Option<usize>,
    max_size: usize,
}

impl HistoryManager {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            current_index: None,
            max_size: max_size.max(1),
        }
    }

    /// Capture the canvas as the newest entry.
    ///
    /// Entries after the current one are discarded first; the oldest entry is
    /// evicted once the log is over capacity.
    pub fn capture_state(&mut self, canvas: &impl SnapshotTarget, description: &str) -> CanvasResult<Uuid> {
        let entry = HistoryEntry {
            id: Uuid::new_v4(),
            timestamp: time::timestamp_millis(),
            description: description.to_string(),
            data: canvas.capture_snapshot()?,
            thumbnail: canvas.capture_thumbnail(),
        };
        let id = entry.id;

        if let Some(current) = self.current_index {
            self.entries.truncate(current + 1);
        }
        self.entries.push_back(entry);
        while self.entries.len() > self.max_size {
            if let Some(evicted) = self.entries.pop_front() {
                debug!("Evicted history entry '{}'", evicted.description);
            }
        }
        self.current_index = Some(self.entries.len() - 1);

        debug!(
            "Captured '{}' ({} of {})",
            description,
            self.entries.len(),
            self.max_size
        );
        Ok(id)
    }

    /// Step back one entry. False at the oldest entry or if the restore failed.
    pub fn undo(&mut self, canvas: &mut impl SnapshotTarget) -> bool {
        match self.current_index {
            Some(current) if current > 0 => self.restore_index(canvas, current - 1),
            _ => false,
        }
    }

    /// Step forward one entry. False at the newest entry or if the restore failed.
    pub fn redo(&mut self, canvas: &mut impl SnapshotTarget) -> bool {
        match self.current_index {
            Some(current) if current + 1 < self.entries.len() => self.restore_index(canvas, current + 1),
            _ => false,
        }
    }

    /// Jump to any retained entry
    pub fn go_to_state(&mut self, canvas: &mut impl SnapshotTarget, id: Uuid) -> bool {
        match self.entries.iter().position(|e| e.id == id) {
            Some(index) => self.restore_index(canvas, index),
            None => {
                warn!("Unknown history entry {}", id);
                false
            }
        }
    }

    /// Moves the cursor only when the canvas accepted the snapshot
    fn restore_index(&mut self, canvas: &mut impl SnapshotTarget, index: usize) -> bool {
        let Some(entry) = self.entries.get(index) else {
            return false;
        };
        match canvas.restore_snapshot(&entry.data) {
            Ok(()) => {
                debug!("Restored history entry '{}'", entry.description);
                self.current_index = Some(index);
                true
            }
            Err(e) => {
                log::error!("Failed to restore history entry '{}': {}", entry.description, e);
                false
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        self.current_index.is_some_and(|i| i > 0)
    }

    pub fn can_redo(&self) -> bool {
        self.current_index.is_some_and(|i| i + 1 < self.entries.len())
    }

    pub fn current(&self) -> Option<&HistoryEntry> {
        self.entries.get(self.current_index?)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn get(&self, id: Uuid) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Oldest first
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.current_index = None;
    }
}
