use std::time::{Duration, Instant};

/// Delays history captures until mutations have been quiet for a while.
///
/// Time is passed in by the caller so behaviour is reproducible in tests.
#[derive(Debug, Clone)]
pub struct CaptureDebouncer {
    delay: Duration,
    pending: Option<Pending>,
}

#[derive(Debug, Clone)]
struct Pending {
    last_mutation: Instant,
    description: String,
}

impl CaptureDebouncer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, pending: None }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Record a mutation. Restarts the quiet period; the latest description wins.
    pub fn note_mutation(&mut self, now: Instant, description: &str) {
        self.pending = Some(Pending {
            last_mutation: now,
            description: description.to_string(),
        });
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Returns the description of a capture that is due.
    ///
    /// While `suppressed` (restoring, or a stroke in progress) nothing fires
    /// and the pending capture is kept.
    pub fn poll(&mut self, now: Instant, suppressed: bool) -> Option<String> {
        if suppressed {
            return None;
        }
        let due = self
            .pending
            .as_ref()
            .is_some_and(|p| now.saturating_duration_since(p.last_mutation) >= self.delay);
        if due {
            self.pending.take().map(|p| p.description)
        } else {
            None
        }
    }

    /// Take the pending capture regardless of timing
    pub fn flush(&mut self) -> Option<String> {
        self.pending.take().map(|p| p.description)
    }
}
