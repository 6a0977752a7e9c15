use std::sync::atomic::{AtomicUsize, Ordering};

// Single static counter for all drawable objects
static NEXT_OBJECT_ID: AtomicUsize = AtomicUsize::new(1);

/// Returns a process-wide unique id for a drawable object.
pub fn generate_id() -> usize {
    NEXT_OBJECT_ID.fetch_add(1, Ordering::SeqCst)
}

/// Makes sure ids handed out from now on never collide with `seen`.
///
/// Called after restoring objects from a snapshot blob.
pub fn reserve_through(seen: usize) {
    NEXT_OBJECT_ID.fetch_max(seen + 1, Ordering::SeqCst);
}
