mod bus;
mod detector;
mod events;

pub use bus::{EventBus, Listener, ListenerError, SubscriptionId};
pub use detector::{ChangeDetector, ContentAnalysis, ContentType, analyze_content};
pub use events::{ChangeKind, ChangeRecord};
