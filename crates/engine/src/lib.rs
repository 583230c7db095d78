pub mod dedup;
pub mod formatter;
pub mod health;

pub use dedup::{DedupLimits, DedupStore};
pub use formatter::MessageFormatter;
pub use health::{HealthTracker, HealthTransition};
