//! Core odds logic: deadlines, replay and source selection

pub mod deadline;
pub mod replay;
pub mod resolver;

// Re-export commonly used types
pub use deadline::{deadline_info, format_time_status, Clock, DeadlineInfo, DeadlineStatus};
pub use replay::ReplaySimulator;
pub use resolver::{ResolveError, RunMode, SourceHint, SourceKind, SourceResolver};
