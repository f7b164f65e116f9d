pub mod config;
pub mod machine;
pub mod merge;

pub use config::Thresholds;
pub use machine::{process_events, Command, Outcome, Transition, WorkplaceSnapshot};
pub use merge::{effective_cursor, fetch_events, merge_readings, ChannelKind, IntermediateEvent};
