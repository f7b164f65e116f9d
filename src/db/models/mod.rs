pub mod reading;
pub mod state;
pub mod workplace;

pub use reading::RawSignalReading;
pub use state::{StateKind, StateRecord};
pub use workplace::{NewWorkplace, Workplace, WorkplaceMode};
