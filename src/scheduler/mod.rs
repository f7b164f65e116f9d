pub mod controller;
pub mod loop_worker;
pub mod registry;

pub use controller::{Dispatcher, Roster, StateService};
pub use loop_worker::{run_cycle, workplace_loop, CycleReport};
pub use registry::{RunningGuard, WorkerRegistry};
