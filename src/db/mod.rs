mod connection;
mod error;
pub mod helpers;
mod migrations;
pub mod models;
mod repositories;

pub use connection::Database;
pub use error::LookupError;
pub use models::{
    NewWorkplace, RawSignalReading, StateKind, StateRecord, Workplace, WorkplaceMode,
};

#[cfg(test)]
pub(crate) mod test_support;
