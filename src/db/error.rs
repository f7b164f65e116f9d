use thiserror::Error;

use crate::db::models::StateKind;

/// A configuration row the inference depends on is missing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("workplace {0} not found")]
    WorkplaceNotFound(i64),

    #[error("workplace mode {0} not found")]
    ModeNotFound(i64),

    #[error("state {0} missing from the state catalog")]
    StateNotFound(StateKind),
}
