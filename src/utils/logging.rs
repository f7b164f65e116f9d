//! Conditional logging macros that check a module-level `ENABLE_LOGS` flag
//! and tag each line with a reference (`MAIN` or a workplace name).
//!
//! Usage:
//! ```ignore
//! // In your module, define the flag first:
//! const ENABLE_LOGS: bool = true;
//!
//! // Then use the macros (they're exported at the crate root):
//! use crate::{log_info, log_warn, log_error};
//!
//! log_info!("MAIN", "Active workplaces: {}", 3);
//! ```

/// Reference tag used by the dispatcher and service lifecycle.
pub const MAIN: &str = "MAIN";

/// Macro for conditional info logging.
/// Checks the `ENABLE_LOGS` const in the calling module.
///
/// Each module that uses this macro must define:
/// ```ignore
/// const ENABLE_LOGS: bool = true; // or false
/// ```
#[macro_export]
macro_rules! log_info {
    ($reference:expr, $($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!("[{}] {}", $reference, format_args!($($arg)*));
        }
    };
}

/// Macro for conditional warn logging.
/// Checks the `ENABLE_LOGS` const in the calling module.
#[macro_export]
macro_rules! log_warn {
    ($reference:expr, $($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!("[{}] {}", $reference, format_args!($($arg)*));
        }
    };
}

/// Macro for conditional error logging.
/// Checks the `ENABLE_LOGS` const in the calling module.
#[macro_export]
macro_rules! log_error {
    ($reference:expr, $($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!("[{}] {}", $reference, format_args!($($arg)*));
        }
    };
}

/// Install the global `env_logger`. `RUST_LOG` takes precedence over the
/// configured level when it is set.
pub fn init(level: &str) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(log::LevelFilter::Info);
    builder.parse_filters(level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }

    // A second init (tests, embedding hosts) keeps the first logger.
    let _ = builder.try_init();
}
