use chrono::Duration;

use crate::db::WorkplaceMode;

/// Hysteresis thresholds taken from the workplace's mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Longest tolerated silence on the power-sense channel.
    pub poweroff: Duration,

    /// Longest tolerated idle production while powered.
    pub downtime: Duration,
}

impl From<&WorkplaceMode> for Thresholds {
    fn from(mode: &WorkplaceMode) -> Self {
        Self {
            poweroff: mode.poweroff_threshold,
            downtime: mode.downtime_threshold,
        }
    }
}
