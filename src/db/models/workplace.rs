//! Workplace and mode models.

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct Workplace {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub active: bool,
    pub mode_id: i64,
    pub state_id: Option<i64>,
    pub state_since: Option<DateTime<Utc>>,
    /// Last time power was evidenced, by either channel.
    pub poweroff_port_at: Option<DateTime<Utc>>,
    /// Last power-sense reading consumed.
    pub analog_port_at: Option<DateTime<Utc>>,
    /// Last production reading seen.
    pub production_port_at: Option<DateTime<Utc>>,
    /// Raw text of the last production reading.
    pub production_port_value: Option<String>,
}

/// Values needed to register a workplace.
#[derive(Debug, Clone)]
pub struct NewWorkplace {
    pub name: String,
    pub code: String,
    pub mode_id: i64,
}

/// Threshold configuration shared by workplaces.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkplaceMode {
    pub id: i64,
    pub name: String,
    pub poweroff_threshold: Duration,
    pub downtime_threshold: Duration,
}
