//! State catalog and persisted state intervals.

use chrono::{DateTime, Utc};

/// Inferred operational state of a workplace.
///
/// `Unknown` has no catalog row: it is the state of a workplace that has no
/// state record yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StateKind {
    #[default]
    Unknown,
    Poweroff,
    Downtime,
    Production,
}

impl StateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateKind::Unknown => "Unknown",
            StateKind::Poweroff => "Poweroff",
            StateKind::Downtime => "Downtime",
            StateKind::Production => "Production",
        }
    }

    /// Name of the catalog row in `states`, if the state is persisted at all.
    pub fn catalog_name(&self) -> Option<&'static str> {
        match self {
            StateKind::Unknown => None,
            other => Some(other.as_str()),
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Poweroff" => Some(StateKind::Poweroff),
            "Downtime" => Some(StateKind::Downtime),
            "Production" => Some(StateKind::Production),
            _ => None,
        }
    }
}

impl std::fmt::Display for StateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `[started_at, ended_at)` interval; `ended_at` is `None` for the
/// workplace's current interval.
#[derive(Debug, Clone, PartialEq)]
pub struct StateRecord {
    pub id: i64,
    pub workplace_id: i64,
    pub state_id: i64,
    pub state: StateKind,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
}

impl StateRecord {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}
