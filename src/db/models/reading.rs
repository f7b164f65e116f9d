use chrono::{DateTime, Utc};

/// A raw value deposited by the device collector. Digital production
/// readings are 0/1; analog power-sense readings are arbitrary.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSignalReading {
    pub id: i64,
    pub device_port_id: i64,
    pub recorded_at: DateTime<Utc>,
    pub value: f64,
}
