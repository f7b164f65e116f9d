//! Event merger: turns the power-sense and production reading streams of one
//! workplace into a single time-ordered event sequence.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::db::{Database, RawSignalReading, StateKind, StateRecord, Workplace};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Logical channel an event was read from.
///
/// Declaration order is the tie-break for readings sharing a timestamp:
/// production is applied before power-sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChannelKind {
    Production,
    PowerSense,
}

/// A reading tagged with its channel, alive for one polling cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct IntermediateEvent {
    pub at: DateTime<Utc>,
    pub raw: String,
    pub channel: ChannelKind,
}

impl IntermediateEvent {
    pub fn new(at: DateTime<Utc>, raw: impl Into<String>, channel: ChannelKind) -> Self {
        Self {
            at,
            raw: raw.into(),
            channel,
        }
    }

    /// A production reading of `1`.
    pub fn is_production_pulse(&self) -> bool {
        self.channel == ChannelKind::Production && self.raw == "1"
    }
}

/// Lower bound for a channel query: the later of the channel's own cursor
/// and the start of the workplace's most recent state interval.
pub fn effective_cursor(
    cursor: Option<DateTime<Utc>>,
    last_interval_start: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    cursor.max(last_interval_start)
}

/// Textual form of a raw value: `1.0` becomes `"1"`, `230.5` stays `"230.5"`.
pub fn raw_text(value: f64) -> String {
    format!("{value}")
}

pub fn merge_readings(
    power_sense: &[RawSignalReading],
    production: &[RawSignalReading],
) -> Vec<IntermediateEvent> {
    let mut events: Vec<IntermediateEvent> = power_sense
        .iter()
        .map(|reading| {
            IntermediateEvent::new(
                reading.recorded_at,
                raw_text(reading.value),
                ChannelKind::PowerSense,
            )
        })
        .chain(production.iter().map(|reading| {
            IntermediateEvent::new(
                reading.recorded_at,
                raw_text(reading.value),
                ChannelKind::Production,
            )
        }))
        .collect();

    events.sort_by(|a, b| a.at.cmp(&b.at).then(a.channel.cmp(&b.channel)));
    events
}

/// Read every reading newer than the effective cursor of each channel and
/// merge them. Pure read.
pub async fn fetch_events(
    db: &Database,
    workplace: &Workplace,
    last_record: Option<&StateRecord>,
) -> Result<Vec<IntermediateEvent>> {
    let started = Instant::now();
    let last_start = last_record.map(|record| record.started_at);

    let power_since = effective_cursor(workplace.analog_port_at, last_start);
    let power_sense = match db
        .resolve_port(workplace.id, StateKind::Poweroff)
        .await
        .context("failed to resolve poweroff port")?
    {
        Some(port) => db.analog_readings_since(port, power_since).await?,
        None => {
            log_warn!(workplace.name, "No poweroff port bound, power-sense channel skipped");
            Vec::new()
        }
    };

    let production_since = effective_cursor(workplace.production_port_at, last_start);
    let production = match db
        .resolve_port(workplace.id, StateKind::Production)
        .await
        .context("failed to resolve production port")?
    {
        Some(port) => db.digital_readings_since(port, production_since).await?,
        None => {
            log_warn!(workplace.name, "No production port bound, production channel skipped");
            Vec::new()
        }
    };

    log_info!(
        workplace.name,
        "Poweroff records: {}, production records: {}, read in {}ms",
        power_sense.len(),
        production.len(),
        started.elapsed().as_millis()
    );

    Ok(merge_readings(&power_sense, &production))
}
