//! State machine: folds a time-ordered event batch into state transitions.
//!
//! The machine never touches the store. It returns the resulting snapshot and
//! the commands (close interval, save workplace, open interval) the caller
//! must apply, in order, to persist the batch.

use chrono::{DateTime, Utc};

use crate::db::{StateKind, StateRecord, Workplace};

use super::config::Thresholds;
use super::merge::{ChannelKind, IntermediateEvent};

/// The per-workplace values the machine reads and advances.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorkplaceSnapshot {
    pub state: StateKind,
    pub state_since: Option<DateTime<Utc>>,
    /// Last power evidence; production readings count as power evidence too.
    pub power_seen_at: Option<DateTime<Utc>>,
    /// Read cursor of the power-sense channel, advanced by its own readings
    /// only.
    pub power_sense_at: Option<DateTime<Utc>>,
    pub production_seen_at: Option<DateTime<Utc>>,
    pub production_value: Option<String>,
}

impl WorkplaceSnapshot {
    /// The current interval is authoritative for the state; the workplace row
    /// holds the signal cursors.
    pub fn from_store(workplace: &Workplace, current: Option<&StateRecord>) -> Self {
        Self {
            state: current.map(|record| record.state).unwrap_or_default(),
            state_since: current.map(|record| record.started_at),
            power_seen_at: workplace.poweroff_port_at,
            power_sense_at: workplace.analog_port_at,
            production_seen_at: workplace.production_port_at,
            production_value: workplace.production_port_value.clone(),
        }
    }

    /// Last production reading was `0`. A workplace that never reported
    /// production counts as idle.
    fn is_idle(&self) -> bool {
        self.production_value.as_deref().map_or(true, |value| value == "0")
    }

    /// When power silence up to `at` exceeds the threshold, the moment power
    /// was last seen.
    fn power_lost_since(
        &self,
        at: DateTime<Utc>,
        thresholds: &Thresholds,
    ) -> Option<DateTime<Utc>> {
        self.power_seen_at
            .filter(|seen| at.signed_duration_since(*seen) > thresholds.poweroff)
    }

    fn already_seen(&self, event: &IntermediateEvent) -> bool {
        let cursor = match event.channel {
            ChannelKind::PowerSense => self.power_sense_at,
            ChannelKind::Production => self.production_seen_at,
        };
        cursor.is_some_and(|cursor| event.at <= cursor)
    }

    fn observe(&mut self, event: &IntermediateEvent) {
        self.power_seen_at = self.power_seen_at.max(Some(event.at));
        match event.channel {
            ChannelKind::PowerSense => self.power_sense_at = Some(event.at),
            ChannelKind::Production => {
                self.production_seen_at = Some(event.at);
                self.production_value = Some(event.raw.clone());
            }
        }
    }
}

/// A side effect the worker applies to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// End the open interval of the workplace.
    CloseInterval { at: DateTime<Utc> },
    /// Start a new open interval.
    OpenInterval { state: StateKind, at: DateTime<Utc> },
    /// Persist current state and cursors on the workplace row.
    SaveWorkplace(WorkplaceSnapshot),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: StateKind,
    pub to: StateKind,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub snapshot: WorkplaceSnapshot,
    pub transitions: Vec<Transition>,
    pub commands: Vec<Command>,
}

/// Target states one event asks for, in order, judged against the snapshot
/// as it was before the event.
pub fn decide(
    snapshot: &WorkplaceSnapshot,
    event: &IntermediateEvent,
    thresholds: &Thresholds,
) -> Vec<(StateKind, DateTime<Utc>)> {
    let pulse = event.is_production_pulse();

    match snapshot.state {
        StateKind::Unknown | StateKind::Poweroff => {
            if pulse {
                vec![(StateKind::Production, event.at)]
            } else if event.channel == ChannelKind::PowerSense {
                vec![(StateKind::Downtime, event.at)]
            } else {
                Vec::new()
            }
        }
        StateKind::Production => {
            if let Some(lost_at) = snapshot.power_lost_since(event.at, thresholds) {
                return vec![(StateKind::Poweroff, lost_at), (resumed(pulse), event.at)];
            }
            match snapshot.production_seen_at {
                Some(produced_at)
                    if snapshot.is_idle()
                        && event.at.signed_duration_since(produced_at) > thresholds.downtime =>
                {
                    vec![(StateKind::Downtime, produced_at)]
                }
                _ => Vec::new(),
            }
        }
        StateKind::Downtime => {
            if let Some(lost_at) = snapshot.power_lost_since(event.at, thresholds) {
                vec![(StateKind::Poweroff, lost_at), (resumed(pulse), event.at)]
            } else if pulse {
                vec![(StateKind::Production, event.at)]
            } else {
                Vec::new()
            }
        }
    }
}

/// State entered right after a back-dated power-off, given the event that
/// proved power is back.
fn resumed(pulse: bool) -> StateKind {
    if pulse {
        StateKind::Production
    } else {
        StateKind::Downtime
    }
}

struct Machine<'a> {
    snapshot: WorkplaceSnapshot,
    last_saved: WorkplaceSnapshot,
    thresholds: &'a Thresholds,
    transitions: Vec<Transition>,
    commands: Vec<Command>,
}

impl Machine<'_> {
    fn apply(&mut self, event: &IntermediateEvent) {
        if self.snapshot.already_seen(event) {
            return;
        }

        for (to, at) in decide(&self.snapshot, event, self.thresholds) {
            self.transition(to, at);
        }
        self.snapshot.observe(event);
    }

    fn transition(&mut self, to: StateKind, at: DateTime<Utc>) {
        let from = self.snapshot.state;
        if from == to {
            return;
        }

        // intervals never start before the one they close
        let at = self.snapshot.state_since.map_or(at, |since| at.max(since));

        if self.snapshot.state_since.is_some() {
            self.commands.push(Command::CloseInterval { at });
        }
        self.snapshot.state = to;
        self.snapshot.state_since = Some(at);
        self.save();
        self.commands.push(Command::OpenInterval { state: to, at });
        self.transitions.push(Transition { from, to, at });
    }

    fn save(&mut self) {
        self.last_saved = self.snapshot.clone();
        self.commands.push(Command::SaveWorkplace(self.snapshot.clone()));
    }

    /// Silence is only observable against the clock once the batch is spent.
    fn check_silence(&mut self, now: DateTime<Utc>) {
        if self.snapshot.state == StateKind::Poweroff {
            return;
        }
        if let Some(lost_at) = self.snapshot.power_lost_since(now, self.thresholds) {
            self.transition(StateKind::Poweroff, lost_at);
        }
    }
}

/// Run one batch. Events already covered by the snapshot's cursors are
/// ignored, so a re-delivered batch changes nothing.
pub fn process_events(
    start: WorkplaceSnapshot,
    thresholds: &Thresholds,
    events: &[IntermediateEvent],
    now: DateTime<Utc>,
) -> Outcome {
    let mut machine = Machine {
        last_saved: start.clone(),
        snapshot: start,
        thresholds,
        transitions: Vec::new(),
        commands: Vec::new(),
    };

    for event in events {
        machine.apply(event);
    }
    machine.check_silence(now);

    if machine.snapshot != machine.last_saved {
        machine.save();
    }

    Outcome {
        snapshot: machine.snapshot,
        transitions: machine.transitions,
        commands: machine.commands,
    }
}
