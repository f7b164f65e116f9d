use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::db::{Database, Workplace};
use crate::inference::{fetch_events, process_events, Thresholds, Transition, WorkplaceSnapshot};

use super::controller::Roster;
use super::registry::RunningGuard;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub events: usize,
    pub transitions: Vec<Transition>,
}

/// One polling cycle: fetch readings since the stored cursors, run the state
/// machine, persist its commands in one transaction. Any store error aborts
/// the cycle before anything is written.
pub async fn run_cycle(db: &Database, workplace_id: i64, now: DateTime<Utc>) -> Result<CycleReport> {
    let workplace = db.get_workplace(workplace_id).await?;
    let current = db.last_state_record(workplace_id).await?;
    let mode = db.get_mode(workplace.mode_id).await?;

    let events = fetch_events(db, &workplace, current.as_ref()).await?;
    let snapshot = WorkplaceSnapshot::from_store(&workplace, current.as_ref());
    let outcome = process_events(snapshot, &Thresholds::from(&mode), &events, now);

    db.apply_commands(workplace_id, outcome.commands).await?;

    for transition in &outcome.transitions {
        log_info!(
            workplace.name,
            "Changing state {} -> {} at {}",
            transition.from,
            transition.to,
            transition.at
        );
    }

    Ok(CycleReport {
        events: events.len(),
        transitions: outcome.transitions,
    })
}

/// Remaining sleep to keep a fixed cadence; `None` when the cycle overran.
pub fn pacing_delay(elapsed: Duration, cadence: Duration) -> Option<Duration> {
    cadence.checked_sub(elapsed).filter(|delay| !delay.is_zero())
}

fn is_listed(roster: &watch::Receiver<Roster>, workplace_id: i64) -> bool {
    roster.borrow().iter().any(|w| w.id == workplace_id)
}

/// Worker for one workplace. Holds the registry claim until it returns, and
/// returns once the workplace leaves the roster or the service stops.
pub async fn workplace_loop(
    workplace: Workplace,
    db: Database,
    claim: RunningGuard,
    roster: watch::Receiver<Roster>,
    cancel_token: CancellationToken,
    cadence: Duration,
) {
    let name = workplace.name;
    log_info!(name, "Workplace active, started running");

    while !cancel_token.is_cancelled() {
        let started = Instant::now();

        match run_cycle(&db, claim.workplace_id(), Utc::now()).await {
            Ok(report) => log_info!(
                name,
                "Workplace main loop ended in {}ms, {} events, {} state changes",
                started.elapsed().as_millis(),
                report.events,
                report.transitions.len()
            ),
            Err(err) => log_error!(name, "Cycle skipped: {err:#}"),
        }

        if let Some(delay) = pacing_delay(started.elapsed(), cadence) {
            log_info!(name, "Sleeping for {}ms", delay.as_millis());
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel_token.cancelled() => {}
            }
        }

        if !is_listed(&roster, claim.workplace_id()) {
            log_info!(name, "Workplace not active");
            break;
        }
    }

    drop(claim);
    log_info!(name, "Workplace stopped running");
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::db::test_support::{open_test_db, power_port, production_port, seed_workplace, t};
    use crate::db::{LookupError, StateKind};

    #[test]
    fn pacing_sleeps_only_for_the_remainder() {
        let cadence = Duration::from_secs(10);

        assert_eq!(
            pacing_delay(Duration::from_secs(3), cadence),
            Some(Duration::from_secs(7))
        );
        assert_eq!(pacing_delay(Duration::from_secs(10), cadence), None);
        assert_eq!(pacing_delay(Duration::from_secs(25), cadence), None);
    }

    #[tokio::test]
    async fn first_power_sense_reading_opens_downtime() {
        let (_dir, db) = open_test_db();
        let press = seed_workplace(&db, "Press 1").await;
        db.insert_analog_reading(power_port(press.id), t(0), 231.0)
            .await
            .unwrap();

        let report = run_cycle(&db, press.id, t(1)).await.unwrap();

        assert_eq!(report.events, 1);
        assert_eq!(report.transitions.len(), 1);
        let records = db.state_records_for_workplace(press.id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].state, StateKind::Downtime);
        assert_eq!(records[0].started_at, t(0));
        assert!(records[0].is_open());
    }

    #[tokio::test]
    async fn silent_production_is_powered_off_at_last_evidence() {
        let (_dir, db) = open_test_db();
        let press = seed_workplace(&db, "Press 1").await;
        db.insert_digital_reading(production_port(press.id), t(0), true)
            .await
            .unwrap();
        run_cycle(&db, press.id, t(1)).await.unwrap();

        // seeded mode: 300 s power-off threshold
        let report = run_cycle(&db, press.id, t(301)).await.unwrap();

        assert_eq!(report.events, 0);
        let records = db.state_records_for_workplace(press.id).await.unwrap();
        let states: Vec<_> = records.iter().map(|r| (r.state, r.started_at)).collect();
        assert_eq!(
            states,
            vec![(StateKind::Production, t(0)), (StateKind::Poweroff, t(0))]
        );
    }

    #[tokio::test]
    async fn resumed_cycles_neither_repeat_nor_skip_readings() {
        let (_dir, db) = open_test_db();
        let press = seed_workplace(&db, "Press 1").await;
        let power = power_port(press.id);
        let production = production_port(press.id);

        db.insert_analog_reading(power, t(0), 230.0).await.unwrap();
        db.insert_digital_reading(production, t(10), true).await.unwrap();
        let first = run_cycle(&db, press.id, t(20)).await.unwrap();
        assert_eq!(first.events, 2);

        // nothing new: nothing happens
        let idle = run_cycle(&db, press.id, t(30)).await.unwrap();
        assert_eq!(idle.events, 0);
        assert!(idle.transitions.is_empty());

        // readings arriving later are picked up exactly once
        db.insert_digital_reading(production, t(40), false).await.unwrap();
        for secs in [100, 200, 300, 400] {
            db.insert_analog_reading(power, t(secs), 229.0).await.unwrap();
        }
        let later = run_cycle(&db, press.id, t(400)).await.unwrap();
        assert_eq!(later.events, 5);

        let records = db.state_records_for_workplace(press.id).await.unwrap();
        let states: Vec<_> = records.iter().map(|r| (r.state, r.started_at)).collect();
        assert_eq!(
            states,
            vec![
                (StateKind::Downtime, t(0)),
                (StateKind::Production, t(10)),
                (StateKind::Downtime, t(40)),
            ]
        );
        for pair in records.windows(2) {
            assert_eq!(pair[0].ended_at, Some(pair[1].started_at));
        }

        let workplace = db.get_workplace(press.id).await.unwrap();
        assert_eq!(workplace.poweroff_port_at, Some(t(400)));
        assert_eq!(workplace.analog_port_at, Some(t(400)));
        assert_eq!(workplace.production_port_at, Some(t(40)));
        assert_eq!(workplace.production_port_value.as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn late_power_sense_reading_at_a_production_instant_is_read() {
        let (_dir, db) = open_test_db();
        let press = seed_workplace(&db, "Press 1").await;
        db.insert_digital_reading(production_port(press.id), t(0), false)
            .await
            .unwrap();

        let idle = run_cycle(&db, press.id, t(1)).await.unwrap();
        assert!(idle.transitions.is_empty());
        let workplace = db.get_workplace(press.id).await.unwrap();
        assert_eq!(workplace.poweroff_port_at, Some(t(0)));
        assert!(workplace.analog_port_at.is_none());

        db.insert_analog_reading(power_port(press.id), t(0), 230.0)
            .await
            .unwrap();
        let report = run_cycle(&db, press.id, t(2)).await.unwrap();

        assert_eq!(report.events, 1);
        let records = db.state_records_for_workplace(press.id).await.unwrap();
        let states: Vec<_> = records.iter().map(|r| (r.state, r.started_at)).collect();
        assert_eq!(states, vec![(StateKind::Downtime, t(0))]);
        let workplace = db.get_workplace(press.id).await.unwrap();
        assert_eq!(workplace.analog_port_at, Some(t(0)));
    }

    #[tokio::test]
    async fn powered_off_workplace_wakes_on_late_power_sense_reading() {
        let (_dir, db) = open_test_db();
        let press = seed_workplace(&db, "Press 1").await;
        let production = production_port(press.id);
        db.insert_digital_reading(production, t(0), true).await.unwrap();
        run_cycle(&db, press.id, t(1)).await.unwrap();
        run_cycle(&db, press.id, t(301)).await.unwrap();

        db.insert_digital_reading(production, t(900), false).await.unwrap();
        let idle = run_cycle(&db, press.id, t(901)).await.unwrap();
        assert!(idle.transitions.is_empty());

        db.insert_analog_reading(power_port(press.id), t(900), 230.0)
            .await
            .unwrap();
        let report = run_cycle(&db, press.id, t(902)).await.unwrap();

        assert_eq!(report.events, 1);
        let records = db.state_records_for_workplace(press.id).await.unwrap();
        let states: Vec<_> = records.iter().map(|r| (r.state, r.started_at)).collect();
        assert_eq!(
            states,
            vec![
                (StateKind::Production, t(0)),
                (StateKind::Poweroff, t(0)),
                (StateKind::Downtime, t(900)),
            ]
        );
    }

    #[tokio::test]
    async fn missing_mode_skips_the_cycle_without_writes() {
        let (_dir, db) = open_test_db();
        let press = seed_workplace(&db, "Press 1").await;
        db.insert_analog_reading(power_port(press.id), t(0), 230.0)
            .await
            .unwrap();
        db.execute(move |conn| {
            conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
            conn.execute(
                "UPDATE workplaces SET workplace_mode_id = 99 WHERE id = ?1",
                [press.id],
            )?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(())
        })
        .await
        .unwrap();

        let err = run_cycle(&db, press.id, t(1)).await.unwrap_err();

        assert_eq!(
            err.downcast_ref::<LookupError>(),
            Some(&LookupError::ModeNotFound(99))
        );
        assert!(db.state_records_for_workplace(press.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn custom_mode_thresholds_apply() {
        let (_dir, db) = open_test_db();
        let mode = db.insert_mode("Setup", 30, 600).await.unwrap();
        let press = seed_workplace(&db, "Press 1").await;
        db.execute(move |conn| {
            conn.execute(
                "UPDATE workplaces SET workplace_mode_id = ?1 WHERE id = ?2",
                [mode, press.id],
            )?;
            Ok(())
        })
        .await
        .unwrap();
        db.insert_analog_reading(power_port(press.id), t(0), 230.0)
            .await
            .unwrap();

        run_cycle(&db, press.id, t(1)).await.unwrap();
        let report = run_cycle(&db, press.id, t(31)).await.unwrap();

        assert_eq!(report.transitions.len(), 1);
        assert_eq!(report.transitions[0].to, StateKind::Poweroff);
        assert_eq!(report.transitions[0].at, t(0));
    }
}
