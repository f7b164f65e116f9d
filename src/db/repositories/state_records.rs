use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{catalog::state_id_by_name, workplaces::save_workplace};
use crate::db::{
    connection::Database,
    helpers::{format_datetime, parse_datetime, parse_optional_datetime, parse_state, to_u64},
    models::{StateKind, StateRecord},
};
use crate::inference::Command;

const RECORD_SELECT: &str = "SELECT r.id, r.workplace_id, r.state_id, s.name AS state_name,
            r.date_time_start, r.date_time_end, r.duration_ms
     FROM state_records r
     JOIN states s ON s.id = r.state_id";

fn row_to_state_record(row: &Row) -> Result<StateRecord> {
    let state_name: String = row.get("state_name")?;
    let started_at: String = row.get("date_time_start")?;
    let ended_at: Option<String> = row.get("date_time_end")?;
    let duration_ms: Option<i64> = row.get("duration_ms")?;

    Ok(StateRecord {
        id: row.get("id")?,
        workplace_id: row.get("workplace_id")?,
        state_id: row.get("state_id")?,
        state: parse_state(&state_name)?,
        started_at: parse_datetime(&started_at, "date_time_start")?,
        ended_at: parse_optional_datetime(ended_at, "date_time_end")?,
        duration_ms: duration_ms
            .map(|ms| to_u64(ms, "duration_ms"))
            .transpose()?,
    })
}

/// Close the open interval of a workplace at `ended_at`.
fn close_state_record(conn: &Connection, workplace_id: i64, ended_at: DateTime<Utc>) -> Result<()> {
    let open: Option<(i64, String)> = conn
        .query_row(
            "SELECT id, date_time_start FROM state_records
             WHERE workplace_id = ?1 AND date_time_end IS NULL
             ORDER BY date_time_start DESC, id DESC
             LIMIT 1",
            params![workplace_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((record_id, started_at)) = open else {
        return Ok(());
    };
    let started_at = parse_datetime(&started_at, "date_time_start")?;
    let duration_ms = (ended_at - started_at).num_milliseconds().max(0);

    conn.execute(
        "UPDATE state_records
         SET date_time_end = ?1,
             duration_ms = ?2
         WHERE id = ?3",
        params![format_datetime(&ended_at), duration_ms, record_id],
    )?;
    Ok(())
}

fn insert_state_record(
    conn: &Connection,
    workplace_id: i64,
    state: StateKind,
    started_at: DateTime<Utc>,
) -> Result<()> {
    let state_id = state_id_by_name(conn, state)?;
    conn.execute(
        "INSERT INTO state_records (workplace_id, state_id, date_time_start)
         VALUES (?1, ?2, ?3)",
        params![workplace_id, state_id, format_datetime(&started_at)],
    )?;
    Ok(())
}

impl Database {
    /// Most recent interval of a workplace, open or closed.
    pub async fn last_state_record(&self, workplace_id: i64) -> Result<Option<StateRecord>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{RECORD_SELECT}
                 WHERE r.workplace_id = ?1
                 ORDER BY r.date_time_start DESC, r.id DESC
                 LIMIT 1"
            ))?;
            let mut rows = stmt.query(params![workplace_id])?;
            rows.next()?.map(row_to_state_record).transpose()
        })
        .await
        .context("failed to read latest workplace state")
    }

    pub async fn state_records_for_workplace(&self, workplace_id: i64) -> Result<Vec<StateRecord>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{RECORD_SELECT}
                 WHERE r.workplace_id = ?1
                 ORDER BY r.date_time_start ASC, r.id ASC"
            ))?;
            let mut rows = stmt.query(params![workplace_id])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_state_record(row)?);
            }
            Ok(records)
        })
        .await
    }

    /// Apply the commands of one cycle atomically: either every interval and
    /// workplace write lands, or none does.
    pub async fn apply_commands(&self, workplace_id: i64, commands: Vec<Command>) -> Result<()> {
        if commands.is_empty() {
            return Ok(());
        }
        self.execute(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open state transaction")?;
            for command in &commands {
                match command {
                    Command::CloseInterval { at } => close_state_record(&tx, workplace_id, *at)?,
                    Command::OpenInterval { state, at } => {
                        insert_state_record(&tx, workplace_id, *state, *at)?
                    }
                    Command::SaveWorkplace(snapshot) => {
                        let state_id = match snapshot.state {
                            StateKind::Unknown => None,
                            state => Some(state_id_by_name(&tx, state)?),
                        };
                        save_workplace(&tx, workplace_id, state_id, snapshot)?;
                    }
                }
            }
            tx.commit().context("failed to commit state transaction")?;
            Ok(())
        })
        .await
    }
}
