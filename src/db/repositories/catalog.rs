//! State catalog, workplace modes and port bindings.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    error::LookupError,
    helpers::duration_from_secs,
    models::{StateKind, WorkplaceMode},
};

fn row_to_mode(row: &Row) -> Result<WorkplaceMode> {
    let poweroff_secs: i64 = row.get("poweroff_duration_secs")?;
    let downtime_secs: i64 = row.get("downtime_duration_secs")?;

    Ok(WorkplaceMode {
        id: row.get("id")?,
        name: row.get("name")?,
        poweroff_threshold: duration_from_secs(poweroff_secs, "poweroff_duration_secs")?,
        downtime_threshold: duration_from_secs(downtime_secs, "downtime_duration_secs")?,
    })
}

/// Catalog id of a state. `Unknown` and absent rows are both lookup misses.
pub(super) fn state_id_by_name(conn: &Connection, state: StateKind) -> Result<i64> {
    let Some(name) = state.catalog_name() else {
        return Err(LookupError::StateNotFound(state).into());
    };
    conn.query_row(
        "SELECT id FROM states WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| LookupError::StateNotFound(state).into())
}

impl Database {
    pub async fn state_id(&self, state: StateKind) -> Result<i64> {
        self.execute(move |conn| state_id_by_name(conn, state)).await
    }

    pub async fn get_mode(&self, mode_id: i64) -> Result<WorkplaceMode> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, poweroff_duration_secs, downtime_duration_secs
                 FROM workplace_modes
                 WHERE id = ?1",
            )?;
            let mut rows = stmt.query(params![mode_id])?;
            match rows.next()? {
                Some(row) => row_to_mode(row),
                None => Err(LookupError::ModeNotFound(mode_id).into()),
            }
        })
        .await
    }

    pub async fn insert_mode(
        &self,
        name: &str,
        poweroff_secs: u32,
        downtime_secs: u32,
    ) -> Result<i64> {
        let name = name.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO workplace_modes (name, poweroff_duration_secs, downtime_duration_secs)
                 VALUES (?1, ?2, ?3)",
                params![name, poweroff_secs, downtime_secs],
            )
            .with_context(|| format!("failed to insert workplace mode {name}"))?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Device port carrying the signal that evidences `state` at a workplace.
    pub async fn resolve_port(&self, workplace_id: i64, state: StateKind) -> Result<Option<i64>> {
        self.execute(move |conn| {
            let state_id = state_id_by_name(conn, state)?;
            let port = conn
                .query_row(
                    "SELECT device_port_id FROM workplace_ports
                     WHERE workplace_id = ?1 AND state_id = ?2
                     ORDER BY id
                     LIMIT 1",
                    params![workplace_id, state_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(port)
        })
        .await
    }

    pub async fn bind_port(
        &self,
        workplace_id: i64,
        device_port_id: i64,
        state: StateKind,
    ) -> Result<()> {
        self.execute(move |conn| {
            let state_id = state_id_by_name(conn, state)?;
            conn.execute(
                "INSERT INTO workplace_ports (workplace_id, device_port_id, state_id)
                 VALUES (?1, ?2, ?3)",
                params![workplace_id, device_port_id, state_id],
            )
            .context("failed to bind workplace port")?;
            Ok(())
        })
        .await
    }
}
