use anyhow::{Context, Result};
use rusqlite::{params, Connection, Row};

use crate::db::{
    connection::Database,
    error::LookupError,
    helpers::{format_optional_datetime, parse_optional_datetime},
    models::{NewWorkplace, Workplace},
};
use crate::inference::WorkplaceSnapshot;

const WORKPLACE_COLUMNS: &str = "id, name, code, active, workplace_mode_id, state_id, state_since,
     poweroff_port_at, analog_port_at, production_port_at, production_port_value";

fn row_to_workplace(row: &Row) -> Result<Workplace> {
    let state_since: Option<String> = row.get("state_since")?;
    let poweroff_port_at: Option<String> = row.get("poweroff_port_at")?;
    let analog_port_at: Option<String> = row.get("analog_port_at")?;
    let production_port_at: Option<String> = row.get("production_port_at")?;

    Ok(Workplace {
        id: row.get("id")?,
        name: row.get("name")?,
        code: row.get("code")?,
        active: row.get("active")?,
        mode_id: row.get("workplace_mode_id")?,
        state_id: row.get("state_id")?,
        state_since: parse_optional_datetime(state_since, "state_since")?,
        poweroff_port_at: parse_optional_datetime(poweroff_port_at, "poweroff_port_at")?,
        analog_port_at: parse_optional_datetime(analog_port_at, "analog_port_at")?,
        production_port_at: parse_optional_datetime(production_port_at, "production_port_at")?,
        production_port_value: row.get("production_port_value")?,
    })
}

/// Persist state and cursors of a workplace. `state_id` is `None` for
/// `Unknown`.
pub(super) fn save_workplace(
    conn: &Connection,
    workplace_id: i64,
    state_id: Option<i64>,
    snapshot: &WorkplaceSnapshot,
) -> Result<()> {
    let updated = conn.execute(
        "UPDATE workplaces
         SET state_id = ?1,
             state_since = ?2,
             poweroff_port_at = ?3,
             analog_port_at = ?4,
             production_port_at = ?5,
             production_port_value = ?6
         WHERE id = ?7",
        params![
            state_id,
            format_optional_datetime(snapshot.state_since.as_ref()),
            format_optional_datetime(snapshot.power_seen_at.as_ref()),
            format_optional_datetime(snapshot.power_sense_at.as_ref()),
            format_optional_datetime(snapshot.production_seen_at.as_ref()),
            snapshot.production_value,
            workplace_id,
        ],
    )?;
    if updated == 0 {
        return Err(LookupError::WorkplaceNotFound(workplace_id).into());
    }
    Ok(())
}

impl Database {
    /// The roster the dispatcher schedules workers for.
    pub async fn list_active_workplaces(&self) -> Result<Vec<Workplace>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {WORKPLACE_COLUMNS} FROM workplaces WHERE active = 1 ORDER BY id"
            ))?;

            let mut rows = stmt.query([])?;
            let mut workplaces = Vec::new();
            while let Some(row) = rows.next()? {
                workplaces.push(row_to_workplace(row)?);
            }
            Ok(workplaces)
        })
        .await
        .context("failed to list active workplaces")
    }

    pub async fn get_workplace(&self, workplace_id: i64) -> Result<Workplace> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {WORKPLACE_COLUMNS} FROM workplaces WHERE id = ?1"
            ))?;
            let mut rows = stmt.query(params![workplace_id])?;
            match rows.next()? {
                Some(row) => row_to_workplace(row),
                None => Err(LookupError::WorkplaceNotFound(workplace_id).into()),
            }
        })
        .await
    }

    pub async fn insert_workplace(&self, workplace: &NewWorkplace) -> Result<i64> {
        let record = workplace.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO workplaces (name, code, workplace_mode_id) VALUES (?1, ?2, ?3)",
                params![record.name, record.code, record.mode_id],
            )
            .with_context(|| format!("failed to insert workplace {}", record.name))?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn set_workplace_active(&self, workplace_id: i64, active: bool) -> Result<()> {
        self.execute(move |conn| {
            let updated = conn.execute(
                "UPDATE workplaces SET active = ?1 WHERE id = ?2",
                params![active, workplace_id],
            )?;
            if updated == 0 {
                return Err(LookupError::WorkplaceNotFound(workplace_id).into());
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_support::{open_test_db, seed_workplace};
    use crate::db::LookupError;

    #[tokio::test]
    async fn roster_lists_only_active_workplaces() {
        let (_dir, db) = open_test_db();
        let press = seed_workplace(&db, "Press 1").await;
        let lathe = seed_workplace(&db, "Lathe 2").await;

        db.set_workplace_active(lathe.id, false).await.unwrap();

        let roster = db.list_active_workplaces().await.unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].id, press.id);
        assert_eq!(roster[0].name, "Press 1");
        assert!(roster[0].state_id.is_none());
        assert!(roster[0].poweroff_port_at.is_none());
        assert!(roster[0].analog_port_at.is_none());
    }

    #[tokio::test]
    async fn missing_workplace_is_a_lookup_error() {
        let (_dir, db) = open_test_db();

        let err = db.get_workplace(404).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<LookupError>(),
            Some(&LookupError::WorkplaceNotFound(404))
        );
    }
}
