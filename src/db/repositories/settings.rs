use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension};

use crate::db::connection::Database;

impl Database {
    /// Record the running service version under its name.
    pub async fn write_program_version(&self, program: &str, version: &str) -> Result<()> {
        let program = program.to_string();
        let version = version.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO settings (name, value) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET value = excluded.value",
                params![program, version],
            )
            .context("failed to write program version")?;
            Ok(())
        })
        .await
    }

    pub async fn get_setting(&self, name: &str) -> Result<Option<String>> {
        let name = name.to_string();
        self.execute(move |conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM settings WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_support::open_test_db;

    #[tokio::test]
    async fn program_version_is_upserted() {
        let (_dir, db) = open_test_db();

        db.write_program_version("State Service", "0.1.0").await.unwrap();
        db.write_program_version("State Service", "0.2.0").await.unwrap();

        assert_eq!(
            db.get_setting("State Service").await.unwrap().as_deref(),
            Some("0.2.0")
        );
        assert!(db.get_setting("Other").await.unwrap().is_none());
    }
}
