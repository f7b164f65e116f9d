use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{format_datetime, parse_datetime},
    models::RawSignalReading,
};

#[derive(Clone, Copy)]
enum ReadingTable {
    Analog,
    Digital,
}

impl ReadingTable {
    fn name(self) -> &'static str {
        match self {
            ReadingTable::Analog => "device_port_analog_records",
            ReadingTable::Digital => "device_port_digital_records",
        }
    }
}

fn row_to_reading(row: &Row) -> Result<RawSignalReading> {
    let date_time: String = row.get("date_time")?;

    Ok(RawSignalReading {
        id: row.get("id")?,
        device_port_id: row.get("device_port_id")?,
        recorded_at: parse_datetime(&date_time, "date_time")?,
        value: row.get("data")?,
    })
}

impl Database {
    /// Power-sense readings strictly newer than `since`, oldest first.
    pub async fn analog_readings_since(
        &self,
        device_port_id: i64,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawSignalReading>> {
        self.readings_since(ReadingTable::Analog, device_port_id, since)
            .await
            .context("failed to read poweroff records")
    }

    /// Production readings strictly newer than `since`, oldest first.
    pub async fn digital_readings_since(
        &self,
        device_port_id: i64,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawSignalReading>> {
        self.readings_since(ReadingTable::Digital, device_port_id, since)
            .await
            .context("failed to read production records")
    }

    async fn readings_since(
        &self,
        table: ReadingTable,
        device_port_id: i64,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawSignalReading>> {
        let since = since.map(|dt| format_datetime(&dt));
        self.execute(move |conn| {
            // integer digital data converts to REAL on read
            let mut stmt = conn.prepare(&format!(
                "SELECT id, device_port_id, date_time, CAST(data AS REAL) AS data
                 FROM {}
                 WHERE device_port_id = ?1 AND (?2 IS NULL OR date_time > ?2)
                 ORDER BY date_time ASC, id ASC",
                table.name()
            ))?;

            let mut rows = stmt.query(params![device_port_id, since])?;
            let mut readings = Vec::new();
            while let Some(row) = rows.next()? {
                readings.push(row_to_reading(row)?);
            }
            Ok(readings)
        })
        .await
    }

    pub async fn insert_analog_reading(
        &self,
        device_port_id: i64,
        recorded_at: DateTime<Utc>,
        value: f64,
    ) -> Result<()> {
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO device_port_analog_records (device_port_id, date_time, data)
                 VALUES (?1, ?2, ?3)",
                params![device_port_id, format_datetime(&recorded_at), value],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn insert_digital_reading(
        &self,
        device_port_id: i64,
        recorded_at: DateTime<Utc>,
        value: bool,
    ) -> Result<()> {
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO device_port_digital_records (device_port_id, date_time, data)
                 VALUES (?1, ?2, ?3)",
                params![device_port_id, format_datetime(&recorded_at), i64::from(value)],
            )?;
            Ok(())
        })
        .await
    }
}
