use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, SecondsFormat, Utc};

use crate::db::models::StateKind;

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

/// Fixed-width UTC text, so that string comparison in SQL is chronological.
pub fn format_datetime(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn format_optional_datetime(value: Option<&DateTime<Utc>>) -> Option<String> {
    value.map(format_datetime)
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

pub fn duration_from_secs(value: i64, field: &str) -> Result<Duration> {
    let secs = to_u64(value, field)?;
    let secs = i64::try_from(secs).map_err(|_| anyhow!("{field} is out of range"))?;
    Duration::try_seconds(secs).ok_or_else(|| anyhow!("{field} is out of range"))
}

pub fn parse_state(value: &str) -> Result<StateKind> {
    StateKind::from_name(value).ok_or_else(|| anyhow!("unknown state {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;

    #[test]
    fn formatted_datetimes_sort_chronologically() {
        let whole = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let fraction = whole + Duration::milliseconds(250);
        let later = whole + Duration::seconds(1);

        let mut texts = vec![
            format_datetime(&later),
            format_datetime(&fraction),
            format_datetime(&whole),
        ];
        texts.sort();

        assert_eq!(
            texts,
            vec![
                format_datetime(&whole),
                format_datetime(&fraction),
                format_datetime(&later)
            ]
        );
        assert_eq!(parse_datetime(&texts[1], "t").unwrap(), fraction);
    }

    #[test]
    fn negative_durations_are_rejected() {
        assert!(duration_from_secs(-1, "poweroff_duration_secs").is_err());
        assert_eq!(
            duration_from_secs(90, "downtime_duration_secs").unwrap(),
            Duration::seconds(90)
        );
    }

    #[test]
    fn state_names_round_trip_through_catalog_names() {
        assert_eq!(parse_state("Poweroff").unwrap(), StateKind::Poweroff);
        assert!(parse_state("Idle").is_err());
    }
}
