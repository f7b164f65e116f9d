//! Fixtures shared by store, worker and dispatcher tests.

use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

use crate::db::{Database, NewWorkplace, StateKind, Workplace};

pub(crate) fn open_test_db() -> (TempDir, Database) {
    let dir = TempDir::new().unwrap();
    let db = Database::open(&dir.path().join("workstate.sqlite3")).unwrap();
    (dir, db)
}

pub(crate) fn t(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, 7, 0, 0).unwrap() + Duration::seconds(secs)
}

pub(crate) fn power_port(workplace_id: i64) -> i64 {
    workplace_id * 100 + 1
}

pub(crate) fn production_port(workplace_id: i64) -> i64 {
    workplace_id * 100 + 2
}

/// Registers a workplace in the seeded `Production` mode with both ports bound.
pub(crate) async fn seed_workplace(db: &Database, name: &str) -> Workplace {
    let id = db
        .insert_workplace(&NewWorkplace {
            name: name.into(),
            code: name.to_lowercase().replace(' ', "-"),
            mode_id: 1,
        })
        .await
        .unwrap();
    db.bind_port(id, power_port(id), StateKind::Poweroff)
        .await
        .unwrap();
    db.bind_port(id, production_port(id), StateKind::Production)
        .await
        .unwrap();
    db.get_workplace(id).await.unwrap()
}
