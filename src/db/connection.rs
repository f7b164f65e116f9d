use std::{
    path::Path,
    sync::{mpsc, Arc},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::run_migrations;

/// Collectors insert readings from other processes; wait for their write
/// locks instead of failing the cycle.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

/// The thread owning the connection. Closing the job queue ends it.
struct StoreThread {
    jobs: Option<mpsc::Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for StoreThread {
    fn drop(&mut self) {
        drop(self.jobs.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Store thread panicked");
            }
        }
    }
}

/// Signal store handle. Cheap to clone; every clone talks to the same
/// connection thread, so statements from all workers are serialized.
#[derive(Clone)]
pub struct Database {
    store: Arc<StoreThread>,
}

fn open_connection(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }
    }

    let mut conn = Connection::open(db_path)
        .with_context(|| format!("failed to open SQLite database {}", db_path.display()))?;
    let journal: String = conn
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
        .context("failed to enable WAL mode")?;
    if !journal.eq_ignore_ascii_case("wal") {
        warn!("Journal mode is {journal}, not WAL");
    }
    conn.pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign keys")?;
    conn.busy_timeout(BUSY_TIMEOUT)
        .context("failed to set busy timeout")?;
    run_migrations(&mut conn).context("failed to run database migrations")?;
    Ok(conn)
}

fn serve(mut conn: Connection, jobs: mpsc::Receiver<Job>) {
    for job in jobs {
        job(&mut conn);
    }
    info!("Store thread shutting down");
}

impl Database {
    /// Open (or create) the store and migrate it before any worker runs.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = open_connection(db_path)?;
        let (jobs_tx, jobs_rx) = mpsc::channel::<Job>();

        let handle = thread::Builder::new()
            .name("workstate-db".into())
            .spawn(move || serve(conn, jobs_rx))
            .context("failed to spawn store thread")?;

        info!("Signal store opened at {}", db_path.display());

        Ok(Self {
            store: Arc::new(StoreThread {
                jobs: Some(jobs_tx),
                handle: Some(handle),
            }),
        })
    }

    /// Run `task` on the store thread and wait for its result.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let jobs = self
            .store
            .jobs
            .as_ref()
            .ok_or_else(|| anyhow!("signal store is closed"))?;
        let (reply_tx, reply_rx) = oneshot::channel();

        jobs.send(Box::new(move |conn| {
            // the caller may have been cancelled mid-cycle
            let _ = reply_tx.send(task(conn));
        }))
        .map_err(|_| anyhow!("store thread is gone"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("store thread dropped the request"))?
    }
}
