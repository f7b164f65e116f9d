use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::db::{Database, Workplace};
use crate::utils::logging::MAIN;

use super::loop_worker::{pacing_delay, workplace_loop};
use super::registry::WorkerRegistry;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

/// Active workplaces as of the last successful refresh.
pub type Roster = Arc<Vec<Workplace>>;

const DRAIN_POLL: Duration = Duration::from_millis(250);

/// Keeps exactly one worker per active workplace.
pub struct Dispatcher {
    db: Database,
    registry: Arc<WorkerRegistry>,
    roster_tx: watch::Sender<Roster>,
    cancel_token: CancellationToken,
    poll_interval: Duration,
}

impl Dispatcher {
    pub fn new(db: Database, cancel_token: CancellationToken, poll_interval: Duration) -> Self {
        let (roster_tx, _) = watch::channel(Roster::default());
        Self {
            db,
            registry: WorkerRegistry::new(),
            roster_tx,
            cancel_token,
            poll_interval,
        }
    }

    pub fn registry(&self) -> Arc<WorkerRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn roster(&self) -> Roster {
        Arc::clone(&self.roster_tx.borrow())
    }

    /// Reload the active workplaces. A failed read keeps the previous roster.
    pub async fn refresh_roster(&self) -> Roster {
        match self.db.list_active_workplaces().await {
            Ok(workplaces) => {
                let roster: Roster = Arc::new(workplaces);
                self.roster_tx.send_replace(Arc::clone(&roster));
                roster
            }
            Err(err) => {
                log_error!(MAIN, "Roster refresh failed, keeping previous: {err:#}");
                self.roster()
            }
        }
    }

    /// Spawn a worker for every listed workplace without one. Returns how
    /// many were started.
    pub fn start_missing_workers(&self, roster: &Roster) -> usize {
        let mut started = 0;
        for workplace in roster.iter() {
            let Some(claim) = self.registry.mark_running(workplace.id) else {
                continue;
            };
            tokio::spawn(workplace_loop(
                workplace.clone(),
                self.db.clone(),
                claim,
                self.roster_tx.subscribe(),
                self.cancel_token.clone(),
                self.poll_interval,
            ));
            started += 1;
        }
        started
    }

    pub async fn dispatch_cycle(&self) -> usize {
        let roster = self.refresh_roster().await;
        let started = self.start_missing_workers(&roster);
        log_info!(
            MAIN,
            "Active workplaces: {}, running: {}, started: {}",
            roster.len(),
            self.registry.running_count(),
            started
        );
        started
    }

    pub async fn run(self) {
        log_info!(MAIN, "Dispatcher started");

        while !self.cancel_token.is_cancelled() {
            let started = Instant::now();
            self.dispatch_cycle().await;

            if let Some(delay) = pacing_delay(started.elapsed(), self.poll_interval) {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = self.cancel_token.cancelled() => {}
                }
            }
        }

        log_info!(MAIN, "Dispatcher stopped");
    }
}

/// Service lifecycle: owns the dispatcher task and the shared stop signal.
pub struct StateService {
    db: Database,
    poll_interval: Duration,
    registry: Option<Arc<WorkerRegistry>>,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl StateService {
    pub fn new(db: Database, poll_interval: Duration) -> Self {
        Self {
            db,
            poll_interval,
            registry: None,
            handle: None,
            cancel_token: None,
        }
    }

    pub fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            bail!("state service already running");
        }

        let cancel_token = CancellationToken::new();
        let dispatcher = Dispatcher::new(self.db.clone(), cancel_token.clone(), self.poll_interval);

        self.registry = Some(dispatcher.registry());
        self.handle = Some(tokio::spawn(dispatcher.run()));
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub fn running_count(&self) -> usize {
        self.registry
            .as_ref()
            .map_or(0, |registry| registry.running_count())
    }

    /// Signal every loop to stop, then wait until no worker holds a claim.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        let mut joined = Ok(());
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                log_error!(MAIN, "Dispatcher task failed: {err}");
                joined = Err(err).context("dispatcher task failed to join");
            }
        }

        loop {
            let running = self.running_count();
            if running == 0 {
                break;
            }
            log_info!(MAIN, "Stopping, still running workplaces: {running}");
            tokio::time::sleep(DRAIN_POLL).await;
        }

        self.registry = None;
        log_info!(MAIN, "Stopped");
        joined
    }
}
