use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{Paths, RunConfig, Settings};
use crate::dedup::DedupStore;
use crate::driver::DriverFactory;
use crate::messaging::MessagingAgent;
use crate::poller::OrderPoller;
use crate::session::{LaunchOutcome, SessionController};
use crate::sites::Site;
use crate::utils::error::{AppError, Result};
use crate::utils::logger::EventLog;

const COMPONENT: &str = "AutomationController";

/// Operator-visible run state. Recoverable per-contact errors never show
/// up here; only a fatal launch failure does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Off,
    Starting,
    On,
    Error,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Off => write!(f, "OFF"),
            Status::Starting => write!(f, "STARTING"),
            Status::On => write!(f, "ON"),
            Status::Error => write!(f, "ERROR"),
        }
    }
}

/// Control surface consumed by the desktop shell: start/stop toggling, a
/// status stream for the indicator, and settings application.
///
/// All browser work runs on one background blocking worker; this type's
/// methods never block on the browser. A run's configuration is immutable:
/// applying settings requires the automation to be off.
pub struct AutomationController {
    paths: Paths,
    factory: Arc<dyn DriverFactory>,
    log: EventLog,
    stop: Arc<AtomicBool>,
    status_tx: watch::Sender<Status>,
    worker: Option<JoinHandle<()>>,
}

impl AutomationController {
    pub fn new(paths: Paths, factory: Arc<dyn DriverFactory>, log: EventLog) -> Self {
        let (status_tx, _) = watch::channel(Status::Off);
        Self {
            paths,
            factory,
            log,
            stop: Arc::new(AtomicBool::new(false)),
            status_tx,
            worker: None,
        }
    }

    pub fn status(&self) -> watch::Receiver<Status> {
        self.status_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Persists operator settings. Rejected while a run is active: a run's
    /// configuration is a snapshot, never a live mutation.
    pub fn apply_settings(&self, settings: &Settings) -> Result<()> {
        if self.is_running() {
            return Err(AppError::AlreadyRunning);
        }
        settings.save(&self.paths.settings_file)?;
        self.log.success("settings applied", COMPONENT);
        Ok(())
    }

    /// Spawns the automation worker and returns immediately. The worker
    /// brings the messaging session up first, then the orders session,
    /// then polls until stopped.
    pub fn start(&mut self, config: RunConfig) -> Result<()> {
        if self.is_running() {
            return Err(AppError::AlreadyRunning);
        }
        self.stop.store(false, Ordering::Relaxed);
        let _ = self.status_tx.send(Status::Starting);
        self.log.success("automation starting", COMPONENT);

        let paths = self.paths.clone();
        let factory = Arc::clone(&self.factory);
        let log = self.log.clone();
        let stop = Arc::clone(&self.stop);
        let status = self.status_tx.clone();

        self.worker = Some(tokio::task::spawn_blocking(move || {
            run_automation(config, paths, factory, log, stop, status);
        }));
        Ok(())
    }

    /// Raises the stop signal and waits for the worker to wind down. Safe
    /// to call repeatedly or when nothing is running.
    pub async fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                tracing::warn!("automation worker join failed: {e}");
            }
        }
        let _ = self.status_tx.send(Status::Off);
        self.log.success("automation stopped", COMPONENT);
    }
}

fn run_automation(
    config: RunConfig,
    paths: Paths,
    factory: Arc<dyn DriverFactory>,
    log: EventLog,
    stop: Arc<AtomicBool>,
    status: watch::Sender<Status>,
) {
    match launch_and_poll(config, &paths, factory, &log, stop, &status) {
        Ok(()) => {
            let _ = status.send(Status::Off);
        }
        Err(e) => {
            log.error(&format!("automation halted: {e}"), COMPONENT);
            tracing::error!("automation halted: {e}");
            let _ = status.send(Status::Error);
        }
    }
}

/// The single worker's whole lifetime: launch messaging, launch orders,
/// poll. Launch failures propagate (no automatic restart); a stop during
/// any launch phase unwinds cleanly.
fn launch_and_poll(
    config: RunConfig,
    paths: &Paths,
    factory: Arc<dyn DriverFactory>,
    log: &EventLog,
    stop: Arc<AtomicBool>,
    status: &watch::Sender<Status>,
) -> Result<()> {
    let mut messaging_session = SessionController::new(
        Site::messaging(paths),
        Arc::clone(&factory),
        log.clone(),
        Arc::clone(&stop),
    );
    match messaging_session.launch(&config) {
        Ok(LaunchOutcome::Ready) => {}
        Ok(LaunchOutcome::AwaitingManualLogin) => {
            messaging_session.stop();
            return Ok(());
        }
        Err(e) => {
            messaging_session.stop();
            return Err(e);
        }
    }

    let mut agent = MessagingAgent::new(
        messaging_session,
        config.clone(),
        log.clone(),
        Arc::clone(&stop),
    );
    if stop.load(Ordering::Relaxed) {
        agent.shutdown();
        return Ok(());
    }

    let mut orders_session = SessionController::new(
        Site::orders(paths),
        factory,
        log.clone(),
        Arc::clone(&stop),
    );
    match orders_session.launch(&config) {
        Ok(LaunchOutcome::Ready) => {}
        Ok(LaunchOutcome::AwaitingManualLogin) => {
            orders_session.stop();
            agent.shutdown();
            return Ok(());
        }
        Err(e) => {
            orders_session.stop();
            agent.shutdown();
            return Err(e);
        }
    }

    let store = match DedupStore::open(&paths.dedup_file) {
        Ok(store) => store,
        Err(e) => {
            orders_session.stop();
            agent.shutdown();
            return Err(e);
        }
    };

    let _ = status.send(Status::On);
    let mut poller = OrderPoller::new(
        orders_session,
        agent,
        store,
        config,
        log.clone(),
        stop,
    );
    poller.run();
    poller.shutdown();
    Ok(())
}
