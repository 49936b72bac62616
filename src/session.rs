use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::config::RunConfig;
use crate::driver::{DriverFactory, PageDriver};
use crate::selector::resolve_first;
use crate::sites::Site;
use crate::utils::error::{AppError, Result};
use crate::utils::logger::EventLog;

/// Short probe used right after navigation to decide the login state.
const LOGIN_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Cadence of the interactive-login wait; the stop flag is observed once
/// per iteration.
const LOGIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    Launching,
    DetectingLogin,
    AwaitingManualLogin,
    Ready,
    Stopped,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStatus {
    LoggedIn,
    NeedsLogin,
    Indeterminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    Ready,
    /// The stop signal arrived before the operator finished logging in.
    AwaitingManualLogin,
}

/// Owns one browser session's lifecycle for one target site: launch,
/// login-state detection, headless-to-visible escalation, teardown.
///
/// Callers must check [`SessionController::is_ready`] before driving the
/// page; a session is never handed to the messaging agent or the poller in
/// any other state.
pub struct SessionController {
    site: Site,
    factory: Arc<dyn DriverFactory>,
    log: EventLog,
    stop: Arc<AtomicBool>,
    driver: Option<Box<dyn PageDriver>>,
    state: SessionState,
    visible: bool,
    profile_wiped: bool,
}

impl SessionController {
    pub fn new(
        site: Site,
        factory: Arc<dyn DriverFactory>,
        log: EventLog,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            site,
            factory,
            log,
            stop,
            driver: None,
            state: SessionState::NotStarted,
            visible: false,
            profile_wiped: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    pub fn driver(&self) -> Result<&dyn PageDriver> {
        match (&self.driver, self.state) {
            (Some(driver), SessionState::Ready) => Ok(driver.as_ref()),
            _ => Err(AppError::SessionNotReady(self.site.name.to_string())),
        }
    }

    pub fn driver_mut(&mut self) -> Result<&mut dyn PageDriver> {
        match (&mut self.driver, self.state) {
            (Some(driver), SessionState::Ready) => Ok(driver.as_mut()),
            _ => Err(AppError::SessionNotReady(self.site.name.to_string())),
        }
    }

    /// Brings the session to `Ready`. Starts headless unless the run is
    /// forced visible; escalates to a visible relaunch against the same
    /// profile when interactive login is required.
    pub fn launch(&mut self, config: &RunConfig) -> Result<LaunchOutcome> {
        self.profile_wiped = false;
        self.visible = config.force_visible;
        self.boot(!config.force_visible)?;

        self.state = SessionState::DetectingLogin;
        match self.detect_login() {
            LoginStatus::LoggedIn => {
                self.state = SessionState::Ready;
                self.log
                    .success(&format!("{} already logged in", self.site.name), "SessionController");
                Ok(LaunchOutcome::Ready)
            }
            // Indeterminate fails safe toward requiring a human
            LoginStatus::NeedsLogin | LoginStatus::Indeterminate => {
                if !self.visible {
                    self.escalate_to_visible()?;
                }
                self.interactive_login()
            }
        }
    }

    fn boot(&mut self, headless: bool) -> Result<()> {
        self.state = SessionState::Launching;
        tracing::info!(site = self.site.name, headless, "launching browser session");

        let mut driver = match self.factory.launch(&self.site.profile_dir, headless) {
            Ok(driver) => driver,
            Err(e) => {
                // Corrupted-profile recovery: destructive, at most once per
                // launch attempt, and the failure still propagates.
                if !self.profile_wiped && self.site.profile_dir.exists() {
                    self.profile_wiped = true;
                    tracing::warn!(site = self.site.name, "wiping profile after launch failure");
                    let _ = fs::remove_dir_all(&self.site.profile_dir);
                }
                self.state = SessionState::Failed;
                self.log
                    .error(&format!("{} driver launch failed: {e}", self.site.name), "SessionController");
                return Err(e);
            }
        };

        if let Err(e) = driver.navigate(self.site.url) {
            self.state = SessionState::Failed;
            self.log
                .error(&format!("{} navigation failed: {e}", self.site.name), "SessionController");
            return Err(e);
        }
        self.driver = Some(driver);
        Ok(())
    }

    /// Quick logged-in probe: a ready marker wins; a credentials marker, or
    /// nothing recognizable at all, means a human is needed.
    fn detect_login(&self) -> LoginStatus {
        let Some(driver) = self.driver.as_deref() else {
            return LoginStatus::Indeterminate;
        };
        if resolve_first(driver, &self.site.ready_markers, LOGIN_PROBE_TIMEOUT).is_ok() {
            return LoginStatus::LoggedIn;
        }
        if self
            .site
            .login_markers
            .iter()
            .any(|marker| driver.exists_now(marker))
        {
            tracing::info!(site = self.site.name, "credentials marker present, login needed");
            return LoginStatus::NeedsLogin;
        }
        LoginStatus::Indeterminate
    }

    /// Tears the headless session down and relaunches visibly against the
    /// same profile so the operator can log in.
    fn escalate_to_visible(&mut self) -> Result<()> {
        self.log.info(
            &format!(
                "{} needs login - opening a visible browser; log in and leave it open",
                self.site.name
            ),
            "SessionController",
        );
        tracing::info!(site = self.site.name, "switching to visible mode for login");

        if let Some(mut driver) = self.driver.take() {
            driver.close();
        }
        self.visible = true;
        self.boot(false)
    }

    /// Blocks until the ready marker appears or the stop signal is raised,
    /// polling at a fixed cadence.
    fn interactive_login(&mut self) -> Result<LaunchOutcome> {
        self.state = SessionState::AwaitingManualLogin;
        let driver = self
            .driver
            .as_deref()
            .ok_or_else(|| AppError::SessionNotReady(self.site.name.to_string()))?;

        loop {
            if self.stop.load(Ordering::Relaxed) {
                tracing::info!(site = self.site.name, "stop raised during login wait");
                return Ok(LaunchOutcome::AwaitingManualLogin);
            }
            if resolve_first(driver, &self.site.ready_markers, LOGIN_POLL_INTERVAL).is_ok() {
                self.state = SessionState::Ready;
                self.log
                    .success(&format!("{} logged in", self.site.name), "SessionController");
                return Ok(LaunchOutcome::Ready);
            }
            thread::sleep(LOGIN_POLL_INTERVAL);
        }
    }

    /// Idempotent teardown: raises the stop flag for any in-progress wait
    /// loop and releases the browser handle.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(mut driver) = self.driver.take() {
            driver.close();
            self.log
                .success(&format!("{} session closed", self.site.name), "SessionController");
        }
        if self.state != SessionState::Failed {
            self.state = SessionState::Stopped;
        }
    }
}
