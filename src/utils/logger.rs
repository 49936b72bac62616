use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Local;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Success,
    Error,
    Info,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Success => write!(f, "SUCCESS"),
            LogLevel::Error => write!(f, "ERROR"),
            LogLevel::Info => write!(f, "INFO"),
        }
    }
}

/// Operator-facing event log appended to `log.txt`, one line per event:
/// `"<LEVEL>: <message> (<component>) <DD/MM/YYYY HH:MM:SS>"`.
///
/// A single handle is shared by every component instead of each owning its
/// own file state; cloning is cheap. Disabled handles drop all events.
/// Diagnostics for developers go through `tracing`, not through here.
#[derive(Clone)]
pub struct EventLog {
    inner: Arc<Inner>,
}

struct Inner {
    path: PathBuf,
    enabled: bool,
    file: Mutex<()>,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                path: path.into(),
                enabled,
                file: Mutex::new(()),
            }),
        }
    }

    /// A log handle that never writes anywhere.
    pub fn disabled() -> Self {
        Self::new(PathBuf::new(), false)
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled
    }

    pub fn success(&self, message: &str, source: &str) {
        self.log(LogLevel::Success, message, source);
    }

    pub fn error(&self, message: &str, source: &str) {
        self.log(LogLevel::Error, message, source);
    }

    pub fn info(&self, message: &str, source: &str) {
        self.log(LogLevel::Info, message, source);
    }

    pub fn log(&self, level: LogLevel, message: &str, source: &str) {
        if !self.inner.enabled {
            return;
        }
        let stamp = Local::now().format("%d/%m/%Y %H:%M:%S");
        let line = format!("{level}: {message} ({source}) {stamp}");

        let _guard = self.inner.file.lock().unwrap_or_else(|e| e.into_inner());
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)
            .and_then(|mut f| writeln!(f, "{line}"));
        if let Err(e) = result {
            // The event log must never take the automation down with it.
            tracing::warn!("event log write failed: {e}");
        }
    }
}
