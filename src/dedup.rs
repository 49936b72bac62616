use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use chrono::Local;

use crate::utils::error::Result;

pub const DATE_FORMAT: &str = "%d/%m/%Y";

/// Persisted set of contact keys already processed today, backed by
/// `list_checked.txt`: line 1 is a `DD/MM/YYYY` stamp, every further line
/// one cleaned contact key. Entries are appended, never removed; the whole
/// file is the unit of rollover. Exactly one store exists per run and only
/// the polling worker writes to it.
pub struct DedupStore {
    path: PathBuf,
    today: String,
    entries: Vec<String>,
}

impl DedupStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_for_date(path, &Local::now().format(DATE_FORMAT).to_string())
    }

    /// Rollover seam: the date is injected so tests do not depend on the
    /// wall clock.
    pub fn open_for_date(path: impl Into<PathBuf>, today: &str) -> Result<Self> {
        let path = path.into();
        let mut store = Self {
            path,
            today: today.to_string(),
            entries: Vec::new(),
        };

        match fs::read_to_string(&store.path) {
            Ok(content) => {
                let lines: Vec<String> = content.lines().map(String::from).collect();
                if lines.first().map(String::as_str) == Some(today) {
                    store.entries = lines;
                } else {
                    // Stale (or empty) stamp: the whole list rolls over
                    store.reset()?;
                }
            }
            Err(_) => {
                tracing::info!("no dedup file at {:?}, seeding fresh", store.path);
                store.reset()?;
            }
        }
        Ok(store)
    }

    fn reset(&mut self) -> Result<()> {
        fs::write(&self.path, format!("{}\n", self.today))?;
        self.entries = vec![self.today.clone()];
        Ok(())
    }

    pub fn today(&self) -> &str {
        &self.today
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|entry| entry == key)
    }

    /// Appends the key to memory and file. Append-on-write: the file is
    /// never rewritten outside of rollover.
    pub fn record(&mut self, key: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{key}")?;
        self.entries.push(key.to_string());
        Ok(())
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}
