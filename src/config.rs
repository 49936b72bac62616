use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::utils::error::{AppError, Result};

const DEFAULT_WAIT_TIME_SECS: u64 = 10;

/// Filesystem layout, constructed once at startup and passed down. Nothing
/// else in the crate hard-codes a path.
#[derive(Debug, Clone)]
pub struct Paths {
    pub root: PathBuf,
    pub settings_file: PathBuf,
    pub dedup_file: PathBuf,
    pub log_file: PathBuf,
    pub orders_profile: PathBuf,
    pub messaging_profile: PathBuf,
}

impl Paths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            settings_file: root.join("settings.json"),
            dedup_file: root.join("list_checked.txt"),
            log_file: root.join("log.txt"),
            orders_profile: root.join("profiles").join("orders"),
            messaging_profile: root.join("profiles").join("messaging"),
            root,
        }
    }
}

/// Persisted operator settings, flat JSON (`settings.json`). `wait_time`
/// stays string-encoded on disk for compatibility with files written by
/// earlier releases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub msg_title: String,
    pub automatic_msg: String,
    pub force_visible: bool,
    pub wait_time: String,
    pub log_on: bool,
    pub check_messages: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            msg_title: String::new(),
            automatic_msg: String::new(),
            force_visible: false,
            wait_time: DEFAULT_WAIT_TIME_SECS.to_string(),
            log_on: false,
            check_messages: true,
        }
    }
}

/// Immutable snapshot the automation runs against. Replacing it requires a
/// full stop/start cycle; a running worker never observes a partial edit.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub message_title: String,
    pub message_lines: Vec<String>,
    pub force_visible: bool,
    pub poll_delay: Duration,
    pub logging_enabled: bool,
    pub verify_existing_message: bool,
}

impl Settings {
    pub fn to_run_config(&self) -> RunConfig {
        RunConfig {
            message_title: self.msg_title.clone(),
            message_lines: self
                .automatic_msg
                .split('\n')
                .map(|line| line.trim_end_matches('\r').to_string())
                .collect(),
            force_visible: self.force_visible,
            poll_delay: Duration::from_secs(
                self.wait_time
                    .trim()
                    .parse()
                    .unwrap_or(DEFAULT_WAIT_TIME_SECS),
            ),
            logging_enabled: self.log_on,
            verify_existing_message: self.check_messages,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Loads settings with defaults, migration and backup semantics:
/// - missing file: defaults are written to a fresh file;
/// - malformed file: copied aside to `<name>.backup`, then defaults written;
/// - legacy `browser` key: renamed to `force_visible` when the new key is
///   absent, and always removed afterwards;
/// - keys absent from the file are filled from defaults; the migrated
///   result is written back.
pub fn load_settings(path: &Path) -> Result<Settings> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => {
            tracing::info!("settings file missing, writing defaults to {path:?}");
            let settings = Settings::default();
            settings.save(path)?;
            return Ok(settings);
        }
    };

    let parsed: Value = match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("settings file malformed ({e}), backing up and recreating");
            backup_file(path)?;
            let settings = Settings::default();
            settings.save(path)?;
            return Ok(settings);
        }
    };

    let mut object = match parsed {
        Value::Object(object) => object,
        _ => {
            tracing::warn!("settings file is not a JSON object, backing up and recreating");
            backup_file(path)?;
            let settings = Settings::default();
            settings.save(path)?;
            return Ok(settings);
        }
    };

    migrate(&mut object);
    fill_defaults(&mut object);

    let settings: Settings = serde_json::from_value(Value::Object(object))
        .map_err(|e| AppError::Settings(format!("settings do not deserialize: {e}")))?;
    settings.save(path)?;
    Ok(settings)
}

fn backup_file(path: &Path) -> Result<()> {
    let mut backup = path.as_os_str().to_owned();
    backup.push(".backup");
    fs::copy(path, PathBuf::from(backup))?;
    Ok(())
}

fn migrate(object: &mut Map<String, Value>) {
    // 'browser' predates 'force_visible'
    if object.contains_key("browser") && !object.contains_key("force_visible") {
        if let Some(old) = object.remove("browser") {
            tracing::info!("migrated settings key 'browser' -> 'force_visible'");
            object.insert("force_visible".to_string(), old);
        }
    }
    for obsolete in ["browser"] {
        if object.remove(obsolete).is_some() {
            tracing::info!("removed obsolete settings key '{obsolete}'");
        }
    }
}

fn fill_defaults(object: &mut Map<String, Value>) {
    let defaults = serde_json::to_value(Settings::default()).expect("defaults serialize");
    if let Value::Object(defaults) = defaults {
        for (key, value) in defaults {
            object.entry(key).or_insert(value);
        }
    }
}
