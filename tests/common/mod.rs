// Shared test doubles driving the engine through its public API, no
// browser required.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use confirma_bot::driver::{DriverFactory, PageDriver};
use confirma_bot::selector::Locator;
use confirma_bot::utils::error::AppError;
use confirma_bot::Result;

/// Scripted page: presence and element texts are keyed by the locator
/// expression, every call is recorded.
#[derive(Default, Clone)]
pub struct ScriptedDriver {
    state: Arc<ScriptedState>,
}

#[derive(Default)]
struct ScriptedState {
    present: Mutex<HashSet<String>>,
    texts: Mutex<HashMap<String, Vec<String>>>,
    actions: Mutex<Vec<String>>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_present(&self, expression: &str) {
        self.state
            .present
            .lock()
            .unwrap()
            .insert(expression.to_string());
    }

    pub fn set_texts(&self, expression: &str, texts: Vec<&str>) {
        self.state.texts.lock().unwrap().insert(
            expression.to_string(),
            texts.into_iter().map(String::from).collect(),
        );
    }

    pub fn actions(&self) -> Vec<String> {
        self.state.actions.lock().unwrap().clone()
    }

    fn record(&self, action: String) {
        self.state.actions.lock().unwrap().push(action);
    }

    fn is_present(&self, locator: &Locator) -> bool {
        self.state
            .present
            .lock()
            .unwrap()
            .contains(&locator.expression)
    }
}

impl PageDriver for ScriptedDriver {
    fn navigate(&mut self, url: &str) -> Result<()> {
        self.record(format!("navigate:{url}"));
        Ok(())
    }

    fn refresh(&mut self) -> Result<()> {
        self.record("refresh".to_string());
        Ok(())
    }

    fn wait_for(&self, locator: &Locator, _timeout: Duration) -> Result<()> {
        if self.is_present(locator) {
            Ok(())
        } else {
            Err(AppError::Timeout(locator.to_string()))
        }
    }

    fn exists_now(&self, locator: &Locator) -> bool {
        self.is_present(locator)
    }

    fn click(&self, locator: &Locator) -> Result<()> {
        self.record(format!("click:{}", locator.expression));
        if self.is_present(locator) {
            Ok(())
        } else {
            Err(AppError::ElementNotFound {
                selector: locator.to_string(),
            })
        }
    }

    fn clear(&self, locator: &Locator) -> Result<()> {
        self.record(format!("clear:{}", locator.expression));
        Ok(())
    }

    fn type_text(&self, locator: &Locator, text: &str) -> Result<()> {
        self.record(format!("type:{}:{text}", locator.expression));
        Ok(())
    }

    fn press_enter(&self, locator: &Locator) -> Result<()> {
        self.record(format!("enter:{}", locator.expression));
        Ok(())
    }

    fn inner_texts(&self, locator: &Locator) -> Result<Vec<String>> {
        match self.state.texts.lock().unwrap().get(&locator.expression) {
            Some(texts) => Ok(texts.clone()),
            None => Err(AppError::Timeout(locator.to_string())),
        }
    }

    fn close(&mut self) {
        self.record("close".to_string());
    }
}

/// Hands out scripted drivers in launch order.
pub struct ScriptedFactory {
    drivers: Mutex<Vec<ScriptedDriver>>,
}

impl ScriptedFactory {
    pub fn new(drivers: Vec<ScriptedDriver>) -> Self {
        Self {
            drivers: Mutex::new(drivers),
        }
    }
}

impl DriverFactory for ScriptedFactory {
    fn launch(&self, _profile_dir: &Path, _headless: bool) -> Result<Box<dyn PageDriver>> {
        let mut drivers = self.drivers.lock().unwrap();
        if drivers.is_empty() {
            return Err(AppError::DriverUnavailable("no scripted driver left".into()));
        }
        Ok(Box::new(drivers.remove(0)))
    }
}

/// A messaging page that is logged in and ready for the whole chat flow
/// toward the given contact.
pub fn messaging_page(formatted: &str) -> ScriptedDriver {
    let driver = ScriptedDriver::new();
    driver.add_present("#side");
    driver.add_present("[aria-label=\"Nova conversa\"]");
    driver.add_present("[aria-label=\"Pesquisar nome ou número\"]");
    driver.add_present(&format!("//span[@title=\"{formatted}\"]"));
    driver.add_present("div[contenteditable=\"true\"][data-tab=\"10\"]");
    driver.set_texts(".copyable-area", vec![]);
    driver
}

/// A logged-in orders dashboard rendering the given order rows.
pub fn orders_page(rows: Vec<&str>) -> ScriptedDriver {
    let driver = ScriptedDriver::new();
    driver.add_present("#main > section > div");
    driver.set_texts("#main > section > div", rows);
    driver
}

#[allow(dead_code)]
pub fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    false
}

#[allow(dead_code)]
pub fn data_dir() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().to_path_buf();
    (dir, path)
}
