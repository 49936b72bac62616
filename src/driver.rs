use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use headless_chrome::{Browser, Element, LaunchOptions, Tab};

use crate::selector::{Locator, Strategy};
use crate::utils::error::{AppError, Result};

/// Chrome idles between polling ticks; the default idle timeout would tear
/// the browser down mid-session.
const IDLE_TIMEOUT: Duration = Duration::from_secs(86_400);

const WINDOW_SIZE: (u32, u32) = (1920, 1080);

/// The locate-and-act surface of one controlled browser page. The engine
/// never touches the DOM except through these primitives, which keeps the
/// remote sites a black box and the engine testable with a scripted fake.
pub trait PageDriver: Send {
    fn navigate(&mut self, url: &str) -> Result<()>;
    fn refresh(&mut self) -> Result<()>;
    /// Bounded wait for the element's presence.
    fn wait_for(&self, locator: &Locator, timeout: Duration) -> Result<()>;
    /// Immediate presence probe, no wait.
    fn exists_now(&self, locator: &Locator) -> bool;
    fn click(&self, locator: &Locator) -> Result<()>;
    fn clear(&self, locator: &Locator) -> Result<()>;
    fn type_text(&self, locator: &Locator, text: &str) -> Result<()>;
    fn press_enter(&self, locator: &Locator) -> Result<()>;
    /// Inner text of every element the locator matches, in document order.
    fn inner_texts(&self, locator: &Locator) -> Result<Vec<String>>;
    fn close(&mut self);
}

/// Launches drivers bound to a persistent profile directory. The factory is
/// the injection seam for tests; production uses [`ChromeFactory`].
pub trait DriverFactory: Send + Sync {
    fn launch(&self, profile_dir: &Path, headless: bool) -> Result<Box<dyn PageDriver>>;
}

#[derive(Default)]
pub struct ChromeFactory {
    /// Explicit Chrome binary path; otherwise resolved from the system.
    pub chrome_path: Option<PathBuf>,
}

impl DriverFactory for ChromeFactory {
    fn launch(&self, profile_dir: &Path, headless: bool) -> Result<Box<dyn PageDriver>> {
        let mut launch_options = LaunchOptions::default_builder()
            .headless(headless)
            .sandbox(false)
            .window_size(Some(WINDOW_SIZE))
            .idle_browser_timeout(IDLE_TIMEOUT)
            .user_data_dir(Some(profile_dir.to_path_buf()))
            .args(vec![
                OsStr::new("--disable-print-preview"),
                OsStr::new("--disable-gpu"),
                OsStr::new("--disable-dev-shm-usage"),
            ])
            .build()
            .map_err(|e| AppError::DriverUnavailable(format!("launch options: {e}")))?;

        if let Some(chrome_path) = &self.chrome_path {
            launch_options.path = Some(chrome_path.clone());
        }

        let browser = Browser::new(launch_options)
            .map_err(|e| AppError::DriverUnavailable(e.to_string()))?;
        let tab = browser
            .new_tab()
            .map_err(|e| AppError::DriverUnavailable(format!("tab: {e}")))?;

        Ok(Box::new(ChromeDriver {
            _browser: browser,
            tab,
        }))
    }
}

/// One controlled Chrome page. The browser process is released on drop.
pub struct ChromeDriver {
    _browser: Browser,
    tab: std::sync::Arc<Tab>,
}

impl ChromeDriver {
    fn element(&self, locator: &Locator) -> Result<Element<'_>> {
        let found = match locator.strategy {
            Strategy::Css => self.tab.find_element(&locator.expression),
            Strategy::XPath => self.tab.find_element_by_xpath(&locator.expression),
        };
        found.map_err(|e| classify_action_error(locator, &e.to_string()))
    }
}

impl PageDriver for ChromeDriver {
    fn navigate(&mut self, url: &str) -> Result<()> {
        self.tab
            .navigate_to(url)
            .and_then(|t| t.wait_until_navigated())
            .map(|_| ())
            .map_err(|e| AppError::Driver(format!("navigate {url}: {e}")))
    }

    fn refresh(&mut self) -> Result<()> {
        self.tab
            .reload(false, None)
            .map(|_| ())
            .map_err(|e| AppError::Driver(format!("refresh: {e}")))
    }

    fn wait_for(&self, locator: &Locator, timeout: Duration) -> Result<()> {
        let waited = match locator.strategy {
            Strategy::Css => self
                .tab
                .wait_for_element_with_custom_timeout(&locator.expression, timeout),
            Strategy::XPath => self
                .tab
                .wait_for_xpath_with_custom_timeout(&locator.expression, timeout),
        };
        waited
            .map(|_| ())
            .map_err(|_| AppError::Timeout(locator.to_string()))
    }

    fn exists_now(&self, locator: &Locator) -> bool {
        self.element(locator).is_ok()
    }

    fn click(&self, locator: &Locator) -> Result<()> {
        let element = self.element(locator)?;
        element
            .click()
            .map(|_| ())
            .map_err(|e| classify_action_error(locator, &e.to_string()))
    }

    fn clear(&self, locator: &Locator) -> Result<()> {
        let element = self.element(locator)?;
        element
            .call_js_fn(
                "function() { this.innerHTML = ''; this.value = ''; }",
                vec![],
                false,
            )
            .map(|_| ())
            .map_err(|e| classify_action_error(locator, &e.to_string()))
    }

    fn type_text(&self, locator: &Locator, text: &str) -> Result<()> {
        let element = self.element(locator)?;
        element
            .type_into(text)
            .map(|_| ())
            .map_err(|e| classify_action_error(locator, &e.to_string()))
    }

    fn press_enter(&self, locator: &Locator) -> Result<()> {
        let element = self.element(locator)?;
        element
            .focus()
            .map_err(|e| classify_action_error(locator, &e.to_string()))?;
        self.tab
            .press_key("Enter")
            .map(|_| ())
            .map_err(|e| classify_action_error(locator, &e.to_string()))
    }

    fn inner_texts(&self, locator: &Locator) -> Result<Vec<String>> {
        let found = match locator.strategy {
            Strategy::Css => self.tab.find_elements(&locator.expression),
            Strategy::XPath => self.tab.find_elements_by_xpath(&locator.expression),
        };
        let elements = match found {
            Ok(elements) => elements,
            // No matches at all reads as an empty page section, not a fault
            Err(e) if e.to_string().to_lowercase().contains("no element") => return Ok(Vec::new()),
            Err(e) => return Err(classify_action_error(locator, &e.to_string())),
        };
        let mut texts = Vec::with_capacity(elements.len());
        for element in elements {
            let text = element
                .get_inner_text()
                .map_err(|e| classify_action_error(locator, &e.to_string()))?;
            texts.push(text);
        }
        Ok(texts)
    }

    fn close(&mut self) {
        // Dropping the Browser releases the child process; closing the tab
        // first lets the page fire unload handlers.
        let _ = self.tab.close(true);
    }
}

/// Maps a raw driver error onto the engine taxonomy. The underlying crate
/// reports everything as strings, so this is a best-effort classification;
/// anything unrecognized stays a generic driver error.
fn classify_action_error(locator: &Locator, message: &str) -> AppError {
    let lower = message.to_lowercase();
    if lower.contains("timed out") || lower.contains("timeout") {
        AppError::Timeout(locator.to_string())
    } else if lower.contains("no element") || lower.contains("not found") {
        AppError::ElementNotFound {
            selector: locator.to_string(),
        }
    } else if lower.contains("not visible")
        || lower.contains("not clickable")
        || lower.contains("intercept")
        || lower.contains("not an htmlelement")
    {
        AppError::ElementBlocked {
            selector: locator.to_string(),
        }
    } else if lower.contains("node") && lower.contains("id") {
        AppError::NavigationStale(format!("{locator}: {message}"))
    } else {
        AppError::Driver(format!("{locator}: {message}"))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::Locator;

    #[test]
    fn test_timeout_classification() {
        let locator = Locator::css("#side");
        let err = classify_action_error(&locator, "operation timed out");
        assert!(matches!(err, AppError::Timeout(_)));
    }

    #[test]
    fn test_intercepted_click_classification() {
        let locator = Locator::css("span[title='+55 85 98164-7142']");
        let err = classify_action_error(&locator, "Node is either not visible or not an HTMLElement");
        assert!(matches!(err, AppError::ElementBlocked { .. }));
    }

    #[test]
    fn test_missing_element_classification() {
        let locator = Locator::xpath("//div[@title='New chat']");
        let err = classify_action_error(&locator, "No element found for selector");
        assert!(matches!(err, AppError::ElementNotFound { .. }));
    }

    #[test]
    fn test_unknown_errors_stay_generic() {
        let locator = Locator::css("#main");
        let err = classify_action_error(&locator, "websocket connection dropped");
        assert!(matches!(err, AppError::Driver(_)));
    }
}
