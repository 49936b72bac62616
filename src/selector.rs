use std::fmt;
use std::time::Duration;

use crate::driver::PageDriver;
use crate::utils::error::{AppError, Result};

/// Locator strategy. The driver resolves CSS through the query engine and
/// XPath through document evaluation; both address the same DOM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Css,
    XPath,
}

/// One strategy+expression pair for locating a UI element. Several locators
/// for the same logical element form an ordered fallback chain: earlier
/// entries are the current/semantic selectors, later entries are legacy or
/// positional fallbacks kept for resilience against partial site changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub strategy: Strategy,
    pub expression: String,
}

impl Locator {
    pub fn css(expression: impl Into<String>) -> Self {
        Self {
            strategy: Strategy::Css,
            expression: expression.into(),
        }
    }

    pub fn xpath(expression: impl Into<String>) -> Self {
        Self {
            strategy: Strategy::XPath,
            expression: expression.into(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.strategy {
            Strategy::Css => write!(f, "css:{}", self.expression),
            Strategy::XPath => write!(f, "xpath:{}", self.expression),
        }
    }
}

/// Resolves one logical element against an ordered candidate chain.
///
/// Each candidate gets a bounded wait; the first that resolves wins and no
/// further candidates are attempted. Returns `ElementNotFound` only after
/// the whole chain is exhausted; callers decide whether that is a skip or
/// an abort.
pub fn resolve_first<'a>(
    driver: &dyn PageDriver,
    candidates: &'a [Locator],
    timeout: Duration,
) -> Result<&'a Locator> {
    for candidate in candidates {
        match driver.wait_for(candidate, timeout) {
            Ok(()) => {
                tracing::debug!("resolved via {candidate}");
                return Ok(candidate);
            }
            Err(e) => {
                tracing::debug!("candidate {candidate} failed: {e}");
            }
        }
    }
    Err(AppError::ElementNotFound {
        selector: candidates
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" | "),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testkit::FakeDriver;

    fn chain() -> Vec<Locator> {
        vec![
            Locator::css("[aria-label='New chat']"),
            Locator::css("[data-testid='new-chat-button']"),
            Locator::xpath("//div[@title='New chat']"),
        ]
    }

    #[test]
    fn test_last_candidate_wins_after_earlier_failures() {
        let driver = FakeDriver::new();
        driver.add_present("//div[@title='New chat']");

        let candidates = chain();
        let resolved = resolve_first(&driver, &candidates, Duration::from_millis(10)).unwrap();
        assert_eq!(resolved, &candidates[2]);
        // All three were attempted, in order
        assert_eq!(
            driver.actions(),
            vec![
                "wait:[aria-label='New chat']",
                "wait:[data-testid='new-chat-button']",
                "wait://div[@title='New chat']",
            ]
        );
    }

    #[test]
    fn test_resolution_stops_at_first_success() {
        let driver = FakeDriver::new();
        driver.add_present("[aria-label='New chat']");
        driver.add_present("[data-testid='new-chat-button']");

        let candidates = chain();
        let resolved = resolve_first(&driver, &candidates, Duration::from_millis(10)).unwrap();
        assert_eq!(resolved, &candidates[0]);
        assert_eq!(driver.actions(), vec!["wait:[aria-label='New chat']"]);
    }

    #[test]
    fn test_exhausted_chain_is_not_found() {
        let driver = FakeDriver::new();
        let candidates = chain();

        let err = resolve_first(&driver, &candidates, Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, AppError::ElementNotFound { .. }));
        assert_eq!(driver.actions().len(), 3);
    }
}
