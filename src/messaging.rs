use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::config::RunConfig;
use crate::selector::resolve_first;
use crate::session::SessionController;
use crate::sites::messaging;
use crate::utils::error::{AppError, Result};
use crate::utils::logger::EventLog;
use crate::utils::phone::Contact;

const COMPONENT: &str = "MessagingAgent";

const ELEMENT_WAIT: Duration = Duration::from_secs(10);
const LOADED_WAIT: Duration = Duration::from_secs(15);
/// The search panel animates the result row in; clicking immediately lands
/// on the wrong element.
const PRE_CLICK_PAUSE: Duration = Duration::from_secs(1);
const INTER_LINE_PAUSE: Duration = Duration::from_secs(1);
const RECOVER_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// A matching confirmation was already in the chat today.
    AlreadyConfirmed,
    /// The stop signal arrived before the contact was processed.
    Aborted,
}

/// Per-contact chat flow: `Search -> Open -> Done`, with the recovery
/// excursion taken on an intercepted click (after one positional retry) or
/// a timeout. Keeping the transitions in one enum makes the retry policy
/// auditable.
enum ChatStep {
    Search,
    Open { fallback_used: bool },
    Recover,
    Done,
}

/// Composes and sends the templated confirmation into the active chat of
/// the messaging site, and checks whether a matching automated message was
/// already sent today in the open conversation.
pub struct MessagingAgent {
    session: SessionController,
    config: RunConfig,
    log: EventLog,
    stop: Arc<AtomicBool>,
}

impl MessagingAgent {
    pub fn new(
        session: SessionController,
        config: RunConfig,
        log: EventLog,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            session,
            config,
            log,
            stop,
        }
    }

    pub fn shutdown(&mut self) {
        self.session.stop();
    }

    /// Opens (or verifies) the chat for the contact and sends the
    /// configured message unless one was already sent today.
    ///
    /// Any error out of here is caught at the poller boundary; the contact
    /// counts as attempted either way. At most one attempt per contact per
    /// day outranks guaranteed delivery.
    pub fn confirm_order(&mut self, contact: &Contact) -> Result<SendOutcome> {
        if self.stop.load(Ordering::Relaxed) {
            return Ok(SendOutcome::Aborted);
        }
        self.ensure_loaded()?;
        self.open_chat(contact)?;
        thread::sleep(PRE_CLICK_PAUSE);

        if self.config.verify_existing_message {
            if self.has_existing_message_today() {
                self.log.success(
                    &format!("{} confirmation already in chat", contact.raw_digits),
                    COMPONENT,
                );
                return Ok(SendOutcome::AlreadyConfirmed);
            }
        } else {
            self.log.success(
                &format!("{} message check disabled", contact.raw_digits),
                COMPONENT,
            );
        }

        self.send_lines()?;
        self.log
            .success(&format!("{} message sent", contact.raw_digits), COMPONENT);
        Ok(SendOutcome::Sent)
    }

    /// The messaging page must still be past login before any chat work;
    /// a missing ready marker means the session silently dropped.
    fn ensure_loaded(&self) -> Result<()> {
        let driver = self.session.driver()?;
        resolve_first(driver, &self.session.site().ready_markers, LOADED_WAIT)
            .map(|_| ())
            .map_err(|_| {
                AppError::NavigationStale(format!("{} not loaded", self.session.site().name))
            })
    }

    fn open_chat(&mut self, contact: &Contact) -> Result<()> {
        let mut step = ChatStep::Search;
        loop {
            step = match step {
                ChatStep::Search => self.step_search(contact)?,
                ChatStep::Open { fallback_used } => self.step_open(contact, fallback_used)?,
                ChatStep::Recover => {
                    self.recover()?;
                    return Err(AppError::NavigationStale(format!(
                        "chat for {} not opened",
                        contact.raw_digits
                    )));
                }
                ChatStep::Done => return Ok(()),
            };
        }
    }

    /// ChatSearch: open the new-conversation panel and type the contact.
    fn step_search(&mut self, contact: &Contact) -> Result<ChatStep> {
        let driver = self.session.driver()?;

        let new_chat_chain = messaging::new_chat_candidates();
        let new_chat = resolve_first(driver, &new_chat_chain, ELEMENT_WAIT)?;
        driver.click(new_chat)?;
        self.log
            .success(&format!("{} new chat clicked", contact.raw_digits), COMPONENT);

        let search_chain = messaging::search_box_candidates();
        match resolve_first(driver, &search_chain, ELEMENT_WAIT) {
            Ok(search_box) => {
                driver.type_text(search_box, &contact.formatted)?;
                self.log.success(
                    &format!("{} search box filled", contact.raw_digits),
                    COMPONENT,
                );
            }
            // The panel sometimes opens pre-focused; the typed query is
            // only a narrowing aid, so a missing box is not fatal here.
            Err(e) => self
                .log
                .error(&format!("search box: {e}"), COMPONENT),
        }
        Ok(ChatStep::Open {
            fallback_used: false,
        })
    }

    /// ChatOpen: click the result row matched by exact display name. An
    /// intercepted click gets one retry through the positional locator;
    /// anything else goes through recovery.
    fn step_open(&mut self, contact: &Contact, fallback_used: bool) -> Result<ChatStep> {
        let row = if fallback_used {
            messaging::chat_row_fallback()
        } else {
            messaging::chat_row(&contact.formatted)
        };
        let driver = self.session.driver()?;

        if driver.wait_for(&row, ELEMENT_WAIT).is_err() {
            self.log
                .error(&format!("{} chat row not found", contact.raw_digits), COMPONENT);
            return Ok(ChatStep::Recover);
        }
        thread::sleep(PRE_CLICK_PAUSE);
        match driver.click(&row) {
            Ok(()) => {
                self.log
                    .success(&format!("{} chat clicked", contact.raw_digits), COMPONENT);
                Ok(ChatStep::Done)
            }
            Err(AppError::ElementBlocked { .. }) if !fallback_used => {
                tracing::debug!("row click intercepted, retrying positional locator");
                Ok(ChatStep::Open {
                    fallback_used: true,
                })
            }
            Err(e) => {
                self.log
                    .error(&format!("{} chat click: {e}", contact.raw_digits), COMPONENT);
                Ok(ChatStep::Recover)
            }
        }
    }

    /// Leaves the search panel in a usable state: back out if the control
    /// is there, otherwise re-navigate to the site root and wait for the
    /// ready marker (or the stop signal).
    fn recover(&mut self) -> Result<()> {
        {
            let driver = self.session.driver()?;
            let back = messaging::back_button();
            if driver.wait_for(&back, ELEMENT_WAIT).is_ok() && driver.click(&back).is_ok() {
                self.log.success("backed out of search panel", COMPONENT);
                return Ok(());
            }
        }
        self.log
            .error("back control missing, re-navigating", COMPONENT);

        let url = self.session.site().url;
        self.session.driver_mut()?.navigate(url)?;
        loop {
            if self.stop.load(Ordering::Relaxed) {
                return Ok(());
            }
            let driver = self.session.driver()?;
            if resolve_first(
                driver,
                &self.session.site().ready_markers,
                RECOVER_POLL_INTERVAL,
            )
            .is_ok()
            {
                self.log.success("messaging page recovered", COMPONENT);
                return Ok(());
            }
            thread::sleep(RECOVER_POLL_INTERVAL);
        }
    }

    /// Scans the open conversation for a confirmation sent today. Only the
    /// contiguous tail from the first `TODAY` day-separator counts; within
    /// it a confirmation is the order-code phrase next to the platform
    /// domain or the configured title. A scan failure reads as "nothing
    /// found", leaving the send path available.
    pub fn has_existing_message_today(&self) -> bool {
        let driver = match self.session.driver() {
            Ok(driver) => driver,
            Err(_) => return false,
        };
        let bubbles = messaging::message_bubbles();
        let texts = match driver.inner_texts(&bubbles) {
            Ok(texts) => texts,
            Err(e) => {
                self.log
                    .error(&format!("message scan failed: {e}"), COMPONENT);
                return false;
            }
        };
        tracing::debug!("scanning {} bubbles for today's confirmation", texts.len());

        for text in &texts {
            let Some(index) = text.find(messaging::TODAY_MARKER) else {
                continue;
            };
            let today_tail = &text[index..];
            if !today_tail.contains(messaging::ORDER_CODE_MARKER) {
                continue;
            }
            let title = &self.config.message_title;
            if today_tail.contains(messaging::PLATFORM_DOMAIN)
                || (!title.is_empty() && today_tail.contains(title))
            {
                return true;
            }
        }
        false
    }

    /// Sends the configured message line by line: locate the input box
    /// through its fallback chain, click, clear, type, submit, pause.
    fn send_lines(&self) -> Result<()> {
        let message_box_chain = messaging::message_box_candidates();
        for line in &self.config.message_lines {
            let driver = self.session.driver()?;
            let message_box = resolve_first(driver, &message_box_chain, ELEMENT_WAIT)?;
            driver.click(message_box)?;
            driver.clear(message_box)?;
            driver.type_text(message_box, line)?;
            driver.press_enter(message_box)?;
            thread::sleep(INTER_LINE_PAUSE);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Paths, Settings};
    use crate::driver::testkit::{FakeDriver, FakeFactory};
    use crate::sites::Site;
    use crate::utils::phone::extract_from_line;

    const ROW: &str = "//span[@title=\"+55 85 98164-7142\"]";
    const MSG_BOX: &str = "div[contenteditable=\"true\"][data-tab=\"10\"]";

    fn contact() -> Contact {
        extract_from_line("Order #4 (85) 98164-7142").unwrap()
    }

    fn chat_ready_driver() -> FakeDriver {
        let driver = FakeDriver::new();
        driver.add_present("#side");
        driver.add_present("[aria-label=\"Nova conversa\"]");
        driver.add_present("[aria-label=\"Pesquisar nome ou número\"]");
        driver.add_present(ROW);
        driver.add_present(MSG_BOX);
        driver.set_texts(".copyable-area", vec![]);
        driver
    }

    fn agent_with(driver: FakeDriver, settings: Settings) -> MessagingAgent {
        let paths = Paths::new(std::env::temp_dir().join("confirma-bot-test"));
        let factory = Arc::new(FakeFactory::new(vec![Ok(driver)]));
        let stop = Arc::new(AtomicBool::new(false));
        let config = settings.to_run_config();
        let mut session = SessionController::new(
            Site::messaging(&paths),
            factory,
            EventLog::disabled(),
            stop.clone(),
        );
        session.launch(&config).unwrap();
        MessagingAgent::new(session, config, EventLog::disabled(), stop)
    }

    fn settings() -> Settings {
        Settings {
            msg_title: "Beruchy Hamburgueria Delivery".to_string(),
            automatic_msg: "Recebemos o seu pedido.".to_string(),
            ..Settings::default()
        }
    }

    #[test]
    fn test_sends_when_no_confirmation_today() {
        let driver = chat_ready_driver();
        let mut agent = agent_with(driver.clone(), settings());

        let outcome = agent.confirm_order(&contact()).unwrap();
        assert_eq!(outcome, SendOutcome::Sent);

        let actions = driver.actions();
        assert!(actions.contains(&format!("type:{MSG_BOX}:Recebemos o seu pedido.")));
        assert!(actions.contains(&format!("enter:{MSG_BOX}")));
    }

    #[test]
    fn test_existing_confirmation_suppresses_send() {
        let driver = chat_ready_driver();
        driver.set_texts(
            ".copyable-area",
            vec!["ONTEM\nolá\nHOJE\nCódigo do pedido: wsG4X\nwww.whatsmenu.com.br"],
        );
        let mut agent = agent_with(driver.clone(), settings());

        let outcome = agent.confirm_order(&contact()).unwrap();
        assert_eq!(outcome, SendOutcome::AlreadyConfirmed);
        assert!(
            driver.actions().iter().all(|a| !a.starts_with("type:div")),
            "send must not run"
        );
    }

    #[test]
    fn test_yesterdays_confirmation_does_not_count() {
        let driver = chat_ready_driver();
        driver.set_texts(
            ".copyable-area",
            vec!["Código do pedido: wsG4X\nwww.whatsmenu.com.br\nHOJE\noi"],
        );
        let mut agent = agent_with(driver.clone(), settings());

        let outcome = agent.confirm_order(&contact()).unwrap();
        assert_eq!(outcome, SendOutcome::Sent);
    }

    #[test]
    fn test_title_match_counts_without_domain() {
        let driver = chat_ready_driver();
        driver.set_texts(
            ".copyable-area",
            vec!["HOJE\nCódigo do pedido: wsG4X\nBeruchy Hamburgueria Delivery"],
        );
        let mut agent = agent_with(driver.clone(), settings());

        let outcome = agent.confirm_order(&contact()).unwrap();
        assert_eq!(outcome, SendOutcome::AlreadyConfirmed);
    }

    #[test]
    fn test_empty_title_never_matches_alone() {
        let driver = chat_ready_driver();
        driver.set_texts(".copyable-area", vec!["HOJE\nCódigo do pedido: wsG4X"]);
        let mut config = settings();
        config.msg_title = String::new();
        let mut agent = agent_with(driver.clone(), config);

        let outcome = agent.confirm_order(&contact()).unwrap();
        assert_eq!(outcome, SendOutcome::Sent);
    }

    #[test]
    fn test_check_disabled_skips_scan() {
        let driver = chat_ready_driver();
        driver.set_texts(
            ".copyable-area",
            vec!["HOJE\nCódigo do pedido: wsG4X\nwww.whatsmenu.com.br"],
        );
        let mut config = settings();
        config.check_messages = false;
        let mut agent = agent_with(driver.clone(), config);

        let outcome = agent.confirm_order(&contact()).unwrap();
        assert_eq!(outcome, SendOutcome::Sent);
        assert!(
            driver.actions().iter().all(|a| !a.starts_with("texts:")),
            "bubble scan must not run when disabled"
        );
    }

    #[test]
    fn test_intercepted_row_click_retries_positional_locator() {
        let driver = chat_ready_driver();
        driver.block_next_click(ROW);
        driver.add_present(
            "//*[@id=\"app\"]/div/div[3]/div/div[2]/div[1]/span/div/span/div/div[2]/div[3]/div[2]/div[1]/div/span",
        );
        let mut agent = agent_with(driver.clone(), settings());

        let outcome = agent.confirm_order(&contact()).unwrap();
        assert_eq!(outcome, SendOutcome::Sent);

        let clicks: Vec<_> = driver
            .actions()
            .into_iter()
            .filter(|a| a.starts_with("click://"))
            .collect();
        assert_eq!(clicks.len(), 2, "titled row then positional fallback");
    }

    #[test]
    fn test_missing_row_recovers_and_skips_contact() {
        let driver = chat_ready_driver();
        driver.remove_present(ROW);
        // No back control either: full re-navigation path
        let mut agent = agent_with(driver.clone(), settings());

        let err = agent.confirm_order(&contact()).unwrap_err();
        assert!(matches!(err, AppError::NavigationStale(_)));
        assert!(err.is_recoverable());
        assert!(
            driver
                .actions()
                .contains(&"navigate:https://web.whatsapp.com/".to_string())
        );
    }

    #[test]
    fn test_stop_aborts_before_any_chat_work() {
        let driver = chat_ready_driver();
        let mut agent = agent_with(driver.clone(), settings());
        agent.stop.store(true, Ordering::Relaxed);

        let outcome = agent.confirm_order(&contact()).unwrap();
        assert_eq!(outcome, SendOutcome::Aborted);
        assert!(driver.actions().iter().all(|a| !a.starts_with("click:")));
    }
}
