use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::config::RunConfig;
use crate::dedup::DedupStore;
use crate::messaging::MessagingAgent;
use crate::selector::resolve_first;
use crate::session::SessionController;
use crate::sites;
use crate::utils::error::Result;
use crate::utils::logger::EventLog;
use crate::utils::phone::{Contact, extract_from_line};

const COMPONENT: &str = "OrderPoller";

/// Fixed cadence of the dashboard scan; the stop flag is observed at the
/// top of every tick.
const TICK: Duration = Duration::from_secs(1);

/// Bounded wait for the dashboard row list on each scan.
const ROWS_WAIT: Duration = Duration::from_secs(6);

/// Continuously scans the orders dashboard for contact rows, rate-limits
/// and deduplicates outbound contact attempts, and hands each new contact
/// to the messaging agent. Contacts are processed strictly one at a time.
pub struct OrderPoller {
    session: SessionController,
    agent: MessagingAgent,
    store: DedupStore,
    config: RunConfig,
    log: EventLog,
    stop: Arc<AtomicBool>,
}

impl OrderPoller {
    pub fn new(
        session: SessionController,
        agent: MessagingAgent,
        store: DedupStore,
        config: RunConfig,
        log: EventLog,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            session,
            agent,
            store,
            config,
            log,
            stop,
        }
    }

    pub fn store(&self) -> &DedupStore {
        &self.store
    }

    /// Runs until the stop signal is raised or a dashboard scan fails
    /// unrecoverably. Per-contact failures never end the loop.
    pub fn run(&mut self) {
        self.log.success("order polling started", COMPONENT);
        loop {
            if self.stop.load(Ordering::Relaxed) {
                break;
            }
            thread::sleep(TICK);
            if let Err(e) = self.poll_once() {
                self.log
                    .error(&format!("dashboard scan failed: {e}"), COMPONENT);
                tracing::error!("order polling aborted: {e}");
                break;
            }
        }
        self.log.success("order polling stopped", COMPONENT);
    }

    /// One dashboard pass: re-resolve the row set, extract contact keys,
    /// and process whichever are new today.
    pub fn poll_once(&mut self) -> Result<()> {
        let rows = {
            let driver = self.session.driver()?;
            let row_locator = sites::orders::order_rows();
            let chain = std::slice::from_ref(&row_locator);
            resolve_first(driver, chain, ROWS_WAIT)?;
            driver.inner_texts(&row_locator)?
        };

        for row in &rows {
            for line in row.lines() {
                let Some(contact) = extract_from_line(line) else {
                    continue;
                };
                if self.store.contains(&contact.raw_digits) {
                    continue;
                }
                if self.stop.load(Ordering::Relaxed) {
                    return Ok(());
                }
                self.process(&contact)?;
            }
        }
        Ok(())
    }

    /// Throttle, attempt, record. Recording is unconditional once an
    /// attempt starts: whether the send succeeds, fails or is skipped, the
    /// key lands in the store and the contact is done for today.
    fn process(&mut self, contact: &Contact) -> Result<()> {
        self.throttle();
        if self.stop.load(Ordering::Relaxed) {
            return Ok(());
        }

        match self.agent.confirm_order(contact) {
            Ok(outcome) => {
                tracing::info!(contact = %contact.raw_digits, ?outcome, "contact processed");
            }
            Err(e) => {
                self.log.error(
                    &format!("{} confirmation failed: {e}", contact.raw_digits),
                    COMPONENT,
                );
            }
        }
        self.store.record(&contact.raw_digits)?;
        Ok(())
    }

    /// Waits `poll_delay` before contacting, one second at a time so the
    /// stop signal is never ignored for long.
    fn throttle(&self) {
        let mut remaining = self.config.poll_delay;
        while !remaining.is_zero() {
            if self.stop.load(Ordering::Relaxed) {
                return;
            }
            let step = remaining.min(TICK);
            thread::sleep(step);
            remaining -= step;
        }
    }

    /// Closes both browser sessions.
    pub fn shutdown(&mut self) {
        self.agent.shutdown();
        self.session.stop();
    }
}
