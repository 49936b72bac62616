pub mod config;
pub mod control;
pub mod dedup;
pub mod driver;
pub mod messaging;
pub mod poller;
pub mod selector;
pub mod session;
pub mod sites;
pub mod utils;

// Re-export commonly used types
pub use config::{Paths, RunConfig, Settings};
pub use control::{AutomationController, Status};
pub use dedup::DedupStore;
pub use driver::{ChromeFactory, DriverFactory, PageDriver};
pub use selector::{Locator, Strategy};
pub use session::{SessionController, SessionState};
pub use utils::error::AppError;
pub use utils::logger::EventLog;
pub use utils::phone::Contact;

pub type Result<T> = std::result::Result<T, AppError>;
