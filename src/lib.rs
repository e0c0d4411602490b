pub mod browser;
pub mod config;
pub mod error;
pub mod filter;
pub mod monitor;
pub mod notifier;
pub mod parser;
pub mod storage;

pub use error::{NotifierError, Result};
pub use config::Config;
pub use monitor::{RunSummary, TenderMonitor};
pub use browser::{ChromePageSource, PageSource};
