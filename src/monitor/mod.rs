pub mod orchestrator;


pub use orchestrator::{check_site, RunSummary, TenderMonitor};
