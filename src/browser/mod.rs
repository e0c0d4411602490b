pub mod manager;
pub mod page;


pub use manager::{BrowserSession, ChromePageSource};
pub use page::{PageSource, RenderedPage};
