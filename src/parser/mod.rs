pub mod html_parser;
pub mod listing;

pub use html_parser::ListingExtractor;
pub use listing::*;
