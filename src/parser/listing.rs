use serde::{Deserialize, Serialize};

pub const NO_DATE: &str = "No Date";
pub const NO_LINK: &str = "No Link";

/// A title/link pair scraped from one anchor inside a result container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListingRecord {
    pub title: String,
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl ListingRecord {
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            date: None,
        }
    }

    // both fields must survive trimming
    pub fn is_valid(&self) -> bool {
        !self.title.trim().is_empty() && !self.link.trim().is_empty()
    }
}

/// A listing that passed the keyword filter; the unit stored per site and
/// compared by full equality.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MatchRecord {
    pub title: String,
    pub date: String,
    pub link: String,
}

impl From<&ListingRecord> for MatchRecord {
    fn from(record: &ListingRecord) -> Self {
        let link = if record.link.is_empty() {
            NO_LINK.to_string()
        } else {
            record.link.clone()
        };

        Self {
            title: record.title.clone(),
            date: record.date.clone().unwrap_or_else(|| NO_DATE.to_string()),
            link,
        }
    }
}
