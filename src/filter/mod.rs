use tracing::{debug, info};

use crate::parser::{ListingRecord, MatchRecord};

/// Case-insensitive substring matcher over listing titles.
#[derive(Debug, Clone)]
pub struct KeywordFilter {
    keywords: Vec<String>,
}

impl KeywordFilter {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        // a blank keyword would match every title; padding is kept as typed
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().to_lowercase())
            .filter(|k| !k.trim().is_empty())
            .collect();

        Self { keywords }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn matches(&self, title: &str) -> bool {
        let title = title.to_lowercase();
        self.keywords.iter().any(|keyword| title.contains(keyword.as_str()))
    }

    pub fn filter(&self, records: &[ListingRecord]) -> Vec<MatchRecord> {
        let matches: Vec<MatchRecord> = records
            .iter()
            .filter(|record| self.matches(&record.title))
            .inspect(|record| debug!("Relevant match found: {}", record.title))
            .map(MatchRecord::from)
            .collect();

        info!("{} of {} listing(s) matched keywords", matches.len(), records.len());
        matches
    }
}
