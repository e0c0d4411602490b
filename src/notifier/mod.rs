pub mod email;

use crate::error::Result;
use crate::parser::MatchRecord;

pub use email::EmailNotifier;

pub const BODY_HEADER: &str = "Die folgenden neuen Übereinstimmungen wurden gefunden:";

#[async_trait::async_trait]
pub trait NotificationProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn send_matches(&self, matches: &[MatchRecord]) -> Result<()>;
}

/// Plain-text summary listing each match's title and link.
pub fn compose_body(matches: &[MatchRecord]) -> String {
    let mut body = format!("{}\n\n", BODY_HEADER);
    for m in matches {
        body.push_str(&format!("Title: {}\nLink: {}\n\n", m.title, m.link));
    }
    body
}

pub struct NotificationManager {
    providers: Vec<Box<dyn NotificationProvider>>,
}

impl NotificationManager {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    pub fn add_provider(&mut self, provider: Box<dyn NotificationProvider>) {
        self.providers.push(provider);
    }

    /// Returns how many providers delivered. Failures are only logged.
    pub async fn notify(&self, matches: &[MatchRecord]) -> usize {
        if matches.is_empty() {
            tracing::debug!("No new matches, nothing to send");
            return 0;
        }

        let mut delivered = 0;
        for provider in &self.providers {
            match provider.send_matches(matches).await {
                Ok(()) => {
                    tracing::info!("{} notified about {} new match(es)", provider.name(), matches.len());
                    delivered += 1;
                }
                Err(e) => tracing::error!("Failed to send {} notification: {}", provider.name(), e),
            }
        }
        delivered
    }
}

impl Default for NotificationManager {
    fn default() -> Self {
        Self::new()
    }
}
