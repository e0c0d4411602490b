use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::browser::PageSource;
use crate::config::{Config, SiteConfig};
use crate::error::{NotifierError, Result};
use crate::filter::KeywordFilter;
use crate::notifier::NotificationManager;
use crate::parser::{ListingExtractor, ListingRecord, MatchRecord};
use crate::storage::{ExtractionSnapshot, MatchHistory, MatchStore};

/// Outcome of one full check across all configured sites.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub sites_checked: usize,
    pub records_extracted: usize,
    pub matches_found: usize,
    pub new_matches: usize,
    pub notifications_delivered: usize,
}

/// Drives page source, extractor, filter, match store and notifier for a
/// single pass over the configured sites.
pub struct TenderMonitor<P: PageSource, S: MatchStore> {
    sites: Vec<SiteConfig>,
    extracted_file: PathBuf,
    extractor: ListingExtractor,
    source: P,
    store: S,
    notifications: NotificationManager,
}

impl<P: PageSource, S: MatchStore> TenderMonitor<P, S> {
    pub fn new(config: &Config, source: P, store: S, notifications: NotificationManager) -> Result<Self> {
        let extractor = ListingExtractor::new(&config.browser.result_selector)?;

        Ok(Self {
            sites: config.sites.clone(),
            extracted_file: config.storage.extracted_file.clone(),
            extractor,
            source,
            store,
            notifications,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn run_once(&self) -> Result<RunSummary> {
        let mut history = self.store.load().await?;
        let mut snapshot = ExtractionSnapshot::new();
        let mut summary = RunSummary::default();
        let mut new_matches = Vec::new();

        for site in &self.sites {
            let records = self.scrape_site(&site.url).await?;
            snapshot.add_records(&records);

            let (found, fresh) = check_site(&mut history, site, &records);
            summary.sites_checked += 1;
            summary.records_extracted += records.len();
            summary.matches_found += found;
            new_matches.extend(fresh);
        }

        snapshot.write_to(&self.extracted_file)?;

        summary.new_matches = new_matches.len();
        if new_matches.is_empty() {
            info!("No new matches this run");
        } else {
            info!("{} new match(es), sending notification", new_matches.len());
            summary.notifications_delivered = self.notifications.notify(&new_matches).await;
            if summary.notifications_delivered == 0 {
                // matches stay recorded; they will not be sent again
                warn!("No notification delivered for {} new match(es)", new_matches.len());
            }
        }

        self.store.persist(&history).await?;

        info!(
            "Run finished: {} site(s), {} record(s), {} match(es), {} new",
            summary.sites_checked, summary.records_extracted, summary.matches_found, summary.new_matches
        );
        Ok(summary)
    }

    // page failures degrade to an empty listing unless the error is one the
    // next site cannot recover from either (storage, config)
    async fn scrape_site(&self, url: &str) -> Result<Vec<ListingRecord>> {
        match self.source.load(url).await {
            Ok(page) => Ok(self.extractor.extract(&page)),
            Err(e) => match e.downcast_ref::<NotifierError>() {
                Some(err) if !err.is_recoverable() => {
                    error!("Unrecoverable error while loading {}: {}", url, e);
                    Err(e)
                }
                _ => {
                    error!("Error loading the page {}: {}", url, e);
                    Ok(Vec::new())
                }
            },
        }
    }
}

/// Filters `records` for `site` and records them in `history`.
/// Returns the number of keyword matches and the ones not seen before.
pub fn check_site(
    history: &mut MatchHistory,
    site: &SiteConfig,
    records: &[ListingRecord],
) -> (usize, Vec<MatchRecord>) {
    let filter = KeywordFilter::new(&site.keywords);
    let matches = filter.filter(records);
    let found = matches.len();
    let fresh = history.record_new(&site.url, matches);
    (found, fresh)
}
