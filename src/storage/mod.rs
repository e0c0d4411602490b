use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{NotifierError, Result};
use crate::parser::{ListingRecord, MatchRecord};

/// Per-site history of every match already reported.
///
/// Serialises as a plain JSON object mapping site url to an array of
/// `{title, date, link}` objects. The history only ever grows.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct MatchHistory {
    sites: BTreeMap<String, Vec<MatchRecord>>,
}

impl MatchHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn matches_for(&self, url: &str) -> &[MatchRecord] {
        self.sites.get(url).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Appends every candidate not yet recorded for `url` and returns those,
    /// in candidate order. A candidate repeated within the batch is only
    /// returned once.
    pub fn record_new(&mut self, url: &str, candidates: Vec<MatchRecord>) -> Vec<MatchRecord> {
        let seen = self.sites.entry(url.to_string()).or_default();
        let mut new_matches = Vec::new();

        for candidate in candidates {
            if seen.contains(&candidate) {
                debug!("Already reported: {}", candidate.title);
                continue;
            }
            info!("New match for {}: {}", url, candidate.title);
            seen.push(candidate.clone());
            new_matches.push(candidate);
        }

        new_matches
    }

    pub fn site_count(&self) -> usize {
        self.sites.len()
    }

    pub fn total_matches(&self) -> usize {
        self.sites.values().map(Vec::len).sum()
    }
}

#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn load(&self) -> Result<MatchHistory>;
    async fn persist(&self, history: &MatchHistory) -> Result<()>;
}

/// Match history kept in a single JSON file, rewritten in full on persist.
pub struct JsonMatchStore {
    path: PathBuf,
}

impl JsonMatchStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl MatchStore for JsonMatchStore {
    async fn load(&self) -> Result<MatchHistory> {
        if !self.path.exists() {
            info!("No match history at {}, starting empty", self.path.display());
            return Ok(MatchHistory::new());
        }

        let content = fs::read_to_string(&self.path)
            .map_err(|e| NotifierError::StorageError(format!("Failed to read {}: {}", self.path.display(), e)))?;
        let history: MatchHistory = serde_json::from_str(&content)
            .map_err(|e| NotifierError::StorageError(format!("Corrupt match history {}: {}", self.path.display(), e)))?;

        info!(
            "Loaded match history: {} site(s), {} match(es)",
            history.site_count(),
            history.total_matches()
        );
        Ok(history)
    }

    async fn persist(&self, history: &MatchHistory) -> Result<()> {
        write_json_atomically(&self.path, history)?;
        debug!("Persisted {} match(es) to {}", history.total_matches(), self.path.display());
        Ok(())
    }
}

/// Raw extraction output of one run, kept for auditing and never read back.
///
/// Serialises as one flat JSON array of `{title, link}` objects, all sites
/// concatenated in configuration order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ExtractionSnapshot {
    records: Vec<ListingRecord>,
}

impl ExtractionSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_records(&mut self, records: &[ListingRecord]) {
        self.records.extend(records.iter().cloned());
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        write_json_atomically(path, self)?;
        debug!("Wrote {} extracted record(s) to {}", self.record_count(), path.display());
        Ok(())
    }
}

// write to a sibling temp file, then rename over the target
fn write_json_atomically<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| NotifierError::StorageError(format!("Failed to create directory: {}", e)))?;
        }
    }

    let json = serde_json::to_string_pretty(value)
        .map_err(|e| NotifierError::StorageError(format!("JSON serialization failed: {}", e)))?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| NotifierError::StorageError(format!("Invalid file path: {}", path.display())))?;
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

    fs::write(&tmp_path, json)
        .map_err(|e| NotifierError::StorageError(format!("Failed to write {}: {}", tmp_path.display(), e)))?;
    fs::rename(&tmp_path, path)
        .map_err(|e| NotifierError::StorageError(format!("Failed to replace {}: {}", path.display(), e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const URL: &str = "https://www.service.bund.de/ausschreibungen";

    fn matched(title: &str, link: &str) -> MatchRecord {
        MatchRecord::from(&ListingRecord::new(title, link))
    }

    #[test]
    fn test_record_new_on_empty_history() {
        let mut history = MatchHistory::new();
        let new = history.record_new(URL, vec![matched("Verpflegung Los 1", "http://x/1")]);

        assert_eq!(new.len(), 1);
        assert_eq!(history.matches_for(URL), new.as_slice());
        assert_eq!(history.site_count(), 1);
    }

    #[test]
    fn test_record_new_is_idempotent() {
        let mut history = MatchHistory::new();
        let candidates = vec![matched("Kantine", "http://x/1"), matched("Hotel", "http://x/2")];

        assert_eq!(history.record_new(URL, candidates.clone()).len(), 2);
        let before = history.clone();
        assert!(history.record_new(URL, candidates).is_empty());
        assert_eq!(history, before);
    }

    #[test]
    fn test_new_iff_not_structurally_present() {
        let mut history = MatchHistory::new();
        history.record_new(URL, vec![matched("Kantine", "http://x/1")]);

        // same title, different link is a different record
        let new = history.record_new(
            URL,
            vec![matched("Kantine", "http://x/1"), matched("Kantine", "http://x/9")],
        );
        assert_eq!(new, vec![matched("Kantine", "http://x/9")]);

        // same record under another site is new there
        let new = history.record_new("https://other.example", vec![matched("Kantine", "http://x/1")]);
        assert_eq!(new.len(), 1);
        assert_eq!(history.total_matches(), 3);
    }

    #[test]
    fn test_duplicates_within_batch_reported_once() {
        let mut history = MatchHistory::new();
        let dup = matched("Speise", "http://x/3");

        let new = history.record_new(URL, vec![dup.clone(), dup.clone()]);

        assert_eq!(new, vec![dup]);
        assert_eq!(history.matches_for(URL).len(), 1);
    }

    #[test]
    fn test_empty_candidates_still_initialise_site() {
        let mut history = MatchHistory::new();
        assert!(history.record_new(URL, Vec::new()).is_empty());
        assert_eq!(serde_json::to_value(&history).unwrap(), serde_json::json!({ URL: [] }));
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let temp_dir = tempdir().unwrap();
        let store = JsonMatchStore::new(temp_dir.path().join("matches.json"));

        let history = store.load().await.unwrap();
        assert_eq!(history, MatchHistory::new());
    }

    #[tokio::test]
    async fn test_persist_and_reload() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("state").join("matches.json");
        let store = JsonMatchStore::new(path.clone());

        let mut history = MatchHistory::new();
        history.record_new(URL, vec![matched("Verpflegung Los 1", "http://x/1")]);
        store.persist(&history).await.unwrap();

        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            raw,
            serde_json::json!({
                URL: [{"title": "Verpflegung Los 1", "date": "No Date", "link": "http://x/1"}]
            })
        );

        let reloaded = store.load().await.unwrap();
        assert_eq!(reloaded, history);
        // no temp file left behind
        assert_eq!(fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_storage_error() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("matches.json");
        fs::write(&path, "{ not json").unwrap();

        let err = JsonMatchStore::new(path).load().await.unwrap_err();
        let err = err.downcast::<NotifierError>().unwrap();
        assert!(matches!(*err, NotifierError::StorageError(_)));
    }

    #[test]
    fn test_snapshot_written_as_json() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("extracted_text_parts.json");

        let mut snapshot = ExtractionSnapshot::new();
        snapshot.add_records(&[ListingRecord::new("Essen", "http://x/1")]);
        snapshot.add_records(&[]);
        snapshot.add_records(&[ListingRecord::new("Hotel", "http://y/2")]);
        snapshot.write_to(&path).unwrap();

        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            raw,
            serde_json::json!([
                {"title": "Essen", "link": "http://x/1"},
                {"title": "Hotel", "link": "http://y/2"}
            ])
        );
        assert_eq!(snapshot.record_count(), 2);
    }
}
