use async_trait::async_trait;
use chrono::Utc;
use phqscreen_core::{ScreenError, ScreenResult, SessionId, SessionSummary, SummaryListing};
use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::warn;

/// Durable record of closed sessions and their summaries.
///
/// `mark_closed` is the conditional write that makes closing exactly-once
/// even when several service instances share one store.
#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Records that the session is closed. Returns `true` only for the call
    /// that performed the transition.
    async fn mark_closed(&self, session_id: &SessionId) -> ScreenResult<bool>;

    /// Whether the session has been closed.
    async fn is_closed(&self, session_id: &SessionId) -> ScreenResult<bool>;

    /// Stores a summary. Fails with [`ScreenError::SummaryExists`] if the
    /// session already has one.
    async fn insert(&self, summary: &SessionSummary) -> ScreenResult<()>;

    /// The stored summary, if any.
    async fn get(&self, session_id: &SessionId) -> ScreenResult<Option<SessionSummary>>;

    /// All summaries, most recent first.
    async fn list(&self) -> ScreenResult<Vec<SummaryListing>>;
}

fn newest_first(mut listings: Vec<SummaryListing>) -> Vec<SummaryListing> {
    listings.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.session_id.cmp(&b.session_id))
    });
    listings
}

// ---------------------------------------------------------------------------
// InMemorySummaryStore
// ---------------------------------------------------------------------------

/// Summary store kept in process memory.
#[derive(Default)]
pub struct InMemorySummaryStore {
    closed: RwLock<HashSet<SessionId>>,
    summaries: RwLock<HashMap<SessionId, SessionSummary>>,
}

impl InMemorySummaryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SummaryStore for InMemorySummaryStore {
    async fn mark_closed(&self, session_id: &SessionId) -> ScreenResult<bool> {
        Ok(self.closed.write().await.insert(session_id.clone()))
    }

    async fn is_closed(&self, session_id: &SessionId) -> ScreenResult<bool> {
        Ok(self.closed.read().await.contains(session_id))
    }

    async fn insert(&self, summary: &SessionSummary) -> ScreenResult<()> {
        let mut summaries = self.summaries.write().await;
        if summaries.contains_key(&summary.session_id) {
            return Err(ScreenError::SummaryExists(summary.session_id.clone()));
        }
        summaries.insert(summary.session_id.clone(), summary.clone());
        Ok(())
    }

    async fn get(&self, session_id: &SessionId) -> ScreenResult<Option<SessionSummary>> {
        Ok(self.summaries.read().await.get(session_id).cloned())
    }

    async fn list(&self) -> ScreenResult<Vec<SummaryListing>> {
        let listings = self
            .summaries
            .read()
            .await
            .values()
            .map(SessionSummary::listing)
            .collect();
        Ok(newest_first(listings))
    }
}

// ---------------------------------------------------------------------------
// FileSummaryStore
// ---------------------------------------------------------------------------

/// File-based summary store.
///
/// Layout under the root directory:
/// - `closed/<session_id>.closed` — marker created with `create_new`, holding
///   the close time.
/// - `summaries/<session_id>.json` — the summary, hard-linked into place
///   from a staging file so a second insert can never overwrite the first.
pub struct FileSummaryStore {
    closed_dir: PathBuf,
    summaries_dir: PathBuf,
}

impl FileSummaryStore {
    /// Opens (creating if needed) the store rooted at `dir`.
    pub async fn new(dir: PathBuf) -> ScreenResult<Self> {
        let closed_dir = dir.join("closed");
        let summaries_dir = dir.join("summaries");
        tokio::fs::create_dir_all(&closed_dir).await?;
        tokio::fs::create_dir_all(&summaries_dir).await?;
        Ok(Self {
            closed_dir,
            summaries_dir,
        })
    }

    fn marker_path(&self, session_id: &SessionId) -> PathBuf {
        self.closed_dir.join(format!("{session_id}.closed"))
    }

    fn summary_path(&self, session_id: &SessionId) -> PathBuf {
        self.summaries_dir.join(format!("{session_id}.json"))
    }

    fn staging_path(&self, session_id: &SessionId) -> PathBuf {
        self.summaries_dir
            .join(format!(".{session_id}.{:016x}.tmp", rand::random::<u64>()))
    }

    /// Writes the summary beside its final name, then links it into place so
    /// readers only ever see a complete file and an existing one is never
    /// overwritten. A file that does not parse is a torn earlier write and is
    /// replaced.
    async fn publish(&self, summary: &SessionSummary, staging: &Path) -> ScreenResult<()> {
        let path = self.summary_path(&summary.session_id);
        tokio::fs::write(staging, serde_json::to_string_pretty(summary)?).await?;

        match tokio::fs::hard_link(staging, &path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if read_summary(&path).await.is_ok() {
                    return Err(ScreenError::SummaryExists(summary.session_id.clone()));
                }
                warn!(session_id = %summary.session_id, "Replacing torn summary file");
                tokio::fs::rename(staging, &path).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

async fn read_summary(path: &Path) -> ScreenResult<SessionSummary> {
    let data = tokio::fs::read_to_string(path).await?;
    serde_json::from_str(&data).map_err(|e| {
        ScreenError::Storage(format!("Failed to parse summary {}: {e}", path.display()))
    })
}

#[async_trait]
impl SummaryStore for FileSummaryStore {
    async fn mark_closed(&self, session_id: &SessionId) -> ScreenResult<bool> {
        let opened = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.marker_path(session_id))
            .await;
        match opened {
            Ok(mut file) => {
                file.write_all(Utc::now().to_rfc3339().as_bytes()).await?;
                file.flush().await?;
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn is_closed(&self, session_id: &SessionId) -> ScreenResult<bool> {
        Ok(tokio::fs::try_exists(self.marker_path(session_id)).await?)
    }

    async fn insert(&self, summary: &SessionSummary) -> ScreenResult<()> {
        let staging = self.staging_path(&summary.session_id);
        let published = self.publish(summary, &staging).await;
        match tokio::fs::remove_file(&staging).await {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                warn!(path = %staging.display(), error = %e, "Failed to remove staging file");
            }
            _ => {}
        }
        published
    }

    async fn get(&self, session_id: &SessionId) -> ScreenResult<Option<SessionSummary>> {
        let path = self.summary_path(session_id);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(None);
        }
        read_summary(&path).await.map(Some)
    }

    async fn list(&self) -> ScreenResult<Vec<SummaryListing>> {
        let mut entries = tokio::fs::read_dir(&self.summaries_dir).await?;
        let mut listings = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_summary(&path).await {
                Ok(summary) => listings.push(summary.listing()),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable summary");
                }
            }
        }
        Ok(newest_first(listings))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Duration;
    use phqscreen_core::{SeverityBand, SeverityTally};
    use tempfile::TempDir;

    fn summary(raw_id: &str, minutes_ago: i64) -> SessionSummary {
        SessionSummary {
            session_id: SessionId::parse(raw_id).unwrap(),
            conversation_text: "User: hi".into(),
            mapped_results: vec![],
            severity_tally: SeverityTally::new(),
            total_score: 0,
            severity_band: SeverityBand::Minimal,
            message_count: 1,
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    async fn stores(tmp: &TempDir) -> Vec<Box<dyn SummaryStore>> {
        vec![
            Box::new(InMemorySummaryStore::new()),
            Box::new(FileSummaryStore::new(tmp.path().join("store")).await.unwrap()),
        ]
    }

    #[tokio::test]
    async fn mark_closed_succeeds_once() {
        let tmp = TempDir::new().unwrap();
        for store in stores(&tmp).await {
            let id = SessionId::parse("s1").unwrap();
            assert!(!store.is_closed(&id).await.unwrap());
            assert!(store.mark_closed(&id).await.unwrap());
            assert!(!store.mark_closed(&id).await.unwrap());
            assert!(store.is_closed(&id).await.unwrap());
        }
    }

    #[tokio::test]
    async fn second_insert_is_rejected() {
        let tmp = TempDir::new().unwrap();
        for store in stores(&tmp).await {
            let first = summary("dup", 0);
            store.insert(&first).await.unwrap();

            let mut second = summary("dup", 0);
            second.total_score = 99;
            let err = store.insert(&second).await.unwrap_err();
            assert!(matches!(err, ScreenError::SummaryExists(_)));

            let stored = store.get(&first.session_id).await.unwrap().unwrap();
            assert_eq!(stored.total_score, 0);
        }
    }

    #[tokio::test]
    async fn get_unknown_is_none() {
        let tmp = TempDir::new().unwrap();
        for store in stores(&tmp).await {
            let id = SessionId::parse("missing").unwrap();
            assert!(store.get(&id).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn list_is_most_recent_first() {
        let tmp = TempDir::new().unwrap();
        for store in stores(&tmp).await {
            store.insert(&summary("old", 30)).await.unwrap();
            store.insert(&summary("new", 1)).await.unwrap();
            store.insert(&summary("mid", 10)).await.unwrap();

            let ids: Vec<String> = store
                .list()
                .await
                .unwrap()
                .into_iter()
                .map(|l| l.session_id.to_string())
                .collect();
            assert_eq!(ids, vec!["new", "mid", "old"]);
        }
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("store");
        let id = SessionId::parse("durable").unwrap();
        {
            let store = FileSummaryStore::new(dir.clone()).await.unwrap();
            assert!(store.mark_closed(&id).await.unwrap());
            store.insert(&summary("durable", 0)).await.unwrap();
        }
        let store = FileSummaryStore::new(dir).await.unwrap();
        assert!(store.is_closed(&id).await.unwrap());
        assert!(!store.mark_closed(&id).await.unwrap());
        assert!(store.get(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn file_list_skips_unreadable_files() {
        let tmp = TempDir::new().unwrap();
        let store = FileSummaryStore::new(tmp.path().join("store")).await.unwrap();
        store.insert(&summary("good", 0)).await.unwrap();
        tokio::fs::write(tmp.path().join("store/summaries/broken.json"), "{")
            .await
            .unwrap();
        let listings = store.list().await.unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].session_id.as_str(), "good");
    }

    #[tokio::test]
    async fn file_insert_replaces_torn_file_and_leaves_no_staging() {
        let tmp = TempDir::new().unwrap();
        let store = FileSummaryStore::new(tmp.path().join("store")).await.unwrap();
        let summaries_dir = tmp.path().join("store/summaries");
        tokio::fs::write(summaries_dir.join("torn.json"), "")
            .await
            .unwrap();

        let torn = SessionId::parse("torn").unwrap();
        assert!(store.get(&torn).await.is_err());
        store.insert(&summary("torn", 0)).await.unwrap();
        assert_eq!(store.get(&torn).await.unwrap().unwrap().session_id, torn);

        // A complete summary is never replaced.
        let err = store.insert(&summary("torn", 5)).await.unwrap_err();
        assert!(matches!(err, ScreenError::SummaryExists(_)));

        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&summaries_dir).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["torn.json"]);
    }
}
