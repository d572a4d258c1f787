use async_trait::async_trait;
use chrono::{DateTime, Utc};
use phqscreen_core::{ScreenError, ScreenResult, Sender, SessionId, Utterance};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::warn;

/// Append-only, per-session ordered message log.
///
/// The store assigns each utterance its sequence number and timestamp. The
/// timestamp never goes backwards within a session, and the sequence number
/// orders utterances whose timestamps tie.
#[async_trait]
pub trait UtteranceStore: Send + Sync {
    /// Records one utterance and returns it as stored.
    async fn append(
        &self,
        session_id: &SessionId,
        sender: Sender,
        text: &str,
    ) -> ScreenResult<Utterance>;

    /// All utterances of a session in append order. Unknown sessions yield
    /// an empty list.
    async fn read(&self, session_id: &SessionId) -> ScreenResult<Vec<Utterance>>;

    /// Drops per-session state the store keeps between appends. Called once
    /// a session is closed; reads still return the full log.
    async fn release(&self, _session_id: &SessionId) {}
}

fn next_timestamp(last: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match last {
        Some(last) if last > now => last,
        _ => now,
    }
}

// ---------------------------------------------------------------------------
// InMemoryUtteranceStore
// ---------------------------------------------------------------------------

/// Utterance log kept in process memory.
#[derive(Default)]
pub struct InMemoryUtteranceStore {
    logs: RwLock<HashMap<SessionId, Vec<Utterance>>>,
}

impl InMemoryUtteranceStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UtteranceStore for InMemoryUtteranceStore {
    async fn append(
        &self,
        session_id: &SessionId,
        sender: Sender,
        text: &str,
    ) -> ScreenResult<Utterance> {
        let mut logs = self.logs.write().await;
        let log = logs.entry(session_id.clone()).or_default();
        let utterance = Utterance {
            session_id: session_id.clone(),
            seq: log.len() as u64,
            sender,
            text: text.to_string(),
            timestamp: next_timestamp(log.last().map(|u| u.timestamp)),
        };
        log.push(utterance.clone());
        Ok(utterance)
    }

    async fn read(&self, session_id: &SessionId) -> ScreenResult<Vec<Utterance>> {
        Ok(self
            .logs
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// FileUtteranceStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct LogCursor {
    loaded: bool,
    next_seq: u64,
    last_timestamp: Option<DateTime<Utc>>,
}

/// Utterance log stored as one JSON Lines file per session.
///
/// A line is either written whole or rolled back, and a torn final line
/// left by a crash is dropped on the next read or append.
pub struct FileUtteranceStore {
    dir: PathBuf,
    cursors: Mutex<HashMap<SessionId, Arc<Mutex<LogCursor>>>>,
}

impl FileUtteranceStore {
    /// Opens (creating if needed) a log directory.
    pub async fn new(dir: PathBuf) -> ScreenResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            cursors: Mutex::new(HashMap::new()),
        })
    }

    fn log_path(&self, session_id: &SessionId) -> PathBuf {
        self.dir.join(format!("{session_id}.jsonl"))
    }

    async fn cursor(&self, session_id: &SessionId) -> Arc<Mutex<LogCursor>> {
        let mut cursors = self.cursors.lock().await;
        cursors.entry(session_id.clone()).or_default().clone()
    }

    /// Number of sessions with cached append state.
    pub async fn cached_sessions(&self) -> usize {
        self.cursors.lock().await.len()
    }

    async fn read_file(&self, session_id: &SessionId) -> ScreenResult<Vec<Utterance>> {
        let path = self.log_path(session_id);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read_to_string(&path).await?;
        let mut entries: Vec<Utterance> = complete_lines(&data)
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                ScreenError::Storage(format!("Corrupt utterance log for {session_id}: {e}"))
            })?;
        entries.sort_by_key(|u| u.seq);
        Ok(entries)
    }

    /// Cuts an unterminated final line off the log before appending to it.
    async fn repair_tail(&self, session_id: &SessionId) -> ScreenResult<()> {
        let path = self.log_path(session_id);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(());
        }
        let data = tokio::fs::read_to_string(&path).await?;
        let keep = complete_lines(&data).len();
        if keep < data.len() {
            warn!(
                session_id = %session_id,
                dropped_bytes = data.len() - keep,
                "Dropping torn log line"
            );
            let file = tokio::fs::OpenOptions::new().write(true).open(&path).await?;
            file.set_len(keep as u64).await?;
        }
        Ok(())
    }
}

/// The prefix of `data` up to and including its last newline.
fn complete_lines(data: &str) -> &str {
    match data.rfind('\n') {
        Some(end) => &data[..=end],
        None => "",
    }
}

async fn write_line(file: &mut tokio::fs::File, line: &str) -> std::io::Result<()> {
    file.write_all(line.as_bytes()).await?;
    file.flush().await
}

#[async_trait]
impl UtteranceStore for FileUtteranceStore {
    async fn append(
        &self,
        session_id: &SessionId,
        sender: Sender,
        text: &str,
    ) -> ScreenResult<Utterance> {
        let cursor = self.cursor(session_id).await;
        let mut cursor = cursor.lock().await;
        if !cursor.loaded {
            self.repair_tail(session_id).await?;
            let existing = self.read_file(session_id).await?;
            if let Some(last) = existing.last() {
                cursor.next_seq = last.seq + 1;
                cursor.last_timestamp = Some(last.timestamp);
            }
            cursor.loaded = true;
        }

        let utterance = Utterance {
            session_id: session_id.clone(),
            seq: cursor.next_seq,
            sender,
            text: text.to_string(),
            timestamp: next_timestamp(cursor.last_timestamp),
        };

        let mut line = serde_json::to_string(&utterance)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(session_id))
            .await?;
        let len = file.metadata().await?.len();
        if let Err(e) = write_line(&mut file, &line).await {
            // Roll back a partial line so the next append starts clean.
            file.set_len(len).await?;
            return Err(e.into());
        }

        cursor.next_seq += 1;
        cursor.last_timestamp = Some(utterance.timestamp);
        Ok(utterance)
    }

    async fn read(&self, session_id: &SessionId) -> ScreenResult<Vec<Utterance>> {
        self.read_file(session_id).await
    }

    async fn release(&self, session_id: &SessionId) {
        self.cursors.lock().await.remove(session_id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sid(raw: &str) -> SessionId {
        SessionId::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn memory_assigns_sequence_numbers() {
        let store = InMemoryUtteranceStore::new();
        let a = sid("a");
        store.append(&a, Sender::User, "one").await.unwrap();
        store.append(&a, Sender::Bot, "two").await.unwrap();
        let third = store.append(&a, Sender::User, "three").await.unwrap();
        assert_eq!(third.seq, 2);

        let log = store.read(&a).await.unwrap();
        let seqs: Vec<u64> = log.iter().map(|u| u.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert!(log.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn memory_sessions_are_independent() {
        let store = InMemoryUtteranceStore::new();
        store.append(&sid("a"), Sender::User, "hi").await.unwrap();
        let first_b = store.append(&sid("b"), Sender::User, "yo").await.unwrap();
        assert_eq!(first_b.seq, 0);
        assert!(store.read(&sid("c")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_append_and_read_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = FileUtteranceStore::new(tmp.path().to_path_buf())
            .await
            .unwrap();
        let s = sid("s1");
        store.append(&s, Sender::User, "I feel sad.").await.unwrap();
        store.append(&s, Sender::Bot, "I'm here.").await.unwrap();

        let log = store.read(&s).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].sender, Sender::User);
        assert_eq!(log[0].text, "I feel sad.");
        assert_eq!(log[1].seq, 1);
    }

    #[tokio::test]
    async fn file_sequence_resumes_across_instances() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().to_path_buf();
        let s = sid("resume");

        {
            let store = FileUtteranceStore::new(dir.clone()).await.unwrap();
            store.append(&s, Sender::User, "first").await.unwrap();
            store.append(&s, Sender::Bot, "second").await.unwrap();
        }

        let store = FileUtteranceStore::new(dir).await.unwrap();
        let third = store.append(&s, Sender::User, "third").await.unwrap();
        assert_eq!(third.seq, 2);
        let log = store.read(&s).await.unwrap();
        let texts: Vec<&str> = log.iter().map(|u| u.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn file_missing_session_reads_empty() {
        let tmp = TempDir::new().unwrap();
        let store = FileUtteranceStore::new(tmp.path().to_path_buf())
            .await
            .unwrap();
        assert!(store.read(&sid("nobody")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_torn_tail_is_dropped() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().to_path_buf();
        let s = sid("torn");
        {
            let store = FileUtteranceStore::new(dir.clone()).await.unwrap();
            store.append(&s, Sender::User, "kept").await.unwrap();
        }
        let path = dir.join("torn.jsonl");
        let mut data = tokio::fs::read_to_string(&path).await.unwrap();
        data.push_str("{\"session_id\":\"torn\",\"se");
        tokio::fs::write(&path, data).await.unwrap();

        let store = FileUtteranceStore::new(dir).await.unwrap();
        assert_eq!(store.read(&s).await.unwrap().len(), 1);

        let next = store.append(&s, Sender::Bot, "after crash").await.unwrap();
        assert_eq!(next.seq, 1);
        let texts: Vec<String> = store
            .read(&s)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.text)
            .collect();
        assert_eq!(texts, vec!["kept", "after crash"]);
    }

    #[tokio::test]
    async fn file_release_drops_cursor() {
        let tmp = TempDir::new().unwrap();
        let store = FileUtteranceStore::new(tmp.path().to_path_buf())
            .await
            .unwrap();
        let s = sid("released");
        store.append(&s, Sender::User, "one").await.unwrap();
        assert_eq!(store.cached_sessions().await, 1);
        store.release(&s).await;
        assert_eq!(store.cached_sessions().await, 0);

        // A later append reloads the position from disk.
        let second = store.append(&s, Sender::User, "two").await.unwrap();
        assert_eq!(second.seq, 1);
    }

    #[tokio::test]
    async fn file_corrupt_log_is_storage_error() {
        let tmp = TempDir::new().unwrap();
        let store = FileUtteranceStore::new(tmp.path().to_path_buf())
            .await
            .unwrap();
        tokio::fs::write(tmp.path().join("bad.jsonl"), "not json\n")
            .await
            .unwrap();
        assert!(matches!(
            store.read(&sid("bad")).await,
            Err(ScreenError::Storage(_))
        ));
    }
}
