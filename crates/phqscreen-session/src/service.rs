use crate::lifecycle::{SessionGuard, SessionLifecycle, SessionState, Transition};
use crate::responder::Responder;
use crate::store::UtteranceStore;
use crate::summary_store::SummaryStore;
use phqscreen_core::{
    ScreenError, ScreenResult, Sender, SessionId, SessionSummary, SummaryListing, Utterance,
};
use phqscreen_scoring::{AggregationEngine, Classifier};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Result of closing a session.
#[derive(Debug, Clone, PartialEq)]
pub enum CloseOutcome {
    /// The session had been closed before. Carries the stored summary when
    /// one exists; nothing was recomputed.
    AlreadyClosed {
        /// The closed session.
        session_id: SessionId,
        /// Its stored summary; `None` for empty sessions and unfinished
        /// closes.
        summary: Option<SessionSummary>,
    },
    /// The session had no utterances. It is now closed and has no summary.
    EmptySession {
        /// The closed session.
        session_id: SessionId,
    },
    /// The session was closed by this call and its summary stored.
    Closed(SessionSummary),
}

impl CloseOutcome {
    /// The session the outcome is about.
    pub fn session_id(&self) -> &SessionId {
        match self {
            CloseOutcome::AlreadyClosed { session_id, .. }
            | CloseOutcome::EmptySession { session_id } => session_id,
            CloseOutcome::Closed(summary) => &summary.session_id,
        }
    }

    /// Descriptive message for callers.
    pub fn message(&self) -> String {
        match self {
            CloseOutcome::AlreadyClosed { session_id, .. } => {
                format!("Session {session_id} was already stopped earlier.")
            }
            CloseOutcome::EmptySession { session_id } => {
                format!("No messages found for session {session_id}.")
            }
            CloseOutcome::Closed(summary) => format!(
                "Session {} stopped and full conversation saved.",
                summary.session_id
            ),
        }
    }
}

/// Reply to one user turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnReply {
    /// Session the turn was recorded in (new if none was given).
    pub session_id: SessionId,
    /// Questionnaire slot of the user's message.
    pub question_id: u8,
    /// Severity of the user's message.
    pub severity: u8,
    /// The bot's recorded reply.
    pub bot_message: String,
}

/// Runs screening sessions: records turns, closes sessions exactly once and
/// serves the stored summaries.
pub struct ScreeningService {
    lifecycle: SessionLifecycle,
    utterances: Arc<dyn UtteranceStore>,
    summaries: Arc<dyn SummaryStore>,
    classifier: Arc<dyn Classifier>,
    engine: AggregationEngine,
    responder: Arc<dyn Responder>,
    /// Summaries computed by a close whose write failed, awaiting retry.
    unsaved: Mutex<HashMap<SessionId, SessionSummary>>,
}

impl ScreeningService {
    /// Wires the service to its stores and ports.
    pub fn new(
        utterances: Arc<dyn UtteranceStore>,
        summaries: Arc<dyn SummaryStore>,
        classifier: Arc<dyn Classifier>,
        responder: Arc<dyn Responder>,
    ) -> Self {
        Self {
            lifecycle: SessionLifecycle::new(summaries.clone()),
            utterances,
            summaries,
            engine: AggregationEngine::new(classifier.clone()),
            classifier,
            responder,
            unsaved: Mutex::new(HashMap::new()),
        }
    }

    /// Starts a new session and returns its id.
    pub async fn open_session(&self) -> SessionId {
        self.lifecycle.open()
    }

    /// Open or Closed; unknown sessions are Open.
    pub async fn state(&self, session_id: &SessionId) -> ScreenResult<SessionState> {
        self.lifecycle.state(session_id).await
    }

    /// Records an utterance. Unknown sessions are created implicitly; closed
    /// sessions reject the append with [`ScreenError::SessionClosed`].
    pub async fn append(
        &self,
        session_id: &SessionId,
        sender: Sender,
        text: &str,
    ) -> ScreenResult<Utterance> {
        let mut guard = self.lifecycle.acquire(session_id).await;
        self.append_locked(&mut guard, sender, text).await
    }

    async fn append_locked(
        &self,
        guard: &mut SessionGuard,
        sender: Sender,
        text: &str,
    ) -> ScreenResult<Utterance> {
        if let Err(e) = guard.ensure_open().await {
            warn!(session_id = %guard.session_id(), "Rejected message for closed session");
            return Err(e);
        }
        self.utterances.append(guard.session_id(), sender, text).await
    }

    /// Handles one user turn: records the text, classifies it, and records
    /// and returns the bot's reply. A `None` session id starts a new session.
    ///
    /// If classification fails the user's utterance stays recorded and no
    /// bot reply is written.
    pub async fn turn(&self, session_id: Option<SessionId>, text: &str) -> ScreenResult<TurnReply> {
        if text.trim().is_empty() {
            return Err(ScreenError::InvalidInput("message text is empty".to_string()));
        }
        let session_id = match session_id {
            Some(id) => id,
            None => {
                let id = self.open_session().await;
                info!(session_id = %id, "New session created");
                id
            }
        };

        let mut guard = self.lifecycle.acquire(&session_id).await;
        self.append_locked(&mut guard, Sender::User, text).await?;

        let classification = self.classifier.classify(text).await.map_err(|e| match e {
            ScreenError::Classification(_) => e,
            other => ScreenError::Classification(other.to_string()),
        })?;

        let bot_message = self.responder.respond(text);
        self.append_locked(&mut guard, Sender::Bot, &bot_message)
            .await?;

        Ok(TurnReply {
            session_id,
            question_id: classification.question_id(),
            severity: classification.severity(),
            bot_message,
        })
    }

    /// Closes a session, aggregating and storing its summary on the first
    /// call only.
    ///
    /// Errors after the transition leave the session closed:
    /// [`ScreenError::Classification`] stores nothing (see
    /// [`ScreeningService::retry_aggregation`]), and
    /// [`ScreenError::Persistence`] carries the computed summary (see
    /// [`ScreeningService::retry_persist`]).
    pub async fn close(&self, session_id: &SessionId) -> ScreenResult<CloseOutcome> {
        let mut guard = self.lifecycle.acquire(session_id).await;
        match guard.close().await? {
            Transition::AlreadyClosed => {
                info!(session_id = %session_id, "Session already closed");
                let summary = self.summaries.get(session_id).await?;
                return Ok(CloseOutcome::AlreadyClosed {
                    session_id: session_id.clone(),
                    summary,
                });
            }
            Transition::Closed => {
                info!(session_id = %session_id, "Session closed");
                self.utterances.release(session_id).await;
            }
        }
        self.aggregate_and_store(session_id).await
    }

    /// Finishes a close that failed after the transition.
    ///
    /// A summary whose write failed is stored as computed, without
    /// reclassifying. Otherwise (a classifier outage during close) the
    /// session is aggregated again.
    pub async fn retry_aggregation(&self, session_id: &SessionId) -> ScreenResult<CloseOutcome> {
        let mut guard = self.lifecycle.acquire(session_id).await;
        if let Some(outcome) = self.settled_outcome(&mut guard).await? {
            return Ok(outcome);
        }
        if let Some(summary) = self.take_unsaved(session_id).await {
            info!(session_id = %session_id, "Retrying summary write");
            return self.persist(summary).await.map(CloseOutcome::Closed);
        }
        info!(session_id = %session_id, "Retrying aggregation");
        self.aggregate_and_store(session_id).await
    }

    /// Stores the summary left behind by a failed write, never reclassifying.
    /// Fails with [`ScreenError::InvalidInput`] when there is nothing to
    /// store.
    pub async fn persist_unsaved(&self, session_id: &SessionId) -> ScreenResult<CloseOutcome> {
        let mut guard = self.lifecycle.acquire(session_id).await;
        if let Some(outcome) = self.settled_outcome(&mut guard).await? {
            return Ok(outcome);
        }
        let summary = self.take_unsaved(session_id).await.ok_or_else(|| {
            ScreenError::InvalidInput(format!("no unsaved summary for session {session_id}"))
        })?;
        info!(session_id = %session_id, "Retrying summary write");
        self.persist(summary).await.map(CloseOutcome::Closed)
    }

    /// Rejects open sessions and short-circuits sessions that already have a
    /// stored summary.
    async fn settled_outcome(
        &self,
        guard: &mut SessionGuard,
    ) -> ScreenResult<Option<CloseOutcome>> {
        let session_id = guard.session_id().clone();
        if guard.state().await? == SessionState::Open {
            return Err(ScreenError::InvalidInput(format!(
                "session {session_id} is still open"
            )));
        }
        Ok(self
            .summaries
            .get(&session_id)
            .await?
            .map(|summary| CloseOutcome::AlreadyClosed {
                session_id,
                summary: Some(summary),
            }))
    }

    async fn take_unsaved(&self, session_id: &SessionId) -> Option<SessionSummary> {
        self.unsaved.lock().await.remove(session_id)
    }

    /// Whether a computed summary is waiting to be stored.
    pub async fn has_unsaved(&self, session_id: &SessionId) -> bool {
        self.unsaved.lock().await.contains_key(session_id)
    }

    /// Stores a summary whose first write failed, without reclassifying.
    pub async fn retry_persist(&self, summary: &SessionSummary) -> ScreenResult<()> {
        let mut guard = self.lifecycle.acquire(&summary.session_id).await;
        if guard.state().await? == SessionState::Open {
            return Err(ScreenError::InvalidInput(format!(
                "session {} is still open",
                summary.session_id
            )));
        }
        self.persist(summary.clone()).await.map(|_| ())
    }

    async fn aggregate_and_store(&self, session_id: &SessionId) -> ScreenResult<CloseOutcome> {
        let utterances = self.utterances.read(session_id).await?;
        if utterances.is_empty() {
            warn!(session_id = %session_id, "No messages found");
            return Ok(CloseOutcome::EmptySession {
                session_id: session_id.clone(),
            });
        }

        let summary = self.engine.aggregate(session_id, &utterances).await?;
        self.persist(summary).await.map(CloseOutcome::Closed)
    }

    async fn persist(&self, summary: SessionSummary) -> ScreenResult<SessionSummary> {
        match self.summaries.insert(&summary).await {
            Ok(()) => {
                self.unsaved.lock().await.remove(&summary.session_id);
                info!(
                    session_id = %summary.session_id,
                    total_score = summary.total_score,
                    band = %summary.severity_band,
                    "Session summary saved"
                );
                Ok(summary)
            }
            Err(ScreenError::SummaryExists(id)) => {
                self.unsaved.lock().await.remove(&id);
                Err(ScreenError::SummaryExists(id))
            }
            Err(e) => {
                error!(
                    session_id = %summary.session_id,
                    error = %e,
                    "Failed to save session summary"
                );
                self.unsaved
                    .lock()
                    .await
                    .insert(summary.session_id.clone(), summary.clone());
                Err(ScreenError::Persistence {
                    summary: Box::new(summary),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// The stored summary of a closed session.
    pub async fn summary(&self, session_id: &SessionId) -> ScreenResult<SessionSummary> {
        self.summaries
            .get(session_id)
            .await?
            .ok_or_else(|| ScreenError::SessionUnknownOnRead(session_id.clone()))
    }

    /// All stored summaries, most recent first.
    pub async fn list_summaries(&self) -> ScreenResult<Vec<SummaryListing>> {
        self.summaries.list().await
    }
}
