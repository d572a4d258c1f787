use crate::summary_store::SummaryStore;
use phqscreen_core::{ScreenError, ScreenResult, SessionId};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Accepting utterances. Unknown sessions are implicitly open.
    Open,
    /// Terminal.
    Closed,
}

/// Result of asking a session to close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// This call moved the session from Open to Closed.
    Closed,
    /// The session was closed before this call.
    AlreadyClosed,
}

#[derive(Default)]
struct SessionSlot {
    closed: bool,
}

type SlotMap = HashMap<SessionId, Arc<Mutex<SessionSlot>>>;

/// Tracks session state and serializes work per session.
///
/// Each session gets its own async mutex; holding a [`SessionGuard`] excludes
/// every other append or close for that session while leaving other sessions
/// untouched. A slot lives only while a guard holds it or a caller waits on
/// it. Closed state is persisted in the [`SummaryStore`], so instances
/// sharing a store agree on it and nothing is lost when a slot is dropped.
pub struct SessionLifecycle {
    slots: Arc<StdMutex<SlotMap>>,
    ledger: Arc<dyn SummaryStore>,
}

impl SessionLifecycle {
    /// Creates a lifecycle whose closed markers live in `ledger`.
    pub fn new(ledger: Arc<dyn SummaryStore>) -> Self {
        Self {
            slots: Arc::new(StdMutex::new(HashMap::new())),
            ledger,
        }
    }

    /// Generates a fresh session id. The session is Open until closed.
    pub fn open(&self) -> SessionId {
        let session_id = SessionId::generate();
        debug!(session_id = %session_id, "Session opened");
        session_id
    }

    /// Takes the per-session lock, waiting for any in-flight append or close.
    pub async fn acquire(&self, session_id: &SessionId) -> SessionGuard {
        let slot = self.slot(session_id);
        SessionGuard {
            session_id: session_id.clone(),
            slot: slot.lock_owned().await,
            ledger: self.ledger.clone(),
            registry: self.slots.clone(),
        }
    }

    /// Current state of a session.
    pub async fn state(&self, session_id: &SessionId) -> ScreenResult<SessionState> {
        self.acquire(session_id).await.state().await
    }

    /// Number of sessions currently held or awaited.
    pub fn tracked(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn slot(&self, session_id: &SessionId) -> Arc<Mutex<SessionSlot>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(session_id.clone()).or_default().clone()
    }
}

/// Exclusive access to one session for the lifetime of the guard.
pub struct SessionGuard {
    session_id: SessionId,
    slot: OwnedMutexGuard<SessionSlot>,
    ledger: Arc<dyn SummaryStore>,
    registry: Arc<StdMutex<SlotMap>>,
}

impl SessionGuard {
    /// The session this guard locks.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Current state, consulting the ledger unless closure was already seen.
    pub async fn state(&mut self) -> ScreenResult<SessionState> {
        if self.slot.closed {
            return Ok(SessionState::Closed);
        }
        if self.ledger.is_closed(&self.session_id).await? {
            self.slot.closed = true;
            return Ok(SessionState::Closed);
        }
        Ok(SessionState::Open)
    }

    /// Fails with [`ScreenError::SessionClosed`] unless the session is open.
    pub async fn ensure_open(&mut self) -> ScreenResult<()> {
        match self.state().await? {
            SessionState::Open => Ok(()),
            SessionState::Closed => Err(ScreenError::SessionClosed(self.session_id.clone())),
        }
    }

    /// Moves the session to Closed. Exactly one call per session, across all
    /// instances sharing the ledger, observes [`Transition::Closed`].
    pub async fn close(&mut self) -> ScreenResult<Transition> {
        if self.slot.closed {
            return Ok(Transition::AlreadyClosed);
        }
        let won = self.ledger.mark_closed(&self.session_id).await?;
        self.slot.closed = true;
        Ok(if won {
            Transition::Closed
        } else {
            Transition::AlreadyClosed
        })
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let mut slots = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let held = OwnedMutexGuard::mutex(&self.slot);
        // Only the map and this guard hold the slot: nobody is waiting.
        let idle = slots
            .get(&self.session_id)
            .is_some_and(|slot| Arc::ptr_eq(slot, held) && Arc::strong_count(slot) == 2);
        if idle {
            slots.remove(&self.session_id);
        }
    }
}
