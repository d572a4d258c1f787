//! Session lifecycle and storage for phqscreen.
//!
//! A session is open from its first utterance (or an explicit open) until it
//! is closed, and it is closed exactly once. Closing runs the aggregation
//! engine and stores the resulting summary; every later close returns the
//! stored outcome without reclassifying anything.
//!
//! # Main types
//!
//! - [`ScreeningService`] — Entry point: open, append, turn, close, read.
//! - [`SessionLifecycle`] — Per-session locking and the Open→Closed transition.
//! - [`UtteranceStore`] — Append-only, ordered message log.
//! - [`SummaryStore`] — One summary per session plus the durable closed marker.
//! - [`Responder`] — Canned bot replies for each user turn.

/// Per-session locking and the Open→Closed transition.
pub mod lifecycle;
/// Bot replies.
pub mod responder;
/// The screening service.
pub mod service;
/// Utterance logs.
pub mod store;
/// Summaries and closed markers.
pub mod summary_store;

pub use lifecycle::{SessionGuard, SessionLifecycle, SessionState, Transition};
pub use responder::{FixedResponder, Intent, IntentResponder, Responder};
pub use service::{CloseOutcome, ScreeningService, TurnReply};
pub use store::{FileUtteranceStore, InMemoryUtteranceStore, UtteranceStore};
pub use summary_store::{FileSummaryStore, InMemorySummaryStore, SummaryStore};
