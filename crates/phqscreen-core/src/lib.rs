//! Core types and error definitions for phqscreen.
//!
//! This crate provides the foundational types shared across all phqscreen
//! crates: session identity, utterances, per-sentence classifications and the
//! immutable session summary produced when a screening session is closed.
//!
//! # Main types
//!
//! - [`ScreenError`] — Unified error enum for all phqscreen subsystems.
//! - [`ScreenResult`] — Convenience alias for `Result<T, ScreenError>`.
//! - [`SessionId`] — Opaque session token.
//! - [`Utterance`] — One timestamped message by the user or the bot.
//! - [`Classification`] — A validated `(question_id, severity)` pair.
//! - [`SessionSummary`] — The scored, immutable outcome of a closed session.

/// Error types.
pub mod error;
/// Scoring types: classifications, tallies, bands and summaries.
pub mod summary;
/// Session identity and utterance records.
pub mod utterance;

pub use error::{ScreenError, ScreenResult};
pub use summary::{
    Classification, MappedResult, SessionSummary, SeverityBand, SeverityTally, SummaryListing,
    QUESTION_COUNT, SEVERITY_LEVELS,
};
pub use utterance::{Sender, SessionId, Utterance};
