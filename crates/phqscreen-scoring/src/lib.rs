//! Scoring for phqscreen sessions.
//!
//! Turns the ordered utterances of a closed session into a
//! [`SessionSummary`](phqscreen_core::SessionSummary): the user transcript is
//! segmented into sentences, each sentence is scored by a [`Classifier`], and
//! the per-question severities are tallied into a total score and band.
//!
//! # Main types
//!
//! - [`Classifier`] — Port mapping a sentence to `(question_id, severity)`.
//! - [`HttpClassifier`] — Classifier backed by a model-serving HTTP endpoint.
//! - [`ScriptedClassifier`] — Deterministic classifier for tests and replay.
//! - [`AggregationEngine`] — Builds session summaries.

/// Classifier port and its adapters.
pub mod classifier;
/// Session aggregation.
pub mod engine;
/// Markdown report rendering.
pub mod report;
/// Transcript rendering and sentence segmentation.
pub mod segment;

pub use classifier::http::{ClassifierConfig, HttpClassifier};
pub use classifier::scripted::ScriptedClassifier;
pub use classifier::Classifier;
pub use engine::AggregationEngine;
pub use report::render_markdown;
pub use segment::{render_conversation, segment_sentences, user_transcript};
