/// Classifier backed by a model-serving HTTP endpoint.
pub mod http;
/// Deterministic classifier for tests and replays.
pub mod scripted;

use async_trait::async_trait;
use phqscreen_core::{Classification, ScreenResult};

/// Port to the sentence classifier.
///
/// Implementations must be stateless from the caller's point of view: each
/// call scores one sentence independently and calls may happen in any order.
/// Failures are reported as [`ScreenError::Classification`]; an
/// implementation never substitutes a default verdict.
///
/// [`ScreenError::Classification`]: phqscreen_core::ScreenError::Classification
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Scores one sentence.
    async fn classify(&self, sentence: &str) -> ScreenResult<Classification>;
}
