use super::Classifier;
use async_trait::async_trait;
use phqscreen_core::{Classification, ScreenError, ScreenResult};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Deterministic classifier that answers from a script.
///
/// Sentences are looked up verbatim; unknown sentences get the fallback
/// verdict, or fail when no fallback is set. Every call is counted, which
/// lets callers assert how often classification actually ran.
#[derive(Default)]
pub struct ScriptedClassifier {
    verdicts: HashMap<String, Classification>,
    fallback: Option<Classification>,
    failing: HashSet<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedClassifier {
    /// A classifier with no scripted sentences and no fallback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the verdict for one sentence.
    pub fn with(mut self, sentence: impl Into<String>, question_id: u8, severity: u8) -> Self {
        match Classification::new(question_id, severity) {
            Ok(c) => {
                self.verdicts.insert(sentence.into(), c);
            }
            Err(_) => {
                // Out-of-range scripts behave like a backend that rejects the sentence.
                self.failing.insert(sentence.into());
            }
        }
        self
    }

    /// Verdict for sentences that were not scripted.
    pub fn with_fallback(mut self, question_id: u8, severity: u8) -> Self {
        self.fallback = Classification::new(question_id, severity).ok();
        self
    }

    /// Makes classification of `sentence` fail.
    pub fn failing_on(mut self, sentence: impl Into<String>) -> Self {
        self.failing.insert(sentence.into());
        self
    }

    /// Sleeps before answering, to widen race windows in tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `classify` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, sentence: &str) -> ScreenResult<Classification> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if sentence.trim().is_empty() {
            return Err(ScreenError::Classification(
                "cannot classify empty text".to_string(),
            ));
        }
        if self.failing.contains(sentence) {
            return Err(ScreenError::Classification(format!(
                "scripted failure for '{sentence}'"
            )));
        }
        self.verdicts
            .get(sentence)
            .copied()
            .or(self.fallback)
            .ok_or_else(|| ScreenError::Classification(format!("no verdict for '{sentence}'")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_and_fallback() {
        let c = ScriptedClassifier::new()
            .with("I feel sad", 1, 2)
            .with_fallback(0, 0);
        let v = c.classify("I feel sad").await.unwrap();
        assert_eq!((v.question_id(), v.severity()), (1, 2));
        let v = c.classify("something else").await.unwrap();
        assert_eq!((v.question_id(), v.severity()), (0, 0));
        assert_eq!(c.calls(), 2);
    }

    #[tokio::test]
    async fn test_unscripted_without_fallback_fails() {
        let c = ScriptedClassifier::new();
        assert!(matches!(
            c.classify("anything").await,
            Err(ScreenError::Classification(_))
        ));
    }

    #[tokio::test]
    async fn test_failing_and_empty() {
        let c = ScriptedClassifier::new()
            .with_fallback(0, 1)
            .failing_on("bad");
        assert!(c.classify("bad").await.is_err());
        assert!(c.classify("   ").await.is_err());
        assert_eq!(c.calls(), 2);
    }

    #[tokio::test]
    async fn test_out_of_range_script_fails() {
        let c = ScriptedClassifier::new().with("weird", 11, 0).with_fallback(0, 0);
        assert!(c.classify("weird").await.is_err());
    }
}
