use crate::classifier::Classifier;
use crate::segment::{render_conversation, segment_sentences, user_transcript};
use chrono::Utc;
use phqscreen_core::{
    MappedResult, ScreenError, ScreenResult, SessionId, SessionSummary, SeverityBand,
    SeverityTally, Utterance,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Builds the summary of a closed session.
///
/// Aggregation is read-compute only; storing the result is the caller's job.
/// The first sentence the classifier cannot score aborts the whole run, so a
/// summary never contains a partial tally.
pub struct AggregationEngine {
    classifier: Arc<dyn Classifier>,
}

impl AggregationEngine {
    /// Creates an engine that scores sentences with `classifier`.
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self { classifier }
    }

    /// Scores `utterances` (already in session order) into a summary.
    pub async fn aggregate(
        &self,
        session_id: &SessionId,
        utterances: &[Utterance],
    ) -> ScreenResult<SessionSummary> {
        let conversation_text = render_conversation(utterances);
        let sentences = segment_sentences(&user_transcript(utterances));

        let mut mapped_results = Vec::with_capacity(sentences.len());
        let mut severity_tally = SeverityTally::new();

        for (index, sentence) in sentences.into_iter().enumerate() {
            let classification = match self.classifier.classify(&sentence).await {
                Ok(c) => c,
                Err(e) => {
                    warn!(
                        session_id = %session_id,
                        sentence_index = index,
                        error = %e,
                        "Aggregation aborted: sentence could not be classified"
                    );
                    return Err(match e {
                        ScreenError::Classification(msg) => {
                            ScreenError::Classification(format!("sentence {index}: {msg}"))
                        }
                        other => ScreenError::Classification(format!("sentence {index}: {other}")),
                    });
                }
            };
            severity_tally.add(classification.question_id(), classification.severity());
            mapped_results.push(MappedResult::new(sentence, classification));
        }

        let total_score = severity_tally.total();
        let severity_band = SeverityBand::from_score(total_score);

        info!(
            session_id = %session_id,
            sentences = mapped_results.len(),
            total_score,
            band = %severity_band,
            "Session aggregated"
        );

        Ok(SessionSummary {
            session_id: session_id.clone(),
            conversation_text,
            mapped_results,
            severity_tally,
            total_score,
            severity_band,
            message_count: utterances.len(),
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::classifier::scripted::ScriptedClassifier;
    use phqscreen_core::Sender;

    fn utt(seq: u64, sender: Sender, text: &str) -> Utterance {
        Utterance {
            session_id: SessionId::parse("s1").unwrap(),
            seq,
            sender,
            text: text.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_tally_total_and_band() {
        let classifier = Arc::new(
            ScriptedClassifier::new()
                .with("I feel down", 0, 2)
                .with("Nothing is fun", 0, 1)
                .with("I can't sleep", 3, 3),
        );
        let engine = AggregationEngine::new(classifier.clone());
        let log = vec![
            utt(0, Sender::User, "I feel down. Nothing is fun."),
            utt(1, Sender::Bot, "That sounds hard. Anything else?"),
            utt(2, Sender::User, "I can't sleep."),
        ];

        let summary = engine
            .aggregate(&SessionId::parse("s1").unwrap(), &log)
            .await
            .unwrap();

        assert_eq!(summary.mapped_results.len(), 3);
        assert_eq!(summary.mapped_results[0].sentence, "I feel down");
        assert_eq!(summary.mapped_results[2].sentence, "I can't sleep");
        assert_eq!(summary.severity_tally.get(0), Some(3));
        assert_eq!(summary.severity_tally.get(3), Some(3));
        assert_eq!(summary.total_score, 6);
        assert_eq!(summary.total_score, summary.severity_tally.total());
        assert_eq!(summary.severity_band, SeverityBand::Mild);
        assert_eq!(summary.message_count, 3);
        assert_eq!(
            summary.conversation_text,
            "User: I feel down. Nothing is fun.\nBot: That sounds hard. Anything else?\nUser: I can't sleep."
        );
        // Bot sentences are never classified.
        assert_eq!(classifier.calls(), 3);
    }

    #[tokio::test]
    async fn test_user_turns_without_periods_merge() {
        let classifier = Arc::new(ScriptedClassifier::new().with("hello there", 4, 1));
        let engine = AggregationEngine::new(classifier);
        let log = vec![utt(0, Sender::User, "hello"), utt(1, Sender::User, "there")];
        let summary = engine
            .aggregate(&SessionId::parse("s1").unwrap(), &log)
            .await
            .unwrap();
        assert_eq!(summary.mapped_results.len(), 1);
        assert_eq!(summary.mapped_results[0].sentence, "hello there");
    }

    #[tokio::test]
    async fn test_classification_failure_aborts() {
        let classifier = Arc::new(
            ScriptedClassifier::new()
                .with_fallback(1, 1)
                .failing_on("second"),
        );
        let engine = AggregationEngine::new(classifier.clone());
        let log = vec![utt(0, Sender::User, "first. second. third.")];
        let err = engine
            .aggregate(&SessionId::parse("s1").unwrap(), &log)
            .await
            .unwrap_err();
        assert!(matches!(err, ScreenError::Classification(ref m) if m.contains("sentence 1")));
        // Stops at the failing sentence.
        assert_eq!(classifier.calls(), 2);
    }

    #[tokio::test]
    async fn test_bot_only_session_scores_zero() {
        let classifier = Arc::new(ScriptedClassifier::new());
        let engine = AggregationEngine::new(classifier.clone());
        let log = vec![utt(0, Sender::Bot, "Welcome.")];
        let summary = engine
            .aggregate(&SessionId::parse("s1").unwrap(), &log)
            .await
            .unwrap();
        assert!(summary.mapped_results.is_empty());
        assert!(summary.severity_tally.is_empty());
        assert_eq!(summary.total_score, 0);
        assert_eq!(summary.severity_band, SeverityBand::Minimal);
        assert_eq!(summary.message_count, 1);
        assert_eq!(classifier.calls(), 0);
    }
}
