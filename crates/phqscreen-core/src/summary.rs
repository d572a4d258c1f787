use crate::error::{ScreenError, ScreenResult};
use crate::utterance::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Number of questionnaire slots (`question_id` is in `0..QUESTION_COUNT`).
pub const QUESTION_COUNT: u8 = 9;

/// Number of severity levels (`severity` is in `0..SEVERITY_LEVELS`).
pub const SEVERITY_LEVELS: u8 = 4;

/// A validated classifier verdict for one sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawClassification")]
pub struct Classification {
    question_id: u8,
    severity: u8,
}

#[derive(Deserialize)]
struct RawClassification {
    question_id: i64,
    severity: i64,
}

impl TryFrom<RawClassification> for Classification {
    type Error = ScreenError;

    fn try_from(raw: RawClassification) -> Result<Self, Self::Error> {
        Self::from_wide(raw.question_id, raw.severity)
    }
}

impl Classification {
    /// Builds a classification, rejecting ids outside the questionnaire.
    pub fn new(question_id: u8, severity: u8) -> ScreenResult<Self> {
        if question_id >= QUESTION_COUNT {
            return Err(ScreenError::Classification(format!(
                "question_id {question_id} out of range 0..{QUESTION_COUNT}"
            )));
        }
        if severity >= SEVERITY_LEVELS {
            return Err(ScreenError::Classification(format!(
                "severity {severity} out of range 0..{SEVERITY_LEVELS}"
            )));
        }
        Ok(Self {
            question_id,
            severity,
        })
    }

    /// Like [`Classification::new`] but accepts the wide integers a model
    /// backend reports.
    pub fn from_wide(question_id: i64, severity: i64) -> ScreenResult<Self> {
        let q = u8::try_from(question_id).map_err(|_| {
            ScreenError::Classification(format!("question_id {question_id} out of range"))
        })?;
        let s = u8::try_from(severity).map_err(|_| {
            ScreenError::Classification(format!("severity {severity} out of range"))
        })?;
        Self::new(q, s)
    }

    /// Questionnaire slot.
    pub fn question_id(&self) -> u8 {
        self.question_id
    }

    /// Severity level.
    pub fn severity(&self) -> u8 {
        self.severity
    }
}

/// One scored sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedResult {
    /// The segmented sentence exactly as classified.
    pub sentence: String,
    /// Assigned questionnaire slot.
    pub question_id: u8,
    /// Assigned severity.
    pub severity: u8,
}

impl MappedResult {
    /// Pairs a sentence with its classification.
    pub fn new(sentence: impl Into<String>, classification: Classification) -> Self {
        Self {
            sentence: sentence.into(),
            question_id: classification.question_id(),
            severity: classification.severity(),
        }
    }
}

/// Accumulated severity per questionnaire slot.
///
/// Only slots that received at least one sentence have an entry. Serializes
/// as a JSON object with stringified slot keys (`{"0": 3, "3": 3}`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeverityTally(BTreeMap<u8, u32>);

impl SeverityTally {
    /// Creates an empty tally.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `severity` to the slot's running total, creating the slot if
    /// needed.
    pub fn add(&mut self, question_id: u8, severity: u8) {
        *self.0.entry(question_id).or_insert(0) += u32::from(severity);
    }

    /// Builds a tally from an ordered list of mapped results.
    pub fn from_results(results: &[MappedResult]) -> Self {
        let mut tally = Self::new();
        for r in results {
            tally.add(r.question_id, r.severity);
        }
        tally
    }

    /// Accumulated severity for a slot, if any sentence mapped to it.
    pub fn get(&self, question_id: u8) -> Option<u32> {
        self.0.get(&question_id).copied()
    }

    /// Sum of all slot totals.
    pub fn total(&self) -> u32 {
        self.0.values().sum()
    }

    /// Number of slots present.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no sentence was scored.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates `(question_id, accumulated severity)` in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, u32)> + '_ {
        self.0.iter().map(|(q, s)| (*q, *s))
    }
}

/// Categorical label derived from a total score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeverityBand {
    /// 0–4
    Minimal,
    /// 5–9
    Mild,
    /// 10–14
    Moderate,
    /// 15–19
    #[serde(rename = "Moderately Severe")]
    ModeratelySevere,
    /// 20 and above
    Severe,
}

impl SeverityBand {
    /// Maps a total score to its band. Thresholds are evaluated low to high.
    pub fn from_score(score: u32) -> Self {
        match score {
            0..=4 => SeverityBand::Minimal,
            5..=9 => SeverityBand::Mild,
            10..=14 => SeverityBand::Moderate,
            15..=19 => SeverityBand::ModeratelySevere,
            _ => SeverityBand::Severe,
        }
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            SeverityBand::Minimal => "Minimal",
            SeverityBand::Mild => "Mild",
            SeverityBand::Moderate => "Moderate",
            SeverityBand::ModeratelySevere => "Moderately Severe",
            SeverityBand::Severe => "Severe",
        }
    }
}

impl fmt::Display for SeverityBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The immutable outcome of a closed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session the summary belongs to. At most one summary exists per id.
    pub session_id: SessionId,
    /// Full transcript, one `Sender: text` line per utterance.
    pub conversation_text: String,
    /// Scored sentences in transcript order.
    pub mapped_results: Vec<MappedResult>,
    /// Per-slot accumulated severity.
    pub severity_tally: SeverityTally,
    /// Sum of all tally values.
    pub total_score: u32,
    /// Band derived from `total_score`.
    pub severity_band: SeverityBand,
    /// Number of utterances (user and bot) in the session.
    pub message_count: usize,
    /// When the summary was computed.
    #[serde(alias = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl SessionSummary {
    /// Reduces the summary to its listing form.
    pub fn listing(&self) -> SummaryListing {
        SummaryListing {
            session_id: self.session_id.clone(),
            timestamp: self.created_at,
            total_score: self.total_score,
            severity_band: self.severity_band,
            message_count: self.message_count,
        }
    }
}

/// A summary without transcript or mapped results, for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryListing {
    /// Session id.
    pub session_id: SessionId,
    /// When the summary was computed.
    pub timestamp: DateTime<Utc>,
    /// Total score.
    pub total_score: u32,
    /// Severity band.
    pub severity_band: SeverityBand,
    /// Utterance count.
    pub message_count: usize,
}
