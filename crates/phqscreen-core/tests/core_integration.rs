#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::Utc;
use phqscreen_core::*;

fn sample_summary() -> SessionSummary {
    let results = vec![
        MappedResult::new("I feel sad", Classification::new(1, 2).unwrap()),
        MappedResult::new("I can't sleep", Classification::new(2, 3).unwrap()),
    ];
    let tally = SeverityTally::from_results(&results);
    let total = tally.total();
    SessionSummary {
        session_id: SessionId::parse("session-1").unwrap(),
        conversation_text: "User: I feel sad. I can't sleep.\nBot: I hear you.".into(),
        mapped_results: results,
        severity_tally: tally,
        total_score: total,
        severity_band: SeverityBand::from_score(total),
        message_count: 2,
        created_at: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// Summary document shape
// ---------------------------------------------------------------------------

#[test]
fn summary_document_has_expected_fields() {
    let summary = sample_summary();
    let json = serde_json::to_value(&summary).unwrap();

    assert_eq!(json["session_id"], "session-1");
    assert_eq!(json["total_score"], 5);
    assert_eq!(json["severity_band"], "Mild");
    assert_eq!(json["message_count"], 2);
    assert_eq!(json["severity_tally"], serde_json::json!({"1": 2, "2": 3}));
    assert_eq!(json["mapped_results"][1]["sentence"], "I can't sleep");
    assert_eq!(json["mapped_results"][1]["question_id"], 2);
    assert_eq!(json["mapped_results"][1]["severity"], 3);
}

#[test]
fn summary_roundtrip_preserves_content() {
    let summary = sample_summary();
    let json = serde_json::to_string(&summary).unwrap();
    let back: SessionSummary = serde_json::from_str(&json).unwrap();
    assert_eq!(back, summary);
}

#[test]
fn summary_accepts_legacy_timestamp_field() {
    let doc = serde_json::json!({
        "session_id": "legacy",
        "timestamp": "2024-05-01T10:00:00Z",
        "conversation_text": "User: hi",
        "mapped_results": [{"sentence": "hi", "question_id": 0, "severity": 0}],
        "severity_tally": {"0": 0},
        "total_score": 0,
        "severity_band": "Minimal",
        "message_count": 1
    });
    let summary: SessionSummary = serde_json::from_value(doc).unwrap();
    assert_eq!(summary.session_id.as_str(), "legacy");
    assert_eq!(summary.severity_band, SeverityBand::Minimal);
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[test]
fn listing_omits_transcript_and_results() {
    let summary = sample_summary();
    let listing = summary.listing();
    assert_eq!(listing.session_id, summary.session_id);
    assert_eq!(listing.timestamp, summary.created_at);
    assert_eq!(listing.total_score, 5);
    assert_eq!(listing.severity_band, SeverityBand::Mild);

    let json = serde_json::to_value(&listing).unwrap();
    assert!(json.get("conversation_text").is_none());
    assert!(json.get("mapped_results").is_none());
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[test]
fn persistence_error_carries_summary() {
    let summary = sample_summary();
    let err = ScreenError::Persistence {
        summary: Box::new(summary.clone()),
        reason: "disk full".into(),
    };
    assert!(err.is_retryable());
    assert!(err.to_string().contains("session-1"));
    assert!(err.to_string().contains("disk full"));
    if let ScreenError::Persistence { summary: carried, .. } = err {
        assert_eq!(*carried, summary);
    }
}

#[test]
fn input_errors_are_not_retryable() {
    let err = ScreenError::InvalidInput("bad".into());
    assert!(!err.is_retryable());
    let closed = ScreenError::SessionClosed(SessionId::parse("s").unwrap());
    assert!(!closed.is_retryable());
}
