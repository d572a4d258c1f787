use crate::error::{ScreenError, ScreenResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque session token.
///
/// Tokens are restricted to ASCII alphanumerics, `-` and `_` so they can be
/// used directly as storage keys and file names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Longest accepted token.
    pub const MAX_LEN: usize = 128;

    /// Generates a fresh random session id (UUID v4).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Validates a caller-supplied token.
    pub fn parse(raw: impl Into<String>) -> ScreenResult<Self> {
        let raw = raw.into();
        if raw.is_empty() || raw.len() > Self::MAX_LEN {
            return Err(ScreenError::InvalidInput(format!(
                "session id must be 1..={} characters",
                Self::MAX_LEN
            )));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ScreenError::InvalidInput(format!(
                "session id '{raw}' contains unsupported characters"
            )));
        }
        Ok(Self(raw))
    }

    /// Returns the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionId {
    type Error = ScreenError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl std::str::FromStr for SessionId {
    type Err = ScreenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// The participant that authored an [`Utterance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The person being screened.
    User,
    /// The screening bot.
    Bot,
}

impl Sender {
    /// Capitalized label used when rendering a transcript.
    pub fn display_name(self) -> &'static str {
        match self {
            Sender::User => "User",
            Sender::Bot => "Bot",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::User => f.write_str("user"),
            Sender::Bot => f.write_str("bot"),
        }
    }
}

/// One immutable message within a session, as recorded by the utterance
/// store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    /// The session this utterance belongs to.
    pub session_id: SessionId,
    /// Position within the session, assigned at append time. Orders
    /// utterances even when timestamps tie.
    pub seq: u64,
    /// Who said it.
    pub sender: Sender,
    /// The raw text.
    pub text: String,
    /// UTC append time; non-decreasing within a session.
    pub timestamp: DateTime<Utc>,
}

impl Utterance {
    /// Renders the utterance as a transcript line, e.g. `User: I feel sad.`
    pub fn transcript_line(&self) -> String {
        format!("{}: {}", self.sender.display_name(), self.text)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_valid_and_unique() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert!(SessionId::parse(a.as_str()).is_ok());
    }

    #[test]
    fn test_parse_rejects_path_like_ids() {
        assert!(SessionId::parse("").is_err());
        assert!(SessionId::parse("../etc/passwd").is_err());
        assert!(SessionId::parse("a b").is_err());
        assert!(SessionId::parse("x".repeat(SessionId::MAX_LEN + 1)).is_err());
        assert!(SessionId::parse("f469f0a8-bb2f-4533-b741-9aa118d2e69f").is_ok());
    }

    #[test]
    fn test_session_id_deserialization_validates() {
        let ok: SessionId = serde_json::from_str("\"abc_123\"").unwrap();
        assert_eq!(ok.as_str(), "abc_123");
        assert!(serde_json::from_str::<SessionId>("\"a/b\"").is_err());
    }

    #[test]
    fn test_sender_serialization() {
        assert_eq!(serde_json::to_string(&Sender::User).unwrap(), "\"user\"");
        assert_eq!(serde_json::to_string(&Sender::Bot).unwrap(), "\"bot\"");
    }

    #[test]
    fn test_transcript_line_capitalizes_sender() {
        let u = Utterance {
            session_id: SessionId::parse("s1").unwrap(),
            seq: 0,
            sender: Sender::Bot,
            text: "How are you feeling?".into(),
            timestamp: Utc::now(),
        };
        assert_eq!(u.transcript_line(), "Bot: How are you feeling?");
    }
}
