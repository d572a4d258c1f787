use phqscreen_core::{ScreenError, ScreenResult};
use rand::seq::SliceRandom;
use serde::Deserialize;
use std::path::Path;

/// Produces the bot's reply to a user turn.
pub trait Responder: Send + Sync {
    /// The reply to `user_text`.
    fn respond(&self, user_text: &str) -> String;
}

/// Always answers with the same text.
pub struct FixedResponder(pub String);

impl Responder for FixedResponder {
    fn respond(&self, _user_text: &str) -> String {
        self.0.clone()
    }
}

/// Tag of the intent whose responses are used when nothing else matches.
pub const FALLBACK_TAG: &str = "no-response";

const EMPTY_INTENT_REPLY: &str = "I'm here to listen.";
const DEFAULT_REPLY: &str = "I'm here to listen. Please go on...";

/// One entry of the intents knowledge base.
#[derive(Debug, Clone, Deserialize)]
pub struct Intent {
    /// Intent name; `no-response` marks the fallback intent.
    pub tag: String,
    /// Phrases that select this intent when contained in the user's text.
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Candidate replies, one picked at random.
    #[serde(default)]
    pub responses: Vec<String>,
}

#[derive(Deserialize)]
struct KnowledgeBase {
    intents: Vec<Intent>,
}

/// Pattern-matching responder over an intents knowledge base.
///
/// Intents are tried in file order; the first one with a non-blank pattern
/// contained (case-insensitively) in the user's text wins, and one of its
/// responses is picked at random. The `no-response` intent never matches by
/// pattern and supplies the fallback replies.
#[derive(Debug, Clone)]
pub struct IntentResponder {
    intents: Vec<Intent>,
}

impl IntentResponder {
    /// A responder over `intents`, tried in order.
    pub fn new(intents: Vec<Intent>) -> Self {
        Self { intents }
    }

    /// Parses a `{"intents": [...]}` document.
    pub fn from_json(json: &str) -> ScreenResult<Self> {
        let kb: KnowledgeBase = serde_json::from_str(json)
            .map_err(|e| ScreenError::Config(format!("Invalid intents file: {e}")))?;
        Ok(Self::new(kb.intents))
    }

    /// Reads an intents file from disk.
    pub async fn load(path: &Path) -> ScreenResult<Self> {
        let data = tokio::fs::read_to_string(path).await.map_err(|e| {
            ScreenError::Config(format!(
                "Failed to read intents file '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_json(&data)
    }

    /// Number of loaded intents.
    pub fn intent_count(&self) -> usize {
        self.intents.len()
    }

    /// Tag of the intent that would answer `user_text`, if any pattern matches.
    pub fn matching_tag(&self, user_text: &str) -> Option<&str> {
        self.matching_intent(user_text).map(|i| i.tag.as_str())
    }

    fn matching_intent(&self, user_text: &str) -> Option<&Intent> {
        let input = user_text.to_lowercase();
        self.intents
            .iter()
            .filter(|intent| intent.tag != FALLBACK_TAG)
            .find(|intent| {
                intent
                    .patterns
                    .iter()
                    .filter(|p| !p.trim().is_empty())
                    .any(|p| input.contains(&p.to_lowercase()))
            })
    }

    fn fallback(&self) -> Option<&[String]> {
        self.intents
            .iter()
            .find(|i| i.tag == FALLBACK_TAG)
            .map(|i| i.responses.as_slice())
            .filter(|r| !r.is_empty())
    }
}

impl Responder for IntentResponder {
    fn respond(&self, user_text: &str) -> String {
        let mut rng = rand::thread_rng();
        if let Some(intent) = self.matching_intent(user_text) {
            return intent
                .responses
                .choose(&mut rng)
                .cloned()
                .unwrap_or_else(|| EMPTY_INTENT_REPLY.to_string());
        }
        self.fallback()
            .and_then(|r| r.choose(&mut rng))
            .cloned()
            .unwrap_or_else(|| DEFAULT_REPLY.to_string())
    }
}
