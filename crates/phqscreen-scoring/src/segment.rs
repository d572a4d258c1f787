use phqscreen_core::{Sender, Utterance};

/// Renders the sender-labelled transcript, one line per utterance.
pub fn render_conversation(utterances: &[Utterance]) -> String {
    utterances
        .iter()
        .map(Utterance::transcript_line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Concatenates the user's utterances with single spaces, in order.
pub fn user_transcript(utterances: &[Utterance]) -> String {
    utterances
        .iter()
        .filter(|u| u.sender == Sender::User)
        .map(|u| u.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits text on every literal `.`, trims each piece and drops empty ones.
///
/// Abbreviations and decimals are split too: `"Dr. Lee"` yields `["Dr", "Lee"]`.
/// Stored summaries depend on this exact segmentation.
pub fn segment_sentences(text: &str) -> Vec<String> {
    text.split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
