use phqscreen_core::{SessionSummary, QUESTION_COUNT};

/// PHQ-9 item wording, indexed by `question_id`.
const QUESTION_LABELS: [&str; QUESTION_COUNT as usize] = [
    "Little interest or pleasure in doing things",
    "Feeling down, depressed, or hopeless",
    "Trouble falling or staying asleep, or sleeping too much",
    "Feeling tired or having little energy",
    "Poor appetite or overeating",
    "Feeling bad about yourself, or that you are a failure",
    "Trouble concentrating on things",
    "Moving or speaking slowly, or being fidgety or restless",
    "Thoughts that you would be better off dead or of hurting yourself",
];

/// PHQ-9 answer wording, indexed by `severity`.
const FREQUENCY_LABELS: [&str; 4] = [
    "Not at all",
    "Several days",
    "More than half the days",
    "Nearly every day",
];

/// Questionnaire wording for a slot.
pub fn question_label(question_id: u8) -> &'static str {
    QUESTION_LABELS
        .get(usize::from(question_id))
        .copied()
        .unwrap_or("Unknown question")
}

/// Answer wording for a severity level.
pub fn frequency_label(severity: u8) -> &'static str {
    FREQUENCY_LABELS
        .get(usize::from(severity))
        .copied()
        .unwrap_or("Unknown")
}

/// Renders a stored summary as a Markdown report.
///
/// Works purely from the summary's fields; nothing is reclassified.
pub fn render_markdown(summary: &SessionSummary) -> String {
    let mut lines = vec![
        "# PHQ-9 Screening Report".to_string(),
        String::new(),
        format!("- **Session:** {}", summary.session_id),
        format!(
            "- **Generated:** {}",
            summary.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        format!("- **Messages:** {}", summary.message_count),
        format!("- **Total score:** {}", summary.total_score),
        format!("- **Severity band:** {}", summary.severity_band),
        String::new(),
        "## Severity by question".to_string(),
        String::new(),
    ];

    if summary.severity_tally.is_empty() {
        lines.push("No sentences were scored.".to_string());
    } else {
        lines.push("| # | Question | Score |".to_string());
        lines.push("|---|----------|-------|".to_string());
        lines.extend(summary.severity_tally.iter().map(|(question_id, score)| {
            format!(
                "| Q{} | {} | {score} |",
                u32::from(question_id) + 1,
                question_label(question_id)
            )
        }));
    }
    lines.push(String::new());

    if !summary.mapped_results.is_empty() {
        lines.push("## Scored sentences".to_string());
        lines.push(String::new());
        lines.extend(summary.mapped_results.iter().map(|r| {
            format!(
                "- \"{}\" → Q{} ({})",
                r.sentence,
                u32::from(r.question_id) + 1,
                frequency_label(r.severity)
            )
        }));
        lines.push(String::new());
    }

    lines.push("## Transcript".to_string());
    lines.push(String::new());
    lines.extend(
        summary
            .conversation_text
            .lines()
            .map(|line| format!("> {line}  ")),
    );

    let mut out = lines.join("\n");
    out.push('\n');
    out
}
