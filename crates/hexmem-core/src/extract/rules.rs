//! Rule-based extraction and summarization adapters.
//!
//! Cue-phrase classification over sentences. Classification is
//! first-match-wins in the order decision > task > event > fact, so a
//! sentence never produces two items.

use crate::memory::{EventSeverity, Role, SessionMessage};

use super::{
    Extraction, ExtractedDecision, ExtractedEvent, ExtractedFact, ExtractedTask, ExtractionError,
    Extractor, Summarizer,
};

const DECISION_CUES: &[&str] = &[
    "decided", "decision", "we chose", "agreed to", "going with", "opted for", "settled on",
];

const TASK_CUES: &[&str] = &[
    "task is", "need to", "needs to", "must ", "todo", "to-do", "action item", "have to",
    "should implement", "should add", "should fix",
];

// cue → (event_type, severity)
const EVENT_CUES: &[(&str, &str, EventSeverity)] = &[
    ("outage", "incident", EventSeverity::Critical),
    ("incident", "incident", EventSeverity::Warning),
    ("milestone", "milestone", EventSeverity::Info),
    ("released", "release", EventSeverity::Info),
    ("shipped", "release", EventSeverity::Info),
    ("discovered", "discovery", EventSeverity::Info),
    ("found that", "discovery", EventSeverity::Info),
    ("blocked by", "blocker", EventSeverity::Warning),
    ("resolved", "resolution", EventSeverity::Info),
];

const FACT_COPULAS: &[&str] = &[" is ", " are ", " uses ", " supports ", " was ", " has "];

const MAX_TITLE_LEN: usize = 120;

/// Deterministic cue-phrase extractor.
#[derive(Debug, Default)]
pub struct RuleExtractor;

impl RuleExtractor {
    pub fn new() -> Self {
        Self
    }

    fn classify(sentence: &str, out: &mut Extraction) {
        let trimmed = sentence.trim();
        if trimmed.len() < 12 {
            return;
        }
        let lowered = trimmed.to_lowercase();

        if DECISION_CUES.iter().any(|cue| lowered.contains(cue)) {
            // Offsets into `lowered` only transfer when lowercasing kept byte
            // lengths; skip the rationale split otherwise
            let marker = " because ";
            let rationale = lowered
                .find(marker)
                .filter(|_| lowered.len() == trimmed.len())
                .map(|i| trimmed[i + marker.len()..].trim().to_string())
                .filter(|r| !r.is_empty());
            out.decisions.push(ExtractedDecision {
                title: truncate_title(trimmed),
                decision: trimmed.to_string(),
                rationale,
                alternatives: vec![],
                tags: vec![],
            });
            return;
        }

        if TASK_CUES.iter().any(|cue| lowered.contains(cue)) {
            out.tasks.push(ExtractedTask {
                title: truncate_title(trimmed),
                description: if trimmed.len() > MAX_TITLE_LEN {
                    Some(trimmed.to_string())
                } else {
                    None
                },
                priority: 50,
                tags: vec![],
            });
            return;
        }

        if let Some((_, event_type, severity)) = EVENT_CUES
            .iter()
            .find(|(cue, _, _)| lowered.contains(cue))
            .map(|(c, t, s)| (*c, *t, *s))
        {
            out.events.push(ExtractedEvent {
                title: truncate_title(trimmed),
                event_type: event_type.to_string(),
                description: None,
                severity,
                tags: vec![],
            });
            return;
        }

        let word_count = trimmed.split_whitespace().count();
        if (4..=40).contains(&word_count) {
            if let Some(copula) = FACT_COPULAS.iter().find(|c| lowered.contains(**c)) {
                let subject = lowered
                    .find(*copula)
                    .filter(|_| lowered.len() == trimmed.len())
                    .map(|i| trimmed[..i].trim().to_string())
                    .filter(|s| {
                        !s.is_empty() && s.len() <= 40 && s.split_whitespace().count() <= 4
                    });
                out.facts.push(ExtractedFact {
                    content: trimmed.to_string(),
                    subject,
                    confidence: 0.7,
                    tags: vec![],
                });
            }
        }
    }
}

impl Extractor for RuleExtractor {
    fn extract(
        &self,
        message: &str,
        _context: &[SessionMessage],
    ) -> Result<Extraction, ExtractionError> {
        let mut out = Extraction::default();
        for sentence in split_sentences(message) {
            Self::classify(&sentence, &mut out);
        }
        Ok(out)
    }
}

fn split_sentences(text: &str) -> Vec<String> {
    text.split(['.', '?', '!', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn truncate_title(sentence: &str) -> String {
    if sentence.len() <= MAX_TITLE_LEN {
        return sentence.to_string();
    }
    // Cut on a char boundary, then back to the last word boundary
    let mut cut = MAX_TITLE_LEN;
    while !sentence.is_char_boundary(cut) {
        cut -= 1;
    }
    let head = &sentence[..cut];
    match head.rfind(' ') {
        Some(i) if i > MAX_TITLE_LEN / 2 => head[..i].to_string(),
        _ => head.to_string(),
    }
}

// ============================================================================
// SUMMARIZER
// ============================================================================

const MAX_SUMMARY_LEN: usize = 500;

/// Extractive summarizer: opening user message plus closing assistant
/// message, clipped to 500 chars.
#[derive(Debug, Default)]
pub struct ExtractiveSummarizer;

impl ExtractiveSummarizer {
    pub fn new() -> Self {
        Self
    }
}

impl Summarizer for ExtractiveSummarizer {
    fn summarize(&self, messages: &[SessionMessage]) -> Result<Option<String>, ExtractionError> {
        if messages.is_empty() {
            return Ok(None);
        }

        let opening = messages
            .iter()
            .find(|m| m.role == Role::User)
            .or_else(|| messages.first());
        let closing = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .filter(|m| opening.is_none_or(|o| o.id != m.id));

        let mut summary = format!("{} messages.", messages.len());
        if let Some(open) = opening {
            summary.push_str(" Opened with: ");
            summary.push_str(open.content.trim());
        }
        if let Some(close) = closing {
            summary.push_str(" Closed with: ");
            summary.push_str(close.content.trim());
        }

        if summary.len() > MAX_SUMMARY_LEN {
            let mut cut = MAX_SUMMARY_LEN;
            while !summary.is_char_boundary(cut) {
                cut -= 1;
            }
            summary.truncate(cut);
            summary.push('…');
        }

        Ok(Some(summary))
    }
}

// ============================================================================
// TESTS
// ============================================================================
