//! Input normalization and bare-number disambiguation.
//!
//! When the user answers a question like "How many years of work experience
//! do you have?" with a bare "5", the number is expanded into a full sentence
//! using the most recent assistant message as context. This is a single-turn
//! heuristic, not a dialogue-state tracker: only the immediately preceding
//! assistant message is consulted, and only three keyword classes are known.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::llm::{ChatMessage, ChatRole};

static BARE_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d{1,3})\s*$").expect("bare number regex"));

const EXPERIENCE_KEYWORDS: &[&str] = &[
    "experience",
    "work experience",
    "years of work",
    "erfahrung",
    "berufserfahrung",
    "berufsjahre",
];

const AGE_KEYWORDS: &[&str] = &["old are you", "your age", "alt sind sie", "ihr alter", "age?"];

const QUALIFICATION_KEYWORDS: &[&str] = &[
    "qualification",
    "degree",
    "education level",
    "abschluss",
    "qualifikation",
    "bildungsabschluss",
];

/// Fixed 4-level degree table for numeric qualification answers.
fn degree_for_level(level: u32) -> Option<&'static str> {
    match level {
        1 => Some("Bachelor"),
        2 => Some("Master"),
        3 => Some("MBA"),
        4 => Some("Doctorate"),
        _ => None,
    }
}

fn last_assistant_text(history: &[ChatMessage]) -> Option<&str> {
    history
        .iter()
        .rev()
        .find(|m| m.role == ChatRole::Assistant)
        .and_then(|m| m.content.as_deref())
}

/// Normalize raw user text for the orchestrator.
///
/// Returns `(processed_text, is_valid)`. Validity fails only on
/// empty-after-trim input. Bare integers are reinterpreted against the last
/// assistant message; with no contextual keyword match the experience
/// interpretation is the default.
pub fn process_input(raw: &str, history: &[ChatMessage]) -> (String, bool) {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return (String::new(), false);
    }

    let Some(caps) = BARE_NUMBER_RE.captures(trimmed) else {
        return (trimmed.to_string(), true);
    };
    let number: u32 = match caps[1].parse() {
        Ok(n) => n,
        Err(_) => return (trimmed.to_string(), true),
    };

    let context = last_assistant_text(history)
        .map(|t| t.to_lowercase())
        .unwrap_or_default();

    let contains = |keywords: &[&str]| keywords.iter().any(|kw| context.contains(kw));

    let processed = if contains(AGE_KEYWORDS) {
        format!("I am {} years old", number)
    } else if contains(QUALIFICATION_KEYWORDS) {
        match degree_for_level(number) {
            Some(degree) => format!("My highest qualification is a {}", degree),
            None => format!("qualification level is {}", number),
        }
    } else if contains(EXPERIENCE_KEYWORDS) {
        format!("I have {} years of work experience", number)
    } else {
        // No contextual keyword: default to the experience interpretation
        format!("I have {} years of work experience", number)
    };

    tracing::debug!(raw = %trimmed, processed = %processed, "Expanded bare numeric input");
    (processed, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_with_assistant(text: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::user("hello"),
            ChatMessage::assistant(text),
        ]
    }

    #[test]
    fn test_empty_input_invalid() {
        assert_eq!(process_input("", &[]), (String::new(), false));
        assert_eq!(process_input("   \n", &[]), (String::new(), false));
    }

    #[test]
    fn test_plain_text_passes_through() {
        let (text, valid) = process_input("  What does the EMBA cost? ", &[]);
        assert!(valid);
        assert_eq!(text, "What does the EMBA cost?");
    }

    #[test]
    fn test_number_with_experience_context() {
        let history = history_with_assistant("How many years of work experience do you have?");
        let (text, valid) = process_input("5", &history);
        assert!(valid);
        assert!(text.contains('5') && text.contains("experience"));
    }

    #[test]
    fn test_number_with_age_context() {
        let history = history_with_assistant("May I ask how old are you?");
        let (text, _) = process_input("42", &history);
        assert_eq!(text, "I am 42 years old");
    }

    #[test]
    fn test_number_with_qualification_context() {
        let history = history_with_assistant("What is your highest degree? (1=Bachelor, 2=Master, 3=MBA, 4=Doctorate)");
        let (text, _) = process_input("2", &history);
        assert!(text.contains("Master"));

        let (text, _) = process_input("7", &history);
        assert_eq!(text, "qualification level is 7");
    }

    #[test]
    fn test_number_without_context_defaults_to_experience() {
        let (text, _) = process_input("3", &[]);
        assert!(text.contains("experience"));
    }

    #[test]
    fn test_german_context() {
        let history = history_with_assistant("Wie viele Jahre Berufserfahrung haben Sie?");
        let (text, _) = process_input("10", &history);
        assert!(text.contains("10") && text.contains("experience"));
    }
}
