//! Best-effort profile extraction from conversation text.
//!
//! Independent regex/keyword extractors scan the combined query+response text
//! every turn. Each field is write-once — the first non-null extraction wins.
//! Extraction is advisory telemetry feeding the suggested-program heuristic;
//! it never gates or blocks a response. English/German only.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{ConversationState, Program, UserProfile};

static EXPERIENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(\d{1,2})\s*(?:years?|jahren?)\s*(?:of\s+)?(?:work\s+)?(?:professional\s+)?(?:experience|berufserfahrung)",
    )
    .expect("experience regex")
});

static LEADERSHIP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(\d{1,2})\s*(?:years?|jahren?)\s*(?:of\s+|in\s+(?:einer\s+)?)?(?:leadership|management|führungserfahrung|führungsposition)",
    )
    .expect("leadership regex")
});

static NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:[Mm]y name is|[Ii]ch heiße|[Ii]ch bin|[Ii] am called)\s+([A-ZÄÖÜ][a-zäöüß]+)",
    )
    .expect("name regex")
});

/// Fixed professional-field vocabulary (canonical form, match keywords).
const FIELDS: &[(&str, &[&str])] = &[
    ("finance", &["finance", "banking", "finanzen", "bank"]),
    ("consulting", &["consulting", "consultant", "beratung", "berater"]),
    ("engineering", &["engineering", "engineer", "ingenieur"]),
    ("healthcare", &["healthcare", "medical", "pharma", "gesundheitswesen", "medizin"]),
    ("technology", &["software", "it ", "tech industry", "informatik"]),
    ("marketing", &["marketing", "sales", "vertrieb"]),
    ("legal", &["legal", "law firm", "jurist", "anwalt"]),
];

/// Fixed stated-interest vocabulary.
const INTERESTS: &[(&str, &[&str])] = &[
    ("digital", &["digital", "digitalisierung"]),
    ("innovation", &["innovation"]),
    ("technology", &["technology", "technologie", "tech"]),
    ("strategy", &["strategy", "strategie"]),
    ("leadership", &["leadership development", "führungskompetenz"]),
    ("general management", &["general management", "allgemeines management"]),
];

const HANDOVER_KEYWORDS: &[&str] = &[
    "speak to a human",
    "talk to a person",
    "human advisor",
    "real person",
    "appointment",
    "schedule a call",
    "mit einem menschen",
    "persönlichen berater",
    "mitarbeiter sprechen",
    "termin vereinbaren",
    "beratungstermin",
];

fn parse_years(re: &Regex, text: &str) -> Option<u8> {
    re.captures(text)
        .and_then(|caps| caps[1].parse::<u8>().ok())
}

fn match_vocabulary(text: &str, vocab: &[(&str, &[&str])]) -> Option<String> {
    let lower = text.to_lowercase();
    for (canonical, keywords) in vocab {
        if keywords.iter().any(|kw| lower.contains(kw)) {
            return Some(canonical.to_string());
        }
    }
    None
}

pub fn detect_handover_request(text: &str) -> bool {
    let lower = text.to_lowercase();
    HANDOVER_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Explicit program mentions, most specific first so "international emba"
/// does not also register the plain EMBA.
pub fn detect_program_mentions(text: &str) -> Vec<Program> {
    let lower = text.to_lowercase();
    let mut mentioned = Vec::new();
    for program in [Program::InternationalEmba, Program::DigitalEmba, Program::Emba] {
        if program
            .mention_keywords()
            .iter()
            .any(|kw| lower.contains(kw))
        {
            // A specific variant mention subsumes the plain EMBA substring
            if program == Program::Emba
                && (mentioned.contains(&Program::InternationalEmba)
                    || mentioned.contains(&Program::DigitalEmba))
            {
                continue;
            }
            mentioned.push(program);
        }
    }
    mentioned
}

/// Run all extractors over one turn's combined text and fold the results into
/// the session state. Fields already set are never overwritten.
pub fn update_state_from_turn(state: &mut ConversationState, combined_text: &str) {
    let profile = &mut state.profile;

    if profile.experience_years.is_none() {
        profile.experience_years = parse_years(&EXPERIENCE_RE, combined_text);
    }
    if profile.leadership_years.is_none() {
        profile.leadership_years = parse_years(&LEADERSHIP_RE, combined_text);
    }
    if profile.field.is_none() {
        profile.field = match_vocabulary(combined_text, FIELDS);
    }
    if profile.interest.is_none() {
        profile.interest = match_vocabulary(combined_text, INTERESTS);
    }
    if profile.name.is_none() {
        profile.name = NAME_RE
            .captures(combined_text)
            .map(|caps| caps[1].to_string());
    }

    if !state.handover_requested && detect_handover_request(combined_text) {
        state.handover_requested = true;
        tracing::info!(session = %state.session_id, "Handover request detected");
    }

    for program in detect_program_mentions(combined_text) {
        if !state.mentioned_programs.contains(&program) {
            state.mentioned_programs.push(program);
        }
    }

    // Suggested program is computed once and never recomputed
    if state.suggested_program.is_none() {
        state.suggested_program = suggest_program(&state.profile, &state.mentioned_programs);
        if let Some(program) = state.suggested_program {
            tracing::info!(
                session = %state.session_id,
                program = program.id(),
                "Program suggestion derived"
            );
        }
    }
}

/// Threshold-derived program suggestion. An explicit program mention always
/// takes precedence over the derived heuristic.
pub fn suggest_program(profile: &UserProfile, mentioned: &[Program]) -> Option<Program> {
    if let Some(first) = mentioned.first() {
        return Some(*first);
    }

    let experience = profile.experience_years.unwrap_or(0);
    let leadership = profile.leadership_years.unwrap_or(0);

    if experience >= 5 && leadership >= 2 {
        return Some(Program::Emba);
    }
    if experience >= 3 {
        return Some(Program::InternationalEmba);
    }
    if let Some(ref interest) = profile.interest {
        if ["digital", "innovation", "technology"].contains(&interest.as_str()) {
            return Some(Program::DigitalEmba);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_experience_extraction_en_and_de() {
        let mut state = ConversationState::new();
        update_state_from_turn(&mut state, "I have 8 years of work experience in banking.");
        assert_eq!(state.profile.experience_years, Some(8));
        assert_eq!(state.profile.field.as_deref(), Some("finance"));

        let mut state = ConversationState::new();
        update_state_from_turn(&mut state, "Ich habe 12 Jahre Berufserfahrung.");
        assert_eq!(state.profile.experience_years, Some(12));
    }

    #[test]
    fn test_fields_write_once() {
        let mut state = ConversationState::new();
        update_state_from_turn(&mut state, "I have 8 years of experience");
        update_state_from_turn(&mut state, "Actually, 20 years of experience");
        assert_eq!(state.profile.experience_years, Some(8));
    }

    #[test]
    fn test_name_extraction() {
        let mut state = ConversationState::new();
        update_state_from_turn(&mut state, "Hello, my name is Claudia and I work in consulting.");
        assert_eq!(state.profile.name.as_deref(), Some("Claudia"));
    }

    #[test]
    fn test_suggestion_thresholds() {
        let mut profile = UserProfile::default();
        profile.experience_years = Some(6);
        profile.leadership_years = Some(3);
        assert_eq!(suggest_program(&profile, &[]), Some(Program::Emba));

        let mut profile = UserProfile::default();
        profile.experience_years = Some(4);
        assert_eq!(
            suggest_program(&profile, &[]),
            Some(Program::InternationalEmba)
        );

        let mut profile = UserProfile::default();
        profile.interest = Some("digital".to_string());
        assert_eq!(suggest_program(&profile, &[]), Some(Program::DigitalEmba));

        assert_eq!(suggest_program(&UserProfile::default(), &[]), None);
    }

    #[test]
    fn test_explicit_mention_beats_thresholds() {
        let mut profile = UserProfile::default();
        profile.experience_years = Some(10);
        profile.leadership_years = Some(5);
        assert_eq!(
            suggest_program(&profile, &[Program::DigitalEmba]),
            Some(Program::DigitalEmba)
        );
    }

    #[test]
    fn test_suggestion_never_recomputed() {
        let mut state = ConversationState::new();
        update_state_from_turn(&mut state, "I am interested in the digital emba");
        assert_eq!(state.suggested_program, Some(Program::DigitalEmba));
        update_state_from_turn(&mut state, "I have 9 years of experience and 4 years of leadership");
        assert_eq!(state.suggested_program, Some(Program::DigitalEmba));
    }

    #[test]
    fn test_specific_mention_subsumes_plain_emba() {
        let mentions = detect_program_mentions("tell me about the international emba");
        assert_eq!(mentions, vec![Program::InternationalEmba]);
    }

    #[test]
    fn test_handover_detection() {
        assert!(detect_handover_request("Can I schedule a call with an advisor?"));
        assert!(detect_handover_request("Ich möchte einen Termin vereinbaren."));
        assert!(!detect_handover_request("What does the program cost?"));
    }
}
