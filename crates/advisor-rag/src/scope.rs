//! Scope guardian — keyword-based topic/safety classification and the
//! escalation policy that decides when a conversation is handed to a human
//! advisor.
//!
//! Classification is deterministic and priority-ordered; it never calls the
//! model, so off-topic turns cost nothing.

use crate::language::Language;

/// Classification of a user turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeCategory {
    OnTopic,
    OffTopic,
    FinancialPlanning,
    Aggressive,
}

/// The kind of human handover an escalation triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationKind {
    EscalateOffTopic,
    EscalateFinancial,
    EscalateAggressive,
}

const AGGRESSIVE_EN: &[&str] = &[
    "idiot", "stupid", "shut up", "useless", "hate you", "scam", "fraud", "garbage",
    "worst", "sue you",
];

const AGGRESSIVE_DE: &[&str] = &[
    "idiot", "dumm", "halt die klappe", "nutzlos", "hasse", "betrug", "abzocke",
    "schrott", "verklagen",
];

const OFF_TOPIC_EN: &[&str] = &[
    "weather", "football", "soccer", "recipe", "movie", "holiday booking", "lottery",
    "crypto trading", "dating", "horoscope", "bitcoin price",
];

const OFF_TOPIC_DE: &[&str] = &[
    "wetter", "fussball", "fußball", "rezept", "film", "urlaubsbuchung", "lotto",
    "krypto", "horoskop",
];

const FINANCIAL_EN: &[&str] = &[
    "loan", "mortgage", "investment advice", "tax advice", "financing plan",
    "credit", "installment plan", "scholarship negotiation",
];

const FINANCIAL_DE: &[&str] = &[
    "kredit", "darlehen", "hypothek", "anlageberatung", "steuerberatung",
    "finanzierungsplan", "ratenzahlung",
];

fn tokenize(message: &str) -> Vec<String> {
    message
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whole-token keyword match; multi-word keywords must appear as a
/// contiguous token sequence. "credit" does not match inside "credits" or
/// "accreditation".
fn contains_keyword(tokens: &[String], keyword: &str) -> bool {
    let words: Vec<&str> = keyword.split_whitespace().collect();
    if words.is_empty() || words.len() > tokens.len() {
        return false;
    }
    tokens
        .windows(words.len())
        .any(|window| window.iter().zip(&words).all(|(t, w)| t == w))
}

fn contains_any(tokens: &[String], keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| contains_keyword(tokens, kw))
}

/// Classify a user message. Priority order is fixed:
/// aggressive > off_topic > financial_planning > on_topic, first match wins.
///
/// Matching is case-insensitive on whole tokens.
///
/// Aggressive keywords are checked across both language keyword sets
/// regardless of the declared language — hostile input does not respect
/// language locking.
pub fn check_scope(message: &str, language: Language) -> ScopeCategory {
    let tokens = tokenize(message);

    if contains_any(&tokens, AGGRESSIVE_EN) || contains_any(&tokens, AGGRESSIVE_DE) {
        tracing::info!(language = language.code(), "Scope: aggressive keyword match");
        return ScopeCategory::Aggressive;
    }

    let (off_topic, financial) = match language {
        Language::German => (OFF_TOPIC_DE, FINANCIAL_DE),
        Language::English => (OFF_TOPIC_EN, FINANCIAL_EN),
    };

    if contains_any(&tokens, off_topic) {
        tracing::info!(language = language.code(), "Scope: off-topic keyword match");
        return ScopeCategory::OffTopic;
    }

    if contains_any(&tokens, financial) {
        tracing::info!(language = language.code(), "Scope: financial-planning keyword match");
        return ScopeCategory::FinancialPlanning;
    }

    ScopeCategory::OnTopic
}

/// Decide whether a scope violation escalates to a human.
///
/// `attempt_count` is the session's monotonically increasing violation
/// counter (reset to zero on any on-topic turn):
/// - aggressive: first offense is a warning, escalates at the second
/// - off_topic: escalates at the second consecutive violation
/// - financial_planning: always escalates (routed to humans unconditionally)
/// - on_topic: never escalates
pub fn should_escalate(
    category: ScopeCategory,
    attempt_count: u32,
) -> (bool, Option<EscalationKind>) {
    match category {
        ScopeCategory::OnTopic => (false, None),
        ScopeCategory::FinancialPlanning => (true, Some(EscalationKind::EscalateFinancial)),
        ScopeCategory::OffTopic => {
            if attempt_count >= 2 {
                (true, Some(EscalationKind::EscalateOffTopic))
            } else {
                (false, Some(EscalationKind::EscalateOffTopic))
            }
        }
        ScopeCategory::Aggressive => {
            if attempt_count >= 2 {
                (true, Some(EscalationKind::EscalateAggressive))
            } else {
                (false, Some(EscalationKind::EscalateAggressive))
            }
        }
    }
}

/// Redirect message shown for a non-escalated scope violation.
/// Pure lookup; absent pairs degrade to the English off-topic text.
pub fn get_redirect_message(category: ScopeCategory, language: Language) -> &'static str {
    match (category, language) {
        (ScopeCategory::OffTopic, Language::English) => {
            "I can help with questions about our executive-education programs — \
             admission, curriculum, fees, and schedules. What would you like to know?"
        }
        (ScopeCategory::OffTopic, Language::German) => {
            "Ich helfe gerne bei Fragen zu unseren Weiterbildungsprogrammen — \
             Zulassung, Curriculum, Gebühren und Termine. Was möchten Sie wissen?"
        }
        (ScopeCategory::Aggressive, Language::English) => {
            "I understand this can be frustrating. Let's keep the conversation \
             respectful — how can I help you with our programs?"
        }
        (ScopeCategory::Aggressive, Language::German) => {
            "Ich verstehe, dass das frustrierend sein kann. Lassen Sie uns \
             respektvoll bleiben — wie kann ich Ihnen bei unseren Programmen helfen?"
        }
        // Financial planning is always escalated, but keep a redirect as the
        // degraded fallback for absent pairs.
        _ => {
            "I can help with questions about our executive-education programs — \
             admission, curriculum, fees, and schedules. What would you like to know?"
        }
    }
}

/// Escalation message shown when the conversation is handed to a human.
pub fn get_escalation_message(kind: EscalationKind, language: Language) -> &'static str {
    match (kind, language) {
        (EscalationKind::EscalateFinancial, Language::English) => {
            "Questions about financing are best answered by our admissions team. \
             I have flagged your conversation — an advisor will reach out to you shortly."
        }
        (EscalationKind::EscalateFinancial, Language::German) => {
            "Fragen zur Finanzierung beantwortet am besten unser Zulassungsteam. \
             Ich habe Ihr Anliegen weitergeleitet — ein Berater meldet sich in Kürze bei Ihnen."
        }
        (EscalationKind::EscalateOffTopic, Language::English) => {
            "It looks like I am not the right contact for this. I have forwarded \
             your conversation to a human advisor who will follow up with you."
        }
        (EscalationKind::EscalateOffTopic, Language::German) => {
            "Es scheint, dass ich hierfür nicht der richtige Ansprechpartner bin. \
             Ich habe Ihr Gespräch an einen persönlichen Berater weitergeleitet."
        }
        (EscalationKind::EscalateAggressive, Language::English) => {
            "I am handing this conversation over to a member of our team who can \
             assist you personally."
        }
        (EscalationKind::EscalateAggressive, Language::German) => {
            "Ich übergebe dieses Gespräch an ein Mitglied unseres Teams, das Ihnen \
             persönlich weiterhelfen kann."
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_topic_passes() {
        assert_eq!(
            check_scope("What does the EMBA cost?", Language::English),
            ScopeCategory::OnTopic
        );
    }

    #[test]
    fn test_keyword_inside_longer_word_does_not_match() {
        // "credits" and "accreditation" must not trip the "credit" keyword
        assert_eq!(
            check_scope(
                "How many ECTS credits does the EMBA include?",
                Language::English
            ),
            ScopeCategory::OnTopic
        );
        assert_eq!(
            check_scope(
                "Does the program hold an international accreditation?",
                Language::English
            ),
            ScopeCategory::OnTopic
        );
        // "Filmwirtschaft" must not trip the off-topic "film" keyword
        assert_eq!(
            check_scope(
                "Gibt es Wahlmodule zur Filmwirtschaft im Curriculum?",
                Language::German
            ),
            ScopeCategory::OnTopic
        );
    }

    #[test]
    fn test_multi_word_keywords_match_token_sequences() {
        assert_eq!(
            check_scope("Can you give me investment advice?", Language::English),
            ScopeCategory::FinancialPlanning
        );
        assert_eq!(
            check_scope("Halt die Klappe!", Language::German),
            ScopeCategory::Aggressive
        );
        // Same words in a different order are not a match
        assert_eq!(
            check_scope("I value good advice on my investment in education", Language::English),
            ScopeCategory::OnTopic
        );
    }

    #[test]
    fn test_priority_aggressive_beats_off_topic() {
        // Contains both an aggressive and an off-topic keyword
        assert_eq!(
            check_scope("this is a scam, tell me about the weather", Language::English),
            ScopeCategory::Aggressive
        );
    }

    #[test]
    fn test_aggressive_cross_language() {
        // German aggressive keyword in a session declared English
        assert_eq!(
            check_scope("Das ist Abzocke!", Language::English),
            ScopeCategory::Aggressive
        );
    }

    #[test]
    fn test_financial_detected_per_language() {
        assert_eq!(
            check_scope("Können Sie mir einen Kredit vermitteln?", Language::German),
            ScopeCategory::FinancialPlanning
        );
    }

    #[test]
    fn test_escalation_thresholds() {
        assert_eq!(should_escalate(ScopeCategory::OffTopic, 1).0, false);
        assert_eq!(
            should_escalate(ScopeCategory::OffTopic, 2),
            (true, Some(EscalationKind::EscalateOffTopic))
        );
        assert_eq!(
            should_escalate(ScopeCategory::FinancialPlanning, 1),
            (true, Some(EscalationKind::EscalateFinancial))
        );
        assert_eq!(should_escalate(ScopeCategory::Aggressive, 1).0, false);
        assert_eq!(should_escalate(ScopeCategory::Aggressive, 2).0, true);
        assert_eq!(should_escalate(ScopeCategory::OnTopic, 99), (false, None));
    }

    #[test]
    fn test_messages_never_empty() {
        for lang in Language::all() {
            for cat in [
                ScopeCategory::OffTopic,
                ScopeCategory::Aggressive,
                ScopeCategory::FinancialPlanning,
            ] {
                assert!(!get_redirect_message(cat, lang).is_empty());
            }
            for kind in [
                EscalationKind::EscalateOffTopic,
                EscalationKind::EscalateFinancial,
                EscalationKind::EscalateAggressive,
            ] {
                assert!(!get_escalation_message(kind, lang).is_empty());
            }
        }
    }
}
