//! Language detection and naming for the bilingual advisor.
//!
//! The advisor supports German and English. Detection is stopword-based and
//! deliberately cheap — it runs once per session (language locking) and on
//! every ingested document, so it must not require a model call.

use serde::{Deserialize, Serialize};

/// Supported response languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    German,
    English,
}

impl Language {
    /// ISO 639-1 code, used for cache key prefixes and collection names.
    pub fn code(&self) -> &'static str {
        match self {
            Self::German => "de",
            Self::English => "en",
        }
    }

    /// Human-readable name, used in language directives sent to the model.
    pub fn name(&self) -> &'static str {
        match self {
            Self::German => "German",
            Self::English => "English",
        }
    }

    /// Name of the per-language chunk collection in the retrieval backend.
    /// One collection per language, no cross-language entries.
    pub fn collection_name(&self) -> String {
        format!("chunks_{}", self.code())
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_lowercase().as_str() {
            "de" | "de-ch" | "de-de" | "de-at" => Some(Self::German),
            "en" | "en-us" | "en-gb" => Some(Self::English),
            _ => None,
        }
    }

    pub fn all() -> [Language; 2] {
        [Self::German, Self::English]
    }
}

const GERMAN_STOPWORDS: &[&str] = &[
    "der", "die", "das", "und", "ich", "nicht", "ist", "sie", "wir", "ein", "eine", "für",
    "mit", "auf", "sich", "haben", "werden", "über", "können", "wie", "was", "kostet",
    "möchte", "bitte", "danke", "jahre", "oder", "auch", "dem", "den", "von", "zu",
];

const ENGLISH_STOPWORDS: &[&str] = &[
    "the", "and", "i", "not", "is", "you", "we", "a", "an", "for", "with", "on", "have",
    "will", "about", "can", "how", "what", "cost", "would", "please", "thanks", "years",
    "or", "also", "of", "to", "this", "that", "are", "my", "in",
];

/// Detect the dominant language of `text` by counting stopword hits.
///
/// Falls back to English when the text contains no recognizable stopwords
/// (e.g. a bare number or a program acronym).
pub fn detect_language(text: &str) -> Language {
    let mut german = 0usize;
    let mut english = 0usize;

    for token in text
        .split(|c: char| !c.is_alphanumeric() && c != 'ä' && c != 'ö' && c != 'ü' && c != 'ß')
    {
        if token.is_empty() {
            continue;
        }
        let lower = token.to_lowercase();
        if GERMAN_STOPWORDS.contains(&lower.as_str()) {
            german += 1;
        }
        if ENGLISH_STOPWORDS.contains(&lower.as_str()) {
            english += 1;
        }
    }

    // Umlauts and ß are a strong German signal even without stopword hits
    if german == 0 && text.chars().any(|c| matches!(c, 'ä' | 'ö' | 'ü' | 'ß' | 'Ä' | 'Ö' | 'Ü')) {
        german += 2;
    }

    if german > english {
        Language::German
    } else {
        Language::English
    }
}
