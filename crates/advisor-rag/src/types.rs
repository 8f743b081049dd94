use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::language::Language;

/// Executive-education programs the advisor covers.
///
/// Each program gets its own sub-agent; the lead agent routes to them via
/// tool calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Program {
    /// Executive MBA — the flagship program for experienced leaders.
    Emba,
    /// International Executive MBA — global track for mid-career professionals.
    InternationalEmba,
    /// Digital Executive MBA — technology and innovation focus.
    DigitalEmba,
}

impl Program {
    pub fn all() -> [Program; 3] {
        [Self::Emba, Self::InternationalEmba, Self::DigitalEmba]
    }

    pub fn id(&self) -> &'static str {
        match self {
            Self::Emba => "emba",
            Self::InternationalEmba => "international_emba",
            Self::DigitalEmba => "digital_emba",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Emba => "Executive MBA",
            Self::InternationalEmba => "International Executive MBA",
            Self::DigitalEmba => "Digital Executive MBA",
        }
    }

    /// Keywords that count as an explicit mention of this program.
    /// Checked most-specific first by the profile extractor so "international
    /// emba" does not register as a plain EMBA mention.
    pub fn mention_keywords(&self) -> &'static [&'static str] {
        match self {
            Self::Emba => &["emba", "executive mba"],
            Self::InternationalEmba => &["iemba", "international emba", "international executive"],
            Self::DigitalEmba => &["digital emba", "demba", "digital executive"],
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "emba" => Some(Self::Emba),
            "international_emba" => Some(Self::InternationalEmba),
            "digital_emba" => Some(Self::DigitalEmba),
            _ => None,
        }
    }
}

/// Profile fields extracted from conversation text. Each field is write-once:
/// the first non-null extraction wins and later turns never overwrite it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub experience_years: Option<u8>,
    pub leadership_years: Option<u8>,
    pub field: Option<String>,
    pub interest: Option<String>,
    pub name: Option<String>,
}

/// Per-session conversation state, mutated incrementally by the orchestrator.
/// Never reset mid-session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub session_id: Uuid,
    /// Pinned after the first user message when language locking is enabled.
    pub locked_language: Option<Language>,
    pub profile: UserProfile,
    /// Programs the user explicitly mentioned, in order of first mention.
    pub mentioned_programs: Vec<Program>,
    /// Derived once from profile thresholds or explicit mention; never recomputed.
    pub suggested_program: Option<Program>,
    pub handover_requested: bool,
    /// Monotonic per-session scope-violation counter; reset on any on-topic turn.
    pub scope_violations: u32,
    pub user_turns: u32,
}

impl ConversationState {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            locked_language: None,
            profile: UserProfile::default(),
            mentioned_programs: Vec::new(),
            suggested_program: None,
            handover_requested: false,
            scope_violations: 0,
            user_turns: 0,
        }
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}

/// The orchestrator's per-turn output. Immutable after construction; the
/// caller uses the flags for caching and UI-signal decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredAgentResponse {
    pub text: String,
    pub confidence: f32,
    /// True when the turn failed and the fixed apologetic message was substituted.
    pub confidence_fallback: bool,
    pub max_turns_reached: bool,
    pub appointment_requested: bool,
    pub should_cache: bool,
    pub relevant_programs: Vec<Program>,
    pub detected_language: Language,
}

impl StructuredAgentResponse {
    pub fn new(text: impl Into<String>, language: Language) -> Self {
        Self {
            text: text.into(),
            confidence: 1.0,
            confidence_fallback: false,
            max_turns_reached: false,
            appointment_requested: false,
            should_cache: false,
            relevant_programs: Vec::new(),
            detected_language: language,
        }
    }
}

/// A retrievable span of source-document text plus derived metadata.
/// The atomic unit of retrieval and storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalChunk {
    /// Deterministic content hash — the deduplication key. Identical chunk
    /// content always maps to the same id regardless of ingestion run.
    pub chunk_id: String,
    pub text: String,
    pub source: String,
    pub document_id: String,
    pub programs: Vec<Program>,
    pub ingested_at: DateTime<Utc>,
}

impl RetrievalChunk {
    /// Compute the stable chunk id: SHA-256 over the normalized chunk text
    /// (lowercased, whitespace collapsed to single spaces).
    pub fn compute_chunk_id(text: &str) -> String {
        let normalized = text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// A ranked retrieval hit returned to agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalHit {
    pub chunk: RetrievalChunk,
    pub score: f32,
}

/// The value stored in the response cache, keyed by (normalized query, language).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedAnswer {
    pub text: String,
    pub appointment_requested: bool,
    pub relevant_programs: Vec<Program>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_deterministic() {
        let a = RetrievalChunk::compute_chunk_id("The EMBA costs CHF 75,000.");
        let b = RetrievalChunk::compute_chunk_id("The EMBA costs CHF 75,000.");
        assert_eq!(a, b);
    }

    #[test]
    fn test_chunk_id_normalizes_whitespace_and_case() {
        let a = RetrievalChunk::compute_chunk_id("The  EMBA\ncosts CHF 75,000.");
        let b = RetrievalChunk::compute_chunk_id("the emba costs chf 75,000.");
        assert_eq!(a, b);
    }

    #[test]
    fn test_chunk_id_differs_for_different_content() {
        let a = RetrievalChunk::compute_chunk_id("tuition details");
        let b = RetrievalChunk::compute_chunk_id("admission details");
        assert_ne!(a, b);
    }

    #[test]
    fn test_program_mention_roundtrip() {
        for p in Program::all() {
            assert_eq!(Program::from_id(p.id()), Some(p));
        }
    }
}
