//! LLM-judged response quality scoring.
//!
//! Advisory only: scores feed the response's confidence signal, and any
//! judge failure (provider error, malformed JSON) degrades to `None` without
//! affecting the turn.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::language::Language;
use crate::llm::{ChatMessage, ChatResponse, GenerationConfig, ModelChain};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityScores {
    pub relevance: f32,
    pub completeness: f32,
    pub language_consistency: f32,
    pub groundedness: f32,
}

impl QualityScores {
    pub fn overall(&self) -> f32 {
        let clamp = |v: f32| v.clamp(0.0, 1.0);
        (clamp(self.relevance)
            + clamp(self.completeness)
            + clamp(self.language_consistency)
            + clamp(self.groundedness))
            / 4.0
    }
}

const JUDGE_PROMPT: &str = "You are a strict quality judge for a university \
advisory chatbot. Score the assistant response on four dimensions from 0.0 \
to 1.0 and reply with ONLY a JSON object:\n\
{\"relevance\": _, \"completeness\": _, \"language_consistency\": _, \"groundedness\": _}\n\
- relevance: does the response answer the user's question?\n\
- completeness: does it cover the question fully without padding?\n\
- language_consistency: is the entire response in the expected language?\n\
- groundedness: does it stick to program facts rather than invented claims?";

pub struct QualityScorer {
    chain: Arc<ModelChain>,
    config: GenerationConfig,
}

impl QualityScorer {
    pub fn new(chain: Arc<ModelChain>) -> Self {
        Self {
            chain,
            config: GenerationConfig {
                max_tokens: 256,
                temperature: 0.0,
                timeout_secs: 30,
            },
        }
    }

    pub async fn score(
        &self,
        query: &str,
        response: &str,
        language: Language,
    ) -> Option<QualityScores> {
        let user = format!(
            "Expected language: {}\n\nUser question:\n{}\n\nAssistant response:\n{}",
            language.name(),
            query,
            response
        );
        let messages = [ChatMessage::system(JUDGE_PROMPT), ChatMessage::user(user)];

        match self.chain.chat(&messages, &[], &self.config).await {
            Ok(ChatResponse::Content(text)) => match parse_scores(&text) {
                Some(scores) => Some(scores),
                None => {
                    tracing::warn!("Quality judge returned unparseable output");
                    None
                }
            },
            Ok(ChatResponse::ToolCalls(_)) => {
                tracing::warn!("Quality judge unexpectedly requested tool calls");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Quality scoring failed, proceeding without scores");
                None
            }
        }
    }
}

/// Extract the first JSON object from judge output, tolerating code fences
/// and surrounding prose.
pub fn parse_scores(text: &str) -> Option<QualityScores> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let scores = parse_scores(
            r#"{"relevance": 0.9, "completeness": 0.8, "language_consistency": 1.0, "groundedness": 0.7}"#,
        )
        .unwrap();
        assert!((scores.overall() - 0.85).abs() < 1e-6);
    }

    #[test]
    fn test_parse_fenced_json() {
        let text = "Here are the scores:\n```json\n{\"relevance\": 1.0, \"completeness\": 1.0, \"language_consistency\": 1.0, \"groundedness\": 1.0}\n```";
        assert!(parse_scores(text).is_some());
    }

    #[test]
    fn test_parse_garbage_degrades_to_none() {
        assert!(parse_scores("the response was pretty good").is_none());
        assert!(parse_scores("{not json}").is_none());
    }

    #[test]
    fn test_overall_clamps_out_of_range() {
        let scores = QualityScores {
            relevance: 2.0,
            completeness: -1.0,
            language_consistency: 1.0,
            groundedness: 1.0,
        };
        assert!((scores.overall() - 0.75).abs() < 1e-6);
    }
}
