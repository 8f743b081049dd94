//! Title-aware chunking of partitioned elements.
//!
//! Elements are grouped into sections at title boundaries; each section is
//! emitted as one chunk unless it exceeds the character budget, in which case
//! it is split at sentence boundaries. Fragments below the minimum size are
//! merged into their predecessor so retrieval never ranks a dangling heading.

use crate::pipeline::partition::{Element, ElementKind};

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    pub max_chars: usize,
    /// Chunks shorter than this are merged with the previous chunk.
    pub min_chars: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chars: 1500,
            min_chars: 200,
        }
    }
}

pub struct TitleChunker {
    config: ChunkerConfig,
}

impl TitleChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Produce chunk texts from an element stream. Section titles are
    /// prefixed onto every chunk cut from that section so context survives
    /// the split.
    pub fn chunk(&self, elements: &[Element]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut title: Option<String> = None;
        let mut body = String::new();

        for element in elements {
            match element.kind {
                ElementKind::Title => {
                    self.flush_section(title.as_deref(), &body, &mut chunks);
                    title = Some(element.text.clone());
                    body.clear();
                }
                ElementKind::Narrative => {
                    if !body.is_empty() {
                        body.push_str("\n\n");
                    }
                    body.push_str(&element.text);
                }
            }
        }
        self.flush_section(title.as_deref(), &body, &mut chunks);

        merge_small_chunks(chunks, self.config.min_chars)
    }

    fn flush_section(&self, title: Option<&str>, body: &str, chunks: &mut Vec<String>) {
        let body = body.trim();
        if body.is_empty() {
            // A title with no body is carried nowhere; it would only add noise
            return;
        }

        let prefix = title.map(|t| format!("{}\n\n", t)).unwrap_or_default();
        let budget = self.config.max_chars.saturating_sub(prefix.len()).max(1);

        for part in split_at_sentences(body, budget) {
            chunks.push(format!("{}{}", prefix, part));
        }
    }
}

/// Split text into pieces of at most `max_chars`, breaking after sentence
/// terminators where possible and hard-splitting only pathological
/// punctuation-free runs.
fn split_at_sentences(text: &str, max_chars: usize) -> Vec<String> {
    if text.len() <= max_chars {
        return vec![text.to_string()];
    }

    let mut pieces = Vec::new();
    let mut current = String::new();

    for sentence in split_sentences(text) {
        if !current.is_empty() && current.len() + sentence.len() + 1 > max_chars {
            pieces.push(current.trim().to_string());
            current.clear();
        }
        if sentence.len() > max_chars {
            // No sentence boundary to use; split on char boundaries
            let mut rest = sentence;
            while rest.len() > max_chars {
                let mut cut = max_chars;
                while !rest.is_char_boundary(cut) {
                    cut -= 1;
                }
                pieces.push(rest[..cut].to_string());
                rest = &rest[cut..];
            }
            current.push_str(rest);
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(sentence);
        }
    }
    if !current.trim().is_empty() {
        pieces.push(current.trim().to_string());
    }
    pieces
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();

    for (i, &b) in bytes.iter().enumerate() {
        let terminal = matches!(b, b'.' | b'!' | b'?');
        let at_end = i + 1 == bytes.len();
        let followed_by_space = !at_end && bytes[i + 1].is_ascii_whitespace();
        if terminal && (at_end || followed_by_space) {
            let sentence = text[start..=i].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = i + 1;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

fn merge_small_chunks(chunks: Vec<String>, min_chars: usize) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        if chunk.len() < min_chars {
            if let Some(previous) = merged.last_mut() {
                previous.push_str("\n\n");
                previous.push_str(&chunk);
                continue;
            }
        }
        merged.push(chunk);
    }
    merged
}
