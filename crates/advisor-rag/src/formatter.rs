//! Response post-processing: markdown-table flattening, word-budget chunking
//! with sentence-aware break points, and whitespace cleanup.
//!
//! Chat widgets render bullet lists far better than raw markdown tables, and
//! long answers are truncated at a sentence boundary with an explicit
//! continuation prompt instead of being cut mid-thought.

/// Which agent produced the response — each role has its own word budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentRole {
    Lead,
    Sub,
}

/// Word budgets and chunking window, configured per deployment.
#[derive(Debug, Clone)]
pub struct FormatterConfig {
    pub lead_max_words: usize,
    pub sub_max_words: usize,
    /// Search window (± words) around the budget for a sentence boundary.
    pub boundary_window: usize,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            lead_max_words: 180,
            sub_max_words: 250,
            boundary_window: 20,
        }
    }
}

pub const CONTINUATION_PROMPT: &str = "\n\n*Would you like me to continue?*";

fn is_separator_row(line: &str, expected_cols: usize) -> bool {
    let trimmed = line.trim();
    if !trimmed.starts_with('|') {
        return false;
    }
    let cells: Vec<&str> = split_table_row(trimmed);
    cells.len() == expected_cols
        && cells
            .iter()
            .all(|c| !c.is_empty() && c.chars().all(|ch| ch == '-' || ch == ':'))
}

fn split_table_row(line: &str) -> Vec<&str> {
    line.trim()
        .trim_start_matches('|')
        .trim_end_matches('|')
        .split('|')
        .map(|c| c.trim())
        .collect()
}

/// Rewrite well-formed markdown tables into bullet lists: one bullet per data
/// row with `**Header**: value` pairs joined by commas.
///
/// A table block is a header row, a separator row, and at least one data row
/// whose column count matches the header. Malformed tables (column-count
/// mismatch) are left untouched.
pub fn remove_tables(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut output: Vec<String> = Vec::with_capacity(lines.len());
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let looks_like_header = line.trim().starts_with('|') && line.contains('|');

        if looks_like_header && i + 2 < lines.len() {
            let headers = split_table_row(line);
            if headers.len() >= 2 && is_separator_row(lines[i + 1], headers.len()) {
                // Collect data rows with a matching column count
                let mut rows: Vec<Vec<&str>> = Vec::new();
                let mut j = i + 2;
                let mut malformed = false;
                while j < lines.len() && lines[j].trim().starts_with('|') {
                    let cells = split_table_row(lines[j]);
                    if cells.len() != headers.len() {
                        malformed = true;
                        break;
                    }
                    rows.push(cells);
                    j += 1;
                }

                if !malformed && !rows.is_empty() {
                    for row in &rows {
                        let pairs: Vec<String> = headers
                            .iter()
                            .zip(row.iter())
                            .map(|(h, v)| format!("**{}**: {}", h, v))
                            .collect();
                        output.push(format!("- {}", pairs.join(", ")));
                    }
                    i = j;
                    continue;
                }
            }
        }

        output.push(line.to_string());
        i += 1;
    }

    output.join("\n")
}

/// Split an over-budget response at a sentence boundary near `max_words`.
///
/// Returns `(primary, continuation)`. Text within budget is returned
/// unchanged with no continuation. Otherwise a break point is searched in a
/// ±`boundary_window`-word range around the budget for a token ending in
/// sentence-terminal punctuation, falling back to exactly `max_words`; the
/// primary chunk gets a fixed continuation prompt appended and the remainder
/// is handed back to the caller.
pub fn chunk_response(
    text: &str,
    max_words: usize,
    boundary_window: usize,
) -> (String, Option<String>) {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return (text.to_string(), None);
    }

    let lo = max_words.saturating_sub(boundary_window).max(1);
    let hi = (max_words + boundary_window).min(words.len());

    let ends_sentence =
        |w: &str| w.ends_with('.') || w.ends_with('!') || w.ends_with('?') || w.ends_with(':');

    // Prefer the boundary closest to the budget, scanning outward
    let mut break_at = None;
    for offset in 0..=(hi - lo) {
        let below = max_words.checked_sub(offset).filter(|i| *i >= lo);
        let above = Some(max_words + offset).filter(|i| *i <= hi);
        for idx in [below, above].into_iter().flatten() {
            if ends_sentence(words[idx - 1]) {
                break_at = Some(idx);
                break;
            }
        }
        if break_at.is_some() {
            break;
        }
    }
    let break_at = break_at.unwrap_or(max_words);

    let mut primary = words[..break_at].join(" ");
    let continuation = words[break_at..].join(" ");
    primary.push_str(CONTINUATION_PROMPT);

    (primary, Some(continuation))
}

/// Collapse runs of 3+ newlines to exactly 2 and trim outer whitespace.
/// Idempotent.
pub fn clean_response(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    let mut newline_run = 0usize;

    for c in text.chars() {
        if c == '\n' {
            newline_run += 1;
            if newline_run <= 2 {
                cleaned.push(c);
            }
        } else {
            newline_run = 0;
            cleaned.push(c);
        }
    }

    cleaned.trim().to_string()
}

/// Full post-processing pass: always flattens tables, then cleans whitespace,
/// then applies the role-specific word budget when chunking is enabled.
pub fn format_response(
    text: &str,
    role: AgentRole,
    enable_chunking: bool,
    config: &FormatterConfig,
) -> (String, Option<String>) {
    let without_tables = remove_tables(text);
    let cleaned = clean_response(&without_tables);

    if !enable_chunking {
        return (cleaned, None);
    }

    let budget = match role {
        AgentRole::Lead => config.lead_max_words,
        AgentRole::Sub => config.sub_max_words,
    };

    chunk_response(&cleaned, budget, config.boundary_window)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_formed_table_becomes_bullets() {
        let text = "Overview:\n\
                    | Program | Duration | Fee |\n\
                    | --- | --- | --- |\n\
                    | EMBA | 18 months | CHF 75000 |\n\
                    | IEMBA | 24 months | CHF 85000 |\n\
                    Done.";
        let result = remove_tables(text);
        let bullets: Vec<&str> = result.lines().filter(|l| l.starts_with("- ")).collect();
        assert_eq!(bullets.len(), 2);
        for bullet in &bullets {
            assert!(bullet.contains("**Program**"));
            assert!(bullet.contains("**Duration**"));
            assert!(bullet.contains("**Fee**"));
        }
        assert!(!result.contains("| ---"));
    }

    #[test]
    fn test_malformed_table_left_untouched() {
        let text = "| A | B |\n| --- | --- |\n| only-one-cell |\n";
        let result = remove_tables(text);
        assert!(result.contains("| only-one-cell |"));
        assert!(result.contains("| A | B |"));
    }

    #[test]
    fn test_short_text_not_chunked() {
        let text = "Short answer.";
        let (primary, rest) = chunk_response(text, 100, 20);
        assert_eq!(primary, text);
        assert!(rest.is_none());
    }

    #[test]
    fn test_long_text_chunked_at_sentence_boundary() {
        let sentence = "This sentence has exactly seven words in it. ";
        let text = sentence.repeat(30); // 240 words
        let (primary, rest) = chunk_response(&text, 100, 20);
        assert!(rest.is_some());

        let body = primary.replace(CONTINUATION_PROMPT, "");
        let count = body.split_whitespace().count();
        assert!(count <= 120, "primary chunk has {} words", count);
        assert!(body.trim_end().ends_with('.'));
    }

    #[test]
    fn test_chunk_fallback_without_boundary() {
        let text = "word ".repeat(200); // no punctuation anywhere
        let (primary, rest) = chunk_response(&text, 100, 20);
        assert!(rest.is_some());
        let body = primary.replace(CONTINUATION_PROMPT, "");
        assert_eq!(body.split_whitespace().count(), 100);
    }

    #[test]
    fn test_clean_response_idempotent() {
        let text = "  Hello\n\n\n\nWorld\n\n";
        let once = clean_response(text);
        assert_eq!(once, "Hello\n\nWorld");
        assert_eq!(clean_response(&once), once);
    }

    #[test]
    fn test_format_response_budgets_by_role() {
        let config = FormatterConfig {
            lead_max_words: 10,
            sub_max_words: 50,
            boundary_window: 5,
        };
        let text = "Ten words here exactly counted one two three four five. More text follows afterwards with several additional words to overflow.";
        let (_, lead_rest) = format_response(text, AgentRole::Lead, true, &config);
        let (_, sub_rest) = format_response(text, AgentRole::Sub, true, &config);
        assert!(lead_rest.is_some());
        assert!(sub_rest.is_none());
    }

    #[test]
    fn test_format_response_chunking_disabled() {
        let config = FormatterConfig::default();
        let text = "word ".repeat(1000);
        let (primary, rest) = format_response(&text, AgentRole::Lead, false, &config);
        assert!(rest.is_none());
        assert!(primary.split_whitespace().count() >= 999);
    }
}
