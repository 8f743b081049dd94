//! Source partitioning: turn heterogeneous inputs (plain text, markdown,
//! JSON exports, PDFs, web pages) into a flat element stream for the chunker.

use std::path::Path;

/// Structural role of a partitioned element. Titles act as section
/// boundaries during chunking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Title,
    Narrative,
}

#[derive(Debug, Clone)]
pub struct Element {
    pub kind: ElementKind,
    pub text: String,
}

impl Element {
    pub fn title(text: impl Into<String>) -> Self {
        Self {
            kind: ElementKind::Title,
            text: text.into(),
        }
    }

    pub fn narrative(text: impl Into<String>) -> Self {
        Self {
            kind: ElementKind::Narrative,
            text: text.into(),
        }
    }
}

/// Partition a file by extension. Unknown extensions are treated as plain
/// text; binary formats that fail to parse are reported, not skipped.
pub fn partition_file(path: &Path) -> anyhow::Result<Vec<Element>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => partition_pdf(path),
        "json" => {
            let content = std::fs::read_to_string(path)?;
            partition_json(&content)
        }
        _ => {
            let content = std::fs::read_to_string(path)?;
            Ok(partition_text(&content))
        }
    }
}

/// Plain text and markdown: `#`-prefixed lines become titles, blank-line
/// separated paragraphs become narrative elements.
pub fn partition_text(content: &str) -> Vec<Element> {
    let mut elements = Vec::new();
    let mut paragraph = String::new();

    let flush = |paragraph: &mut String, elements: &mut Vec<Element>| {
        let text = paragraph.trim();
        if !text.is_empty() {
            elements.push(Element::narrative(text));
        }
        paragraph.clear();
    };

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            flush(&mut paragraph, &mut elements);
        } else if let Some(heading) = trimmed.strip_prefix('#') {
            flush(&mut paragraph, &mut elements);
            let heading = heading.trim_start_matches('#').trim();
            if !heading.is_empty() {
                elements.push(Element::title(heading));
            }
        } else {
            if !paragraph.is_empty() {
                paragraph.push(' ');
            }
            paragraph.push_str(trimmed);
        }
    }
    flush(&mut paragraph, &mut elements);

    elements
}

/// JSON exports: object keys become titles, string leaves become narrative.
/// Non-string scalars are skipped; arrays are walked in order.
pub fn partition_json(content: &str) -> anyhow::Result<Vec<Element>> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    let mut elements = Vec::new();
    walk_json(&value, &mut elements);
    Ok(elements)
}

fn walk_json(value: &serde_json::Value, elements: &mut Vec<Element>) {
    match value {
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                elements.push(Element::narrative(trimmed));
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                walk_json(item, elements);
            }
        }
        serde_json::Value::Object(map) => {
            for (key, inner) in map {
                if inner.is_string() || inner.is_array() || inner.is_object() {
                    elements.push(Element::title(key.clone()));
                }
                walk_json(inner, elements);
            }
        }
        _ => {}
    }
}

pub fn partition_pdf(path: &Path) -> anyhow::Result<Vec<Element>> {
    let text = pdf_extract::extract_text(path)
        .map_err(|e| anyhow::anyhow!("failed to extract PDF {}: {}", path.display(), e))?;
    Ok(partition_text(&text))
}

/// Fetch and partition a web page: headings become titles, paragraph and
/// list-item text becomes narrative. Scripts and styles never leak in.
pub async fn partition_url(url: &str, client: &reqwest::Client) -> anyhow::Result<Vec<Element>> {
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        anyhow::bail!("fetch of {} returned status {}", url, response.status());
    }
    let html = response.text().await?;
    Ok(partition_html(&html))
}

pub fn partition_html(html: &str) -> Vec<Element> {
    let document = scraper::Html::parse_document(html);
    let selector =
        scraper::Selector::parse("h1, h2, h3, h4, h5, h6, p, li, td").expect("html selector");

    let mut elements = Vec::new();
    for node in document.select(&selector) {
        let text = node.text().collect::<Vec<_>>().join(" ");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            continue;
        }
        let kind = match node.value().name() {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => ElementKind::Title,
            _ => ElementKind::Narrative,
        };
        elements.push(Element { kind, text });
    }
    elements
}
