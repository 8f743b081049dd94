//! Schema-driven chunk property extraction.
//!
//! An ingestion deployment declares the properties it wants attached to each
//! chunk in a JSON schema file. Every declared property must have a matching
//! extractor in the static registry — an unknown property is a configuration
//! error and fails pipeline construction, it is never silently skipped.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::language::{detect_language, Language};
use crate::profile::detect_program_mentions;
use crate::types::Program;

/// Declared chunk properties, loaded from a JSON file:
/// `{ "properties": ["programs", "language"] }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySchema {
    pub properties: Vec<String>,
}

impl PropertySchema {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("failed to read property schema {}: {}", path.display(), e)
        })?;
        let schema: Self = serde_json::from_str(&content).map_err(|e| {
            anyhow::anyhow!("failed to parse property schema {}: {}", path.display(), e)
        })?;
        Ok(schema)
    }

    pub fn with_defaults() -> Self {
        Self {
            properties: vec!["programs".to_string(), "language".to_string()],
        }
    }
}

/// The static extractor registry. One variant per supported property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PropertyExtractor {
    Programs,
    Language,
}

impl PropertyExtractor {
    fn for_property(name: &str) -> Option<Self> {
        match name {
            "programs" => Some(Self::Programs),
            "language" => Some(Self::Language),
            _ => None,
        }
    }
}

/// Properties derived for one chunk.
#[derive(Debug, Clone, Default)]
pub struct ChunkProperties {
    pub programs: Vec<Program>,
    pub language: Option<Language>,
}

/// A compiled set of extractors for one schema. Construction validates every
/// declared property against the registry.
#[derive(Debug, Clone)]
pub struct ExtractorSet {
    extractors: Vec<PropertyExtractor>,
}

impl ExtractorSet {
    pub fn compile(schema: &PropertySchema) -> anyhow::Result<Self> {
        let mut extractors = Vec::with_capacity(schema.properties.len());
        for name in &schema.properties {
            let extractor = PropertyExtractor::for_property(name).ok_or_else(|| {
                anyhow::anyhow!("property '{}' has no registered extractor", name)
            })?;
            if !extractors.contains(&extractor) {
                extractors.push(extractor);
            }
        }
        Ok(Self { extractors })
    }

    pub fn extract(&self, chunk_text: &str) -> ChunkProperties {
        let mut properties = ChunkProperties::default();
        for extractor in &self.extractors {
            match extractor {
                PropertyExtractor::Programs => {
                    properties.programs = detect_program_mentions(chunk_text);
                }
                PropertyExtractor::Language => {
                    properties.language = Some(detect_language(chunk_text));
                }
            }
        }
        properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schema_compiles() {
        let set = ExtractorSet::compile(&PropertySchema::with_defaults()).unwrap();
        let properties =
            set.extract("Das Executive MBA Programm kostet CHF 75'000 und dauert 18 Monate.");
        assert_eq!(properties.programs, vec![Program::Emba]);
        assert_eq!(properties.language, Some(Language::German));
    }

    #[test]
    fn test_unknown_property_is_fatal() {
        let schema = PropertySchema {
            properties: vec!["programs".into(), "sentiment".into()],
        };
        let err = ExtractorSet::compile(&schema).unwrap_err();
        assert!(err.to_string().contains("sentiment"));
    }

    #[test]
    fn test_schema_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        std::fs::write(&path, r#"{"properties": ["language"]}"#).unwrap();

        let schema = PropertySchema::from_file(&path).unwrap();
        let set = ExtractorSet::compile(&schema).unwrap();
        let properties = set.extract("What are the admission requirements for the program?");
        assert_eq!(properties.language, Some(Language::English));
        assert!(properties.programs.is_empty());
    }
}
