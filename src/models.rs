//! Core data models shared by ingestion, retrieval and the HTTP API.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Provenance attached to every stored chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub category: String,
    pub file_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub chunk_id: String,
}

impl ChunkMetadata {
    /// Look up a metadata field by name, as used by [`MetadataFilter`].
    pub fn field(&self, key: &str) -> Option<String> {
        match key {
            "source" => Some(self.source.clone()),
            "category" => Some(self.category.clone()),
            "file_type" | "type" => Some(self.file_type.clone()),
            "page" => self.page.map(|p| p.to_string()),
            "chunk_id" => Some(self.chunk_id.clone()),
            _ => None,
        }
    }
}

/// An embedded chunk of an uploaded document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
    pub embedding: Vec<f32>,
    pub content_hash: String,
    pub timestamp: String,
}

/// An embedded past FAQ exchange, scoped to one chat session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEntry {
    pub id: String,
    pub session_id: String,
    pub user_input: String,
    pub response: String,
    /// `User: ...\nAssistant: ...`, the text that was embedded.
    pub content: String,
    pub embedding: Vec<f32>,
    pub timestamp: String,
    pub knowledge_items_used: usize,
    pub context_items_used: usize,
    pub selected_category: Option<String>,
}

/// A ranked knowledge item returned from similarity search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
    pub relevance: f32,
}

/// A ranked context entry returned from session-scoped search.
#[derive(Debug, Clone, Serialize)]
pub struct ContextHit {
    pub id: String,
    pub content: String,
    pub timestamp: String,
    pub relevance: f32,
}

/// A single filter condition: exact value, or membership in a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    One(String),
    Any(Vec<String>),
}

/// Conjunction of metadata conditions. Items lacking a filtered key never match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataFilter(pub BTreeMap<String, FilterValue>);

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(category: &str) -> Self {
        Self::new().with("category", FilterValue::One(category.to_string()))
    }

    pub fn with(mut self, key: &str, value: FilterValue) -> Self {
        self.0.insert(key.to_string(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        self.0.iter().all(|(key, expected)| match metadata.field(key) {
            Some(actual) => match expected {
                FilterValue::One(v) => &actual == v,
                FilterValue::Any(vs) => vs.iter().any(|v| v == &actual),
            },
            None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(category: &str, page: Option<u32>) -> ChunkMetadata {
        ChunkMetadata {
            source: "pricing.pdf".to_string(),
            category: category.to_string(),
            file_type: "pdf".to_string(),
            page,
            chunk_id: "pricing.pdf_1_0".to_string(),
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(MetadataFilter::new().matches(&meta("Pricing", None)));
    }

    #[test]
    fn exact_and_list_conditions() {
        let m = meta("Pricing", Some(1));
        assert!(MetadataFilter::category("Pricing").matches(&m));
        assert!(!MetadataFilter::category("Teachers").matches(&m));

        let any = MetadataFilter::new().with(
            "category",
            FilterValue::Any(vec!["Teachers".into(), "Pricing".into()]),
        );
        assert!(any.matches(&m));
    }

    #[test]
    fn missing_key_never_matches() {
        let f = MetadataFilter::new().with("page", FilterValue::One("1".into()));
        assert!(!f.matches(&meta("Pricing", None)));
        assert!(f.matches(&meta("Pricing", Some(1))));

        let unknown = MetadataFilter::new().with("author", FilterValue::One("x".into()));
        assert!(!unknown.matches(&meta("Pricing", Some(1))));
    }

    #[test]
    fn filter_deserializes_scalar_or_list() {
        let f: MetadataFilter =
            serde_json::from_str(r#"{"category": ["Pricing", "Other"], "source": "a.pdf"}"#)
                .unwrap();
        assert_eq!(
            f.0.get("category"),
            Some(&FilterValue::Any(vec!["Pricing".into(), "Other".into()]))
        );
        assert_eq!(f.0.get("source"), Some(&FilterValue::One("a.pdf".into())));
    }
}
