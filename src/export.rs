//! Export the knowledge base as JSON for inspection or backup.
//!
//! Embeddings are left out; everything else about each item is kept.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use crate::models::ChunkMetadata;
use crate::store::KnowledgeStore;

#[derive(Serialize)]
struct ExportItem<'a> {
    id: &'a str,
    content: &'a str,
    metadata: &'a ChunkMetadata,
    content_hash: &'a str,
    timestamp: &'a str,
}

/// Write all knowledge items as a pretty JSON array and return the count.
///
/// If `output` is `None`, the JSON goes to stdout for piping.
pub fn export_knowledge(store: &KnowledgeStore, output: Option<&Path>) -> Result<usize> {
    let items: Vec<ExportItem<'_>> = store
        .knowledge_items()
        .iter()
        .map(|item| ExportItem {
            id: &item.id,
            content: &item.content,
            metadata: &item.metadata,
            content_hash: &item.content_hash,
            timestamp: &item.timestamp,
        })
        .collect();
    let count = items.len();
    let json = serde_json::to_string_pretty(&items)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, &json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Exported {} knowledge items to {}", count, path.display());
        }
        None => {
            println!("{}", json);
        }
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn export_omits_embeddings() {
        let tmp = TempDir::new().unwrap();
        let mut store = KnowledgeStore::open(&tmp.path().join("store")).unwrap();
        store
            .add_knowledge(
                "Group classes are 299 per month.",
                ChunkMetadata {
                    source: "pricing.pdf".into(),
                    category: "Pricing".into(),
                    file_type: "pdf".into(),
                    page: Some(2),
                    chunk_id: "pricing.pdf_2_0".into(),
                },
                vec![0.5, 0.5],
            )
            .unwrap();

        let out = tmp.path().join("out/export.json");
        let count = export_knowledge(&store, Some(&out)).unwrap();
        assert_eq!(count, 1);

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        let first = &json[0];
        assert_eq!(first["content"], "Group classes are 299 per month.");
        assert_eq!(first["metadata"]["page"], 2);
        assert!(first.get("embedding").is_none());
    }
}
