//! Knowledge-base statistics.
//!
//! Summarises what has been ingested: item counts per category and per
//! file type, plus context size. Used by `tutor stats`.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::Config;
use crate::models::KnowledgeItem;
use crate::store::KnowledgeStore;

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct KnowledgeStats {
    pub total: usize,
    pub by_category: BTreeMap<String, usize>,
    pub by_file_type: BTreeMap<String, usize>,
}

impl KnowledgeStats {
    pub fn from_items(items: &[KnowledgeItem]) -> Self {
        let mut stats = KnowledgeStats {
            total: items.len(),
            ..Default::default()
        };
        for item in items {
            *stats
                .by_category
                .entry(item.metadata.category.clone())
                .or_insert(0) += 1;
            *stats
                .by_file_type
                .entry(item.metadata.file_type.clone())
                .or_insert(0) += 1;
        }
        stats
    }
}

/// Run the stats command: load the store and print a summary.
pub fn run_stats(config: &Config) -> Result<()> {
    let store = KnowledgeStore::open(&config.store.path)?;
    let stats = store.stats();

    let store_size: u64 = ["knowledge_base.json", "context_base.json"]
        .iter()
        .filter_map(|f| std::fs::metadata(config.store.path.join(f)).ok())
        .map(|m| m.len())
        .sum();

    println!("Knowledge Base Stats");
    println!("====================");
    println!();
    println!("  Store:       {}", config.store.path.display());
    println!("  Size:        {}", format_bytes(store_size));
    println!();
    println!("  Knowledge:   {}", stats.total);
    println!("  Context:     {}", store.context_len());

    if !stats.by_category.is_empty() {
        println!();
        println!("  {:<28} {:>8}", "CATEGORY", "ITEMS");
        println!("  {}", "-".repeat(37));
        for (category, count) in &stats.by_category {
            println!("  {:<28} {:>8}", category, count);
        }
    }

    if !stats.by_file_type.is_empty() {
        println!();
        println!("  {:<28} {:>8}", "FILE TYPE", "ITEMS");
        println!("  {}", "-".repeat(37));
        for (file_type, count) in &stats.by_file_type {
            println!("  {:<28} {:>8}", file_type, count);
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;

    fn item(category: &str, file_type: &str) -> KnowledgeItem {
        KnowledgeItem {
            id: "id".into(),
            content: "text".into(),
            metadata: ChunkMetadata {
                source: "f".into(),
                category: category.into(),
                file_type: file_type.into(),
                page: None,
                chunk_id: "f_0".into(),
            },
            embedding: vec![],
            content_hash: String::new(),
            timestamp: String::new(),
        }
    }

    #[test]
    fn counts_by_category_and_type() {
        let items = vec![
            item("Pricing", "pdf"),
            item("Pricing", "rtf"),
            item("Teachers", "pdf"),
        ];
        let stats = KnowledgeStats::from_items(&items);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_category["Pricing"], 2);
        assert_eq!(stats.by_category["Teachers"], 1);
        assert_eq!(stats.by_file_type["pdf"], 2);
        assert_eq!(stats.by_file_type["rtf"], 1);
    }

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
