//! Flat-file vector store for knowledge items and conversation context.
//!
//! Both lists live in memory and are written to `knowledge_base.json` and
//! `context_base.json` under the store directory after every mutation.
//! Search is a linear cosine-similarity scan.

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::chunk::content_hash;
use crate::embedding::cosine_similarity;
use crate::models::{ChunkMetadata, ContextEntry, ContextHit, KnowledgeItem, MetadataFilter, SearchHit};
use crate::stats::KnowledgeStats;

const KNOWLEDGE_FILE: &str = "knowledge_base.json";
const CONTEXT_FILE: &str = "context_base.json";

/// A chunk ready to be stored.
#[derive(Debug, Clone)]
pub struct NewKnowledge {
    pub content: String,
    pub metadata: ChunkMetadata,
    pub embedding: Vec<f32>,
}

pub struct KnowledgeStore {
    dir: PathBuf,
    knowledge: Vec<KnowledgeItem>,
    context: Vec<ContextEntry>,
}

impl KnowledgeStore {
    /// Open (or create) the store directory and load both lists.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create store directory: {}", dir.display()))?;

        let knowledge: Vec<KnowledgeItem> = load_list(&dir.join(KNOWLEDGE_FILE));
        let context: Vec<ContextEntry> = load_list(&dir.join(CONTEXT_FILE));
        tracing::info!(
            knowledge = knowledge.len(),
            context = context.len(),
            dir = %dir.display(),
            "store loaded"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            knowledge,
            context,
        })
    }

    pub fn save(&self) -> Result<()> {
        write_list(&self.dir.join(KNOWLEDGE_FILE), &self.knowledge)?;
        write_list(&self.dir.join(CONTEXT_FILE), &self.context)?;
        Ok(())
    }

    pub fn add_knowledge(
        &mut self,
        content: &str,
        metadata: ChunkMetadata,
        embedding: Vec<f32>,
    ) -> Result<String> {
        if content.trim().is_empty() {
            bail!("Cannot add empty content to knowledge base");
        }
        let item = new_item(content, metadata, embedding);
        let id = item.id.clone();
        self.knowledge.push(item);
        self.save()?;
        Ok(id)
    }

    /// Add many chunks with a single save. Blank contents are skipped.
    pub fn add_knowledge_batch(&mut self, items: Vec<NewKnowledge>) -> Result<Vec<String>> {
        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            if item.content.trim().is_empty() {
                tracing::warn!(chunk_id = %item.metadata.chunk_id, "skipping empty chunk");
                continue;
            }
            let stored = new_item(&item.content, item.metadata, item.embedding);
            ids.push(stored.id.clone());
            self.knowledge.push(stored);
        }
        if !ids.is_empty() {
            self.save()?;
        }
        Ok(ids)
    }

    /// Rank knowledge items by similarity to `query`, optionally filtered.
    ///
    /// Ties keep insertion order.
    pub fn search(
        &self,
        query: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Vec<SearchHit> {
        let filter = filter.filter(|f| !f.is_empty());
        let mut hits: Vec<SearchHit> = self
            .knowledge
            .iter()
            .filter(|item| filter.map_or(true, |f| f.matches(&item.metadata)))
            .map(|item| SearchHit {
                id: item.id.clone(),
                content: item.content.clone(),
                metadata: item.metadata.clone(),
                relevance: cosine_similarity(query, &item.embedding),
            })
            .collect();

        hits.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
        hits.truncate(limit);
        hits
    }

    pub fn add_context(&mut self, entry: ContextEntry) -> Result<()> {
        self.context.push(entry);
        self.save()
    }

    /// Most similar past exchanges from one session.
    pub fn relevant_context(&self, session_id: &str, query: &[f32], limit: usize) -> Vec<ContextHit> {
        let mut hits: Vec<ContextHit> = self
            .context
            .iter()
            .filter(|entry| entry.session_id == session_id)
            .map(|entry| ContextHit {
                id: entry.id.clone(),
                content: entry.content.clone(),
                timestamp: entry.timestamp.clone(),
                relevance: cosine_similarity(query, &entry.embedding),
            })
            .collect();

        hits.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
        hits.truncate(limit);
        hits
    }

    pub fn clear_knowledge(&mut self) -> Result<()> {
        self.knowledge.clear();
        self.save()
    }

    pub fn clear_context(&mut self) -> Result<()> {
        self.context.clear();
        self.save()
    }

    pub fn knowledge_len(&self) -> usize {
        self.knowledge.len()
    }

    pub fn context_len(&self) -> usize {
        self.context.len()
    }

    pub fn knowledge_items(&self) -> &[KnowledgeItem] {
        &self.knowledge
    }

    pub fn stats(&self) -> KnowledgeStats {
        KnowledgeStats::from_items(&self.knowledge)
    }

    pub fn search_by_metadata(&self, filter: &MetadataFilter) -> Vec<&KnowledgeItem> {
        self.knowledge
            .iter()
            .filter(|item| filter.matches(&item.metadata))
            .collect()
    }
}

fn new_item(content: &str, metadata: ChunkMetadata, embedding: Vec<f32>) -> KnowledgeItem {
    KnowledgeItem {
        id: uuid::Uuid::new_v4().to_string(),
        content: content.to_string(),
        metadata,
        embedding,
        content_hash: content_hash(content),
        timestamp: chrono::Utc::now().to_rfc3339(),
    }
}

/// A missing or unreadable file yields an empty list.
fn load_list<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read store file, starting empty");
            return Vec::new();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(list) => list,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "corrupt store file, starting empty");
            Vec::new()
        }
    }
}

fn write_list<T: Serialize>(path: &Path, list: &[T]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_vec(list)?;
    std::fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
