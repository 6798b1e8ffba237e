//! Ingestion pipeline orchestration.
//!
//! Coordinates the upload flow: scan → extract → chunk → embed → store →
//! mark processed. Files are tracked by name, so a file is ingested once
//! until the processed-files record is cleared.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::assistant::Assistant;
use crate::chunk::TextSplitter;
use crate::config::{CategoryRule, ChunkingConfig, UploadsConfig};
use crate::extract::{extract_sections, FileKind};
use crate::models::ChunkMetadata;
use crate::store::NewKnowledge;
use crate::tracker::ProcessedFiles;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// A file in the uploads directory that has not been ingested yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFile {
    pub path: PathBuf,
    pub filename: String,
}

#[derive(Debug, Default)]
pub struct UploadScan {
    pub pending: Vec<PendingFile>,
    pub already_processed: Vec<String>,
    pub unsupported: Vec<String>,
}

/// Pick a category for a file from its name.
///
/// The first rule whose pattern occurs in the filename (case-insensitive)
/// wins; otherwise the extension decides.
pub fn file_category(filename: &str, rules: &[CategoryRule]) -> String {
    let lower = filename.to_lowercase();
    if let Some(rule) = rules
        .iter()
        .find(|r| !r.pattern.is_empty() && lower.contains(&r.pattern.to_lowercase()))
    {
        return rule.category.clone();
    }

    let ext = lower.rsplit_once('.').map(|(_, e)| e).unwrap_or("");
    match ext {
        "rtf" => "Information",
        "txt" => "Text",
        "docx" => "Document",
        _ => "Documentation",
    }
    .to_string()
}

/// List regular, non-hidden files in the uploads directory, sorted by name.
pub fn scan_uploads(uploads: &UploadsConfig, tracker: &ProcessedFiles) -> Result<UploadScan> {
    let mut scan = UploadScan::default();
    let dir = &uploads.dir;
    if !dir.exists() {
        tracing::warn!(dir = %dir.display(), "uploads directory not found");
        return Ok(scan);
    }

    let processed = tracker.processed();
    let mut entries: Vec<(String, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read uploads directory: {}", dir.display()))?
    {
        let entry = entry?;
        let filename = entry.file_name().to_string_lossy().into_owned();
        if filename.starts_with('.') || !entry.file_type()?.is_file() {
            continue;
        }
        entries.push((filename, entry.path()));
    }
    entries.sort();

    for (filename, path) in entries {
        if !uploads.is_allowed(&filename) || FileKind::from_filename(&filename).is_none() {
            tracing::debug!(file = %filename, "skipping unsupported file");
            scan.unsupported.push(filename);
        } else if processed.contains(&filename) {
            tracing::debug!(file = %filename, "already processed");
            scan.already_processed.push(filename);
        } else {
            scan.pending.push(PendingFile { path, filename });
        }
    }
    Ok(scan)
}

pub fn has_unprocessed(uploads: &UploadsConfig, tracker: &ProcessedFiles) -> bool {
    scan_uploads(uploads, tracker)
        .map(|scan| !scan.pending.is_empty())
        .unwrap_or(false)
}

/// Extract and chunk one file. PDFs are split per page.
pub fn extract_chunks(
    bytes: &[u8],
    filename: &str,
    category: Option<&str>,
    chunking: &ChunkingConfig,
) -> Result<Vec<(String, ChunkMetadata)>> {
    let kind = FileKind::from_filename(filename)
        .ok_or_else(|| anyhow::anyhow!("Unsupported file type: {}", filename))?;
    let sections = extract_sections(bytes, filename)?;
    let category = category.unwrap_or("Unknown");

    let splitter = match kind {
        FileKind::Pdf => TextSplitter::new(chunking.pdf_chunk_size, chunking.pdf_chunk_overlap),
        _ => TextSplitter::new(chunking.text_chunk_size, chunking.text_chunk_overlap),
    };

    let mut chunks = Vec::new();
    let mut index = 0;
    for section in sections {
        if section.text.trim().is_empty() {
            continue;
        }
        for (i, text) in splitter.split(&section.text).into_iter().enumerate() {
            let chunk_id = match section.page {
                Some(page) => format!("{}_{}_{}", filename, page, i),
                None => {
                    index += 1;
                    format!("{}_{}", filename, index - 1)
                }
            };
            chunks.push((
                text,
                ChunkMetadata {
                    source: filename.to_string(),
                    category: category.to_string(),
                    file_type: kind.as_str().to_string(),
                    page: section.page,
                    chunk_id,
                },
            ));
        }
    }
    Ok(chunks)
}

/// Embed chunks and add them to the knowledge base with one save.
pub async fn store_chunks(
    assistant: &Assistant,
    chunks: Vec<(String, ChunkMetadata)>,
) -> Result<Vec<String>> {
    let chunks: Vec<(String, ChunkMetadata)> = chunks
        .into_iter()
        .filter(|(text, _)| !text.trim().is_empty())
        .collect();
    if chunks.is_empty() {
        return Ok(Vec::new());
    }

    let texts: Vec<String> = chunks.iter().map(|(t, _)| t.clone()).collect();
    let embeddings = assistant.embedder().embed(&texts).await?;
    if embeddings.len() != chunks.len() {
        bail!(
            "Embedder returned {} vectors for {} chunks",
            embeddings.len(),
            chunks.len()
        );
    }

    let items = chunks
        .into_iter()
        .zip(embeddings)
        .map(|((content, metadata), embedding)| NewKnowledge {
            content,
            metadata,
            embedding,
        })
        .collect();
    assistant.store().write().await.add_knowledge_batch(items)
}

/// Ingest one file and mark it processed. Returns the number of chunks stored.
pub async fn ingest_file(
    assistant: &Assistant,
    tracker: &ProcessedFiles,
    path: &Path,
    filename: &str,
    category: &str,
) -> Result<usize> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let chunking = assistant.config().chunking.clone();
    let owned_name = filename.to_string();
    let owned_category = category.to_string();
    let chunks = tokio::task::spawn_blocking(move || {
        extract_chunks(&bytes, &owned_name, Some(&owned_category), &chunking)
    })
    .await??;

    if chunks.is_empty() {
        bail!("No text extracted from {}", filename);
    }

    let ids = store_chunks(assistant, chunks).await?;
    if ids.is_empty() {
        bail!("No chunks stored for {}", filename);
    }
    tracker.mark_processed(filename)?;
    Ok(ids.len())
}

/// Ingest one file, logging instead of returning the error.
pub async fn process_file(
    assistant: &Assistant,
    tracker: &ProcessedFiles,
    file: &PendingFile,
    category: &str,
) -> bool {
    match ingest_file(assistant, tracker, &file.path, &file.filename, category).await {
        Ok(count) => {
            tracing::info!(file = %file.filename, category, chunks = count, "file ingested");
            true
        }
        Err(e) => {
            tracing::error!(file = %file.filename, error = %e, "failed to ingest file");
            false
        }
    }
}

/// Ingest every pending file in the uploads directory.
pub async fn process_uploads(assistant: &Assistant, dry_run: bool) -> Result<IngestStats> {
    let _guard = assistant.ingest_lock().lock().await;
    let uploads = &assistant.config().uploads;
    let tracker = ProcessedFiles::new(&uploads.processed_files);
    let scan = scan_uploads(uploads, &tracker)?;

    let mut stats = IngestStats {
        skipped: scan.already_processed.len() + scan.unsupported.len(),
        ..Default::default()
    };

    for file in &scan.pending {
        let category = file_category(&file.filename, &uploads.category_rules);
        if dry_run {
            tracing::info!(file = %file.filename, category = %category, "would process");
            stats.processed += 1;
            continue;
        }
        if process_file(assistant, &tracker, file, &category).await {
            stats.processed += 1;
        } else {
            stats.failed += 1;
        }
    }

    tracing::info!(
        processed = stats.processed,
        failed = stats.failed,
        skipped = stats.skipped,
        dry_run,
        "upload processing finished"
    );
    Ok(stats)
}

/// Save an uploaded file under a sanitised name and ingest it.
///
/// Returns the stored filename and chunk count.
pub async fn ingest_upload(
    assistant: &Assistant,
    original_name: &str,
    bytes: &[u8],
    category: &str,
) -> Result<(String, usize)> {
    let uploads = &assistant.config().uploads;
    let filename = upload_filename(original_name);
    if filename.is_empty() {
        bail!("Invalid filename: {}", original_name);
    }
    if !uploads.is_allowed(&filename) {
        bail!("File type not allowed: {}", filename);
    }

    let _guard = assistant.ingest_lock().lock().await;
    std::fs::create_dir_all(&uploads.dir).with_context(|| {
        format!("Failed to create uploads directory: {}", uploads.dir.display())
    })?;
    let path = uploads.dir.join(&filename);
    std::fs::write(&path, bytes).with_context(|| format!("Failed to save {}", path.display()))?;

    let tracker = ProcessedFiles::new(&uploads.processed_files);
    let count = ingest_file(assistant, &tracker, &path, &filename, category).await?;
    tracing::info!(file = %filename, category, chunks = count, "upload ingested");
    Ok((filename, count))
}

/// Sanitised name for an uploaded file.
///
/// When nothing of the stem survives [`secure_filename`] (e.g. `价格表.pdf`),
/// the file is stored as `upload_<id>.<ext>` with the original extension.
pub fn upload_filename(original_name: &str) -> String {
    let cleaned = secure_filename(original_name);
    let has_stem = matches!(
        cleaned.rsplit_once('.'),
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty()
    );
    if has_stem {
        return cleaned;
    }

    let basename = original_name.rsplit(['/', '\\']).next().unwrap_or("");
    let ext: String = basename
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase();
    if ext.is_empty() {
        return cleaned;
    }
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("upload_{}.{}", &id[..8], ext)
}

/// Reduce a client-supplied filename to a safe basename.
///
/// Path components are dropped, whitespace becomes `_`, and only
/// `[A-Za-z0-9._-]` is kept. Leading dots are trimmed.
pub fn secure_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    cleaned.trim_start_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn rules() -> Vec<CategoryRule> {
        crate::config::Config::default().uploads.category_rules
    }

    #[test]
    fn category_from_rules_then_extension() {
        let rules = rules();
        assert_eq!(file_category("2024_PRICING_sheet.pdf", &rules), "Pricing");
        assert_eq!(file_category("teacher_bios.rtf", &rules), "Teachers");
        assert_eq!(file_category("Setup-Manual.docx", &rules), "User Guide");
        assert_eq!(file_category("notes.rtf", &rules), "Information");
        assert_eq!(file_category("notes.txt", &rules), "Text");
        assert_eq!(file_category("notes.docx", &rules), "Document");
        assert_eq!(file_category("brochure.pdf", &rules), "Documentation");
        assert_eq!(file_category("README", &rules), "Documentation");
    }

    #[test]
    fn earlier_rules_win() {
        let mut rules = vec![CategoryRule::new("bios", "Staff")];
        rules.extend(self::rules());
        assert_eq!(file_category("teacher_bios.rtf", &rules), "Staff");
    }

    #[test]
    fn secure_filename_strips_paths_and_symbols() {
        assert_eq!(secure_filename("../../etc/passwd"), "passwd");
        assert_eq!(secure_filename("C:\\docs\\My Pricing (v2).pdf"), "My_Pricing_v2.pdf");
        assert_eq!(secure_filename(".hidden.txt"), "hidden.txt");
        assert_eq!(secure_filename("价格.pdf"), "pdf");
        assert_eq!(secure_filename("///"), "");
    }

    #[test]
    fn upload_filename_keeps_extension_of_non_ascii_names() {
        let uploads = crate::config::UploadsConfig::default();

        let name = upload_filename("价格表.PDF");
        assert!(name.starts_with("upload_"), "{name}");
        assert!(name.ends_with(".pdf"), "{name}");
        assert!(uploads.is_allowed(&name));
        assert_ne!(upload_filename("价格表.pdf"), upload_filename("价格表.pdf"));

        assert_eq!(upload_filename("My Pricing.pdf"), "My_Pricing.pdf");
        assert_eq!(upload_filename("../../etc/passwd"), "passwd");
        assert_eq!(upload_filename("///"), "");
    }

    #[test]
    fn text_chunks_are_numbered_per_file() {
        let chunking = ChunkingConfig {
            text_chunk_size: 30,
            text_chunk_overlap: 0,
            ..crate::config::Config::default().chunking
        };
        let text = "First paragraph here.\n\nSecond paragraph here.";
        let chunks = extract_chunks(text.as_bytes(), "faq.txt", None, &chunking).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].1.chunk_id, "faq.txt_0");
        assert_eq!(chunks[1].1.chunk_id, "faq.txt_1");
        assert_eq!(chunks[0].1.category, "Unknown");
        assert_eq!(chunks[0].1.file_type, "txt");
        assert_eq!(chunks[0].1.page, None);
    }

    #[test]
    fn unsupported_extension_is_an_error() {
        let chunking = crate::config::Config::default().chunking;
        assert!(extract_chunks(b"data", "photo.png", None, &chunking).is_err());
    }

    #[test]
    fn scan_skips_hidden_unsupported_and_processed() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("uploads");
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        for name in ["b_pricing.rtf", "a_faq.txt", ".secret.txt", "image.png", "done.pdf"] {
            std::fs::write(dir.join(name), "x").unwrap();
        }

        let tracker = ProcessedFiles::new(&tmp.path().join("processed.json"));
        tracker.mark_processed("done.pdf").unwrap();

        let uploads = UploadsConfig {
            dir: dir.clone(),
            processed_files: tmp.path().join("processed.json"),
            ..crate::config::Config::default().uploads
        };
        let scan = scan_uploads(&uploads, &tracker).unwrap();
        let pending: Vec<&str> = scan.pending.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(pending, vec!["a_faq.txt", "b_pricing.rtf"]);
        assert_eq!(scan.already_processed, vec!["done.pdf".to_string()]);
        assert_eq!(scan.unsupported, vec!["image.png".to_string()]);
        assert!(has_unprocessed(&uploads, &tracker));
    }

    #[test]
    fn missing_uploads_dir_is_empty_scan() {
        let tmp = TempDir::new().unwrap();
        let uploads = UploadsConfig {
            dir: tmp.path().join("missing"),
            ..crate::config::Config::default().uploads
        };
        let tracker = ProcessedFiles::new(&tmp.path().join("p.json"));
        let scan = scan_uploads(&uploads, &tracker).unwrap();
        assert!(scan.pending.is_empty());
        assert!(!has_unprocessed(&uploads, &tracker));
    }

    /// Returns one vector fewer than asked for.
    struct ShortEmbedder;

    #[async_trait::async_trait]
    impl crate::embedding::Embedder for ShortEmbedder {
        fn model_name(&self) -> &str {
            "short"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(vec![vec![1.0, 0.0]; texts.len().saturating_sub(1)])
        }
    }

    #[tokio::test]
    async fn store_chunks_rejects_short_embedding_batch() {
        let tmp = TempDir::new().unwrap();
        let mut config = crate::config::Config::default();
        config.store.path = tmp.path().join("vector_cache");
        let store = crate::store::KnowledgeStore::open(&config.store.path).unwrap();
        let assistant = Assistant::new(
            config,
            store,
            std::sync::Arc::new(ShortEmbedder),
            std::sync::Arc::new(crate::llm::DisabledChat),
        );

        let meta = |id: &str| ChunkMetadata {
            source: "notes.txt".to_string(),
            category: "Text".to_string(),
            file_type: "txt".to_string(),
            page: None,
            chunk_id: id.to_string(),
        };
        let chunks = vec![
            ("First chunk.".to_string(), meta("notes.txt_0")),
            ("Second chunk.".to_string(), meta("notes.txt_1")),
        ];

        let err = store_chunks(&assistant, chunks).await.unwrap_err();
        assert!(err.to_string().contains("1 vectors for 2 chunks"), "{err}");
        assert_eq!(assistant.store().read().await.knowledge_len(), 0);
    }
}
