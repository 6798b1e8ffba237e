//! TOML configuration.
//!
//! Every section has defaults, so an empty file yields a usable config.
//! The OpenAI API key is never stored here; it is read from the
//! `OPENAI_API_KEY` environment variable by the providers.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub uploads: UploadsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            uploads: UploadsConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            server: ServerConfig::default(),
            categories: default_categories(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./vector_cache")
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadsConfig {
    #[serde(default = "default_uploads_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_processed_files")]
    pub processed_files: PathBuf,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    #[serde(default = "default_true")]
    pub process_on_startup: bool,
    #[serde(default = "default_category_rules")]
    pub category_rules: Vec<CategoryRule>,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            dir: default_uploads_dir(),
            processed_files: default_processed_files(),
            allowed_extensions: default_allowed_extensions(),
            process_on_startup: true,
            category_rules: default_category_rules(),
        }
    }
}

impl UploadsConfig {
    /// Case-insensitive check of a filename's extension against the allow list.
    pub fn is_allowed(&self, filename: &str) -> bool {
        match filename.rsplit_once('.') {
            Some((_, ext)) => {
                let ext = ext.to_lowercase();
                self.allowed_extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(&ext))
            }
            None => false,
        }
    }
}

/// Maps a filename substring to a knowledge category.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct CategoryRule {
    pub pattern: String,
    pub category: String,
}

impl CategoryRule {
    pub fn new(pattern: &str, category: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            category: category.to_string(),
        }
    }
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("./uploads")
}
fn default_processed_files() -> PathBuf {
    PathBuf::from("./processed_files.json")
}
fn default_allowed_extensions() -> Vec<String> {
    ["pdf", "txt", "docx", "rtf"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_true() -> bool {
    true
}
fn default_category_rules() -> Vec<CategoryRule> {
    vec![
        CategoryRule::new("curriculum", "Curriculum"),
        CategoryRule::new("pricing", "Pricing"),
        CategoryRule::new("teacher", "Teachers"),
        CategoryRule::new("general", "General Information"),
        CategoryRule::new("guide", "User Guide"),
        CategoryRule::new("manual", "User Guide"),
    ]
}

/// Character-based splitter settings. PDFs are split per page with a
/// smaller window than flowing text documents.
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_pdf_chunk_size")]
    pub pdf_chunk_size: usize,
    #[serde(default = "default_pdf_chunk_overlap")]
    pub pdf_chunk_overlap: usize,
    #[serde(default = "default_text_chunk_size")]
    pub text_chunk_size: usize,
    #[serde(default = "default_text_chunk_overlap")]
    pub text_chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            pdf_chunk_size: default_pdf_chunk_size(),
            pdf_chunk_overlap: default_pdf_chunk_overlap(),
            text_chunk_size: default_text_chunk_size(),
            text_chunk_overlap: default_text_chunk_overlap(),
        }
    }
}

fn default_pdf_chunk_size() -> usize {
    200
}
fn default_pdf_chunk_overlap() -> usize {
    50
}
fn default_text_chunk_size() -> usize {
    800
}
fn default_text_chunk_overlap() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_knowledge_limit")]
    pub knowledge_limit: usize,
    #[serde(default = "default_context_limit")]
    pub context_limit: usize,
    #[serde(default = "default_context_snippet_chars")]
    pub context_snippet_chars: usize,
    #[serde(default = "default_knowledge_snippet_chars")]
    pub knowledge_snippet_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            knowledge_limit: default_knowledge_limit(),
            context_limit: default_context_limit(),
            context_snippet_chars: default_context_snippet_chars(),
            knowledge_snippet_chars: default_knowledge_snippet_chars(),
        }
    }
}

fn default_knowledge_limit() -> usize {
    5
}
fn default_context_limit() -> usize {
    3
}
fn default_context_snippet_chars() -> usize {
    200
}
fn default_knowledge_snippet_chars() -> usize {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_embedding_model(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            base_url: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_chat_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            max_retries: default_max_retries(),
            timeout_secs: default_llm_timeout_secs(),
            base_url: None,
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_chat_model() -> String {
    "gpt-4".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_max_tokens() -> u32 {
    800
}
fn default_temperature() -> f32 {
    0.3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

fn default_categories() -> Vec<String> {
    [
        "Curriculum",
        "Pricing",
        "Teachers",
        "Textbooks",
        "About Us",
        "Contact",
        "Other",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate config text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let c = &config.chunking;
    if c.pdf_chunk_size == 0 || c.text_chunk_size == 0 {
        bail!("chunking sizes must be > 0");
    }
    if c.pdf_chunk_overlap >= c.pdf_chunk_size {
        bail!("chunking.pdf_chunk_overlap must be smaller than chunking.pdf_chunk_size");
    }
    if c.text_chunk_overlap >= c.text_chunk_size {
        bail!("chunking.text_chunk_overlap must be smaller than chunking.text_chunk_size");
    }

    if config.retrieval.knowledge_limit < 1 || config.retrieval.context_limit < 1 {
        bail!("retrieval limits must be >= 1");
    }

    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    if !(0.0..=2.0).contains(&config.llm.temperature) {
        bail!("llm.temperature must be in [0.0, 2.0]");
    }

    for (section, provider) in [
        ("embedding", config.embedding.provider.as_str()),
        ("llm", config.llm.provider.as_str()),
    ] {
        match provider {
            "disabled" | "openai" => {}
            other => bail!(
                "Unknown {} provider: '{}'. Must be disabled or openai.",
                section,
                other
            ),
        }
    }

    if config.uploads.allowed_extensions.is_empty() {
        bail!("uploads.allowed_extensions must not be empty");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.chunking.pdf_chunk_size, 200);
        assert_eq!(config.chunking.pdf_chunk_overlap, 50);
        assert_eq!(config.chunking.text_chunk_size, 800);
        assert_eq!(config.retrieval.knowledge_limit, 5);
        assert_eq!(config.retrieval.context_limit, 3);
        assert_eq!(config.embedding.model, "text-embedding-3-small");
        assert_eq!(config.llm.model, "gpt-4");
        assert_eq!(config.llm.max_tokens, 800);
        assert_eq!(config.categories.len(), 7);
        assert_eq!(config.uploads.category_rules.len(), 6);
    }

    #[test]
    fn overrides_are_applied() {
        let config = parse_config(
            r#"
categories = ["Pricing"]

[store]
path = "/tmp/cache"

[embedding]
provider = "disabled"

[[uploads.category_rules]]
pattern = "faq"
category = "Other"
"#,
        )
        .unwrap();
        assert_eq!(config.store.path, PathBuf::from("/tmp/cache"));
        assert!(!config.embedding.is_enabled());
        assert!(config.llm.is_enabled());
        assert_eq!(config.categories, vec!["Pricing".to_string()]);
        assert_eq!(
            config.uploads.category_rules,
            vec![CategoryRule::new("faq", "Other")]
        );
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        let err = parse_config("[chunking]\npdf_chunk_size = 50\npdf_chunk_overlap = 50\n")
            .unwrap_err();
        assert!(err.to_string().contains("pdf_chunk_overlap"));
    }

    #[test]
    fn rejects_unknown_provider() {
        let err = parse_config("[llm]\nprovider = \"anthropic\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown llm provider"));
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        assert!(parse_config("[llm]\ntemperature = 3.5\n").is_err());
    }

    #[test]
    fn allowed_extension_check_is_case_insensitive() {
        let uploads = UploadsConfig::default();
        assert!(uploads.is_allowed("Pricing.PDF"));
        assert!(uploads.is_allowed("notes.rtf"));
        assert!(!uploads.is_allowed("image.png"));
        assert!(!uploads.is_allowed("README"));
    }
}
