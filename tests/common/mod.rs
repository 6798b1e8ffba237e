//! Shared fixtures for integration tests: deterministic providers and a
//! temp-dir backed assistant.

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use tutor_rag::assistant::Assistant;
use tutor_rag::config::Config;
use tutor_rag::embedding::Embedder;
use tutor_rag::llm::ChatModel;
use tutor_rag::store::KnowledgeStore;

const VOCAB: [&str; 8] = [
    "price", "cost", "teacher", "curriculum", "course", "lesson", "grammar", "schedule",
];

/// Bag-of-words embedder over a tiny vocabulary, plus a bias term so no
/// vector is all zeros.
pub struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-stub"
    }

    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

pub fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let mut v: Vec<f32> = VOCAB
        .iter()
        .map(|w| lower.matches(w).count() as f32)
        .collect();
    v.push(0.1);
    v
}

/// Chat model that returns a fixed answer and remembers the last prompt.
pub struct RecordingChat {
    pub answer: String,
    pub last_user_prompt: Mutex<Option<String>>,
}

impl RecordingChat {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            last_user_prompt: Mutex::new(None),
        }
    }

    pub fn last_prompt(&self) -> String {
        self.last_user_prompt.lock().unwrap().clone().unwrap_or_default()
    }
}

#[async_trait]
impl ChatModel for RecordingChat {
    fn model_name(&self) -> &str {
        "recording-stub"
    }

    async fn complete(&self, _system: &str, user: &str) -> anyhow::Result<String> {
        *self.last_user_prompt.lock().unwrap() = Some(user.to_string());
        Ok(self.answer.clone())
    }
}

/// Config whose store, uploads and tracker all live under `root`.
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.store.path = root.join("vector_cache");
    config.uploads.dir = root.join("uploads");
    config.uploads.processed_files = root.join("processed_files.json");
    config.uploads.process_on_startup = false;
    std::fs::create_dir_all(&config.uploads.dir).unwrap();
    config
}

pub struct TestEnv {
    pub tmp: TempDir,
    pub assistant: Arc<Assistant>,
    pub chat: Arc<RecordingChat>,
}

pub fn test_env(answer: &str) -> TestEnv {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let store = KnowledgeStore::open(&config.store.path).unwrap();
    let chat = Arc::new(RecordingChat::new(answer));
    let assistant = Arc::new(Assistant::new(
        config,
        store,
        Arc::new(KeywordEmbedder),
        chat.clone(),
    ));
    TestEnv {
        tmp,
        assistant,
        chat,
    }
}

/// Single-page PDF whose content stream draws `phrase` in Helvetica.
pub fn minimal_pdf(phrase: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            content.len(),
            content
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

/// DOCX (ZIP) with one paragraph per entry of `paragraphs`.
pub fn minimal_docx(paragraphs: &[&str]) -> Vec<u8> {
    use std::io::Write;
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    let xml = format!(
        "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
        body
    );
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}
