//! FAQ answering and mode routing.
//!
//! [`Assistant`] owns the knowledge store, the embedding and chat clients,
//! and the consultation engine. An FAQ answer is one retrieval-augmented
//! LLM call: the query is embedded once, used to pull both the session's
//! past exchanges and the best-matching knowledge chunks, and those are
//! folded into the prompt.

use anyhow::Result;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use tokio::sync::{Mutex, RwLock};

use crate::config::Config;
use crate::consultation::{ActionType, ConsultationEngine};
use crate::embedding::{create_embedder, Embedder};
use crate::llm::{create_chat_model, ChatModel};
use crate::models::{ContextEntry, ContextHit, MetadataFilter, SearchHit};
use crate::store::KnowledgeStore;

static LIST_MARKER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)(\d{1,2}[.)])\s+").ok());

const PERSONA: &str = "You are a friendly English education consultant helping Chinese parents find the right
online English courses for their children.

Your role is to:
- Guide parents through course selection and answer their questions
- Conduct English proficiency assessments when needed
- Recommend appropriate course packages
- Help with enrollment and next steps
- Remember previous conversation details to avoid repetition
- Give detailed, accurate and valuable information for them to make an informed decision
- Use specifics when possible and give concrete names, examples, and details
- Include specific details and the names of our teachers, who have consented to share their information

**Communication Style:**
- Use a warm, conversational tone (like talking to a friend, but professional)
- Break up information with bullet points and short paragraphs
- Use emojis sparingly for warmth (📚 ✨ 👍)
- Speak in both Chinese and English as appropriate
- **Use bold for important facts, prices, titles, and key benefits**
- *Use italics for emphasis on special offers, deadlines, or notable details*
- Keep responses scannable - avoid long walls of text

**Formatting Examples:**
- \"**Level 4**: Intermediate\"
- \"**Special offer**: *First month only ¥299* (regular price ¥399)\"
- \"The assessment takes just **10 minutes** and gives you a *detailed proficiency report*\"

**Key Behaviors:**
- Ask ONE clarifying question at a time
- Summarize what you've learned before moving to next topics
- Give specific examples when explaining courses or teaching methods
- If parents seem hesitant, address concerns directly
- Always end with a clear next step

**When to escalate to human:**
- Scheduling direct appointments
- Technical payment issues
- Concerns about specific individuals or childrens' specific needs
- Any question you're uncertain about

**Remember:**
- Don't re-ask for information already provided (child's name, age, etc.)
- Focus on the child's learning goals and current level
- Parents want confidence their investment will help their child succeed

Ready to help parents find the perfect English learning path for their child!";

#[derive(Debug, Clone, Serialize)]
pub struct AssistantStatus {
    pub knowledge_items: usize,
    pub context_items: usize,
    pub categories: Vec<String>,
    pub consultation_sessions: usize,
    pub session_id: String,
}

pub struct Assistant {
    config: Config,
    store: RwLock<KnowledgeStore>,
    embedder: Arc<dyn Embedder>,
    chat: Arc<dyn ChatModel>,
    consultation: Arc<Mutex<ConsultationEngine>>,
    selected_categories: Mutex<HashMap<String, String>>,
    /// Held for the whole of an ingestion run so tracker updates don't interleave.
    ingest_lock: Mutex<()>,
    /// Used when a request carries no session id.
    session_id: String,
}

impl Assistant {
    pub fn new(
        config: Config,
        store: KnowledgeStore,
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            config,
            store: RwLock::new(store),
            embedder,
            chat,
            consultation: Arc::new(Mutex::new(ConsultationEngine::new())),
            selected_categories: Mutex::new(HashMap::new()),
            ingest_lock: Mutex::new(()),
            session_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Open the configured store and build the configured providers.
    pub fn from_config(config: Config) -> Result<Self> {
        let store = KnowledgeStore::open(&config.store.path)?;
        let embedder = create_embedder(&config.embedding)?;
        let chat = create_chat_model(&config.llm)?;
        Ok(Self::new(config, store, embedder, chat))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &RwLock<KnowledgeStore> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn ingest_lock(&self) -> &Mutex<()> {
        &self.ingest_lock
    }

    pub fn consultation(&self) -> Arc<Mutex<ConsultationEngine>> {
        Arc::clone(&self.consultation)
    }

    pub fn default_session_id(&self) -> &str {
        &self.session_id
    }

    pub fn categories(&self) -> &[String] {
        &self.config.categories
    }

    /// Route a chat message by mode: consultation, FAQ, or mode selection.
    pub async fn generate_response(
        &self,
        message: &str,
        mode: Option<&str>,
        category: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<String> {
        let session_id = session_id.unwrap_or(self.session_id.as_str());
        match mode.map(str::to_lowercase).as_deref() {
            Some("consultation") => {
                let mut engine = self.consultation.lock().await;
                Ok(engine
                    .handle_message(message, session_id, ActionType::Text)
                    .response)
            }
            Some("faq") => self.answer_faq(message, category, Some(session_id)).await,
            _ => Ok(initial_selection(message).to_string()),
        }
    }

    pub async fn answer_faq(
        &self,
        message: &str,
        category: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<String> {
        let session_id = session_id.unwrap_or(self.session_id.as_str());
        let retrieval = &self.config.retrieval;

        let selected = {
            let mut selected = self.selected_categories.lock().await;
            if let Some(category) = category {
                selected.insert(session_id.to_string(), category.to_string());
            }
            selected.get(session_id).cloned()
        };

        let query_vec = self.embedder.embed_one(message).await?;

        let (context, knowledge) = {
            let store = self.store.read().await;
            let context = store.relevant_context(session_id, &query_vec, retrieval.context_limit);
            let filter = selected.as_deref().map(MetadataFilter::category);
            let knowledge = store.search(&query_vec, retrieval.knowledge_limit, filter.as_ref());
            (context, knowledge)
        };
        tracing::info!(
            session = session_id,
            category = selected.as_deref().unwrap_or("-"),
            knowledge = knowledge.len(),
            context = context.len(),
            "answering FAQ"
        );

        let system = build_system_prompt(&self.config.categories);
        let user = build_user_prompt(
            message,
            &context,
            &knowledge,
            retrieval.context_snippet_chars,
            retrieval.knowledge_snippet_chars,
        );
        let raw = self.chat.complete(&system, &user).await?;
        let response = format_numbered_lists(&raw);

        if let Err(e) = self
            .save_context(
                session_id,
                message,
                &response,
                knowledge.len(),
                context.len(),
                selected,
            )
            .await
        {
            tracing::warn!(error = %e, "failed to save conversation context");
        }

        Ok(response)
    }

    async fn save_context(
        &self,
        session_id: &str,
        user_input: &str,
        response: &str,
        knowledge_items_used: usize,
        context_items_used: usize,
        selected_category: Option<String>,
    ) -> Result<()> {
        let content = format!("User: {}\nAssistant: {}", user_input, response);
        let embedding = self.embedder.embed_one(&content).await?;
        let entry = ContextEntry {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            user_input: user_input.to_string(),
            response: response.to_string(),
            content,
            embedding,
            timestamp: chrono::Utc::now().to_rfc3339(),
            knowledge_items_used,
            context_items_used,
            selected_category,
        };
        self.store.write().await.add_context(entry)
    }

    /// Semantic search over the knowledge base, without calling the LLM.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        category: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        let query_vec = self.embedder.embed_one(query).await?;
        let filter = category.map(MetadataFilter::category);
        Ok(self
            .store
            .read()
            .await
            .search(&query_vec, limit, filter.as_ref()))
    }

    pub async fn status(&self) -> AssistantStatus {
        let (knowledge_items, context_items) = {
            let store = self.store.read().await;
            (store.knowledge_len(), store.context_len())
        };
        AssistantStatus {
            knowledge_items,
            context_items,
            categories: self.config.categories.clone(),
            consultation_sessions: self.consultation.lock().await.session_count(),
            session_id: self.session_id.clone(),
        }
    }

    pub async fn clear_knowledge(&self) -> Result<()> {
        self.store.write().await.clear_knowledge()
    }

    pub async fn clear_context(&self) -> Result<()> {
        self.store.write().await.clear_context()?;
        self.selected_categories.lock().await.clear();
        Ok(())
    }
}

/// Reply for messages sent before a mode has been chosen.
pub fn initial_selection(message: &str) -> &'static str {
    let lower = message.to_lowercase();
    if ["consultation", "assess", "test", "level", "recommend"]
        .iter()
        .any(|w| lower.contains(w))
    {
        "I'll help you with a consultation! Please click the 'Consultation' button above to get started with our interactive assessment."
    } else if ["question", "faq", "info", "about", "price", "teacher"]
        .iter()
        .any(|w| lower.contains(w))
    {
        "I'd be happy to answer your questions! Please click the 'FAQ' button above and select which topic you'd like to know about."
    } else {
        "I can help you with either:\n\n**Consultation** - Get personalized course recommendations through an interactive assessment\n\n**FAQ** - Answer questions about our programs, pricing, teachers, etc.\n\nPlease select one of the options above to get started!"
    }
}

pub fn build_system_prompt(categories: &[String]) -> String {
    let mut prompt = PERSONA.to_string();
    if !categories.is_empty() {
        let quoted: Vec<String> = categories.iter().map(|c| format!("'{}'", c)).collect();
        prompt.push_str(&format!("\n\nAVAILABLE CATEGORIES: [{}]", quoted.join(", ")));
    }
    prompt
}

pub fn build_user_prompt(
    message: &str,
    context: &[ContextHit],
    knowledge: &[SearchHit],
    context_chars: usize,
    knowledge_chars: usize,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !context.is_empty() {
        parts.push("RECENT CONVERSATION CONTEXT:".to_string());
        let start = context.len().saturating_sub(3);
        for entry in &context[start..] {
            parts.push(format!("- {}...", truncate_chars(&entry.content, context_chars)));
        }
        parts.push(String::new());
    }

    if !knowledge.is_empty() {
        parts.push("RELEVANT KNOWLEDGE:".to_string());
        for hit in knowledge {
            let kind = if hit.metadata.file_type.is_empty() {
                "UNKNOWN".to_string()
            } else {
                hit.metadata.file_type.to_uppercase()
            };
            parts.push(format!(
                "[{}] {}",
                kind,
                truncate_chars(&hit.content, knowledge_chars)
            ));
        }
        parts.push(String::new());
    }

    parts.push(format!("CURRENT USER INPUT: {}", message));
    parts.push(String::new());
    parts.push("Please provide a helpful, context-aware response:".to_string());
    parts.join("\n")
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Put each `N.` / `N)` list item on its own line.
///
/// Text with fewer than two markers is returned unchanged.
pub fn format_numbered_lists(text: &str) -> String {
    let Some(re) = LIST_MARKER.as_ref() else {
        return text.to_string();
    };
    let starts: Vec<usize> = re
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.start())
        .collect();
    if starts.len() < 2 {
        return text.to_string();
    }

    let mut lines: Vec<&str> = Vec::new();
    let prefix = text[..starts[0]].trim();
    if !prefix.is_empty() {
        lines.push(prefix);
    }
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(text.len());
        let item = text[start..end].trim();
        if !item.is_empty() {
            lines.push(item);
        }
    }
    lines.join("\n")
}
