//! # Tutor CLI (`tutor`)
//!
//! Command-line front end for the tutoring assistant: ingest documents,
//! inspect the knowledge base, ask one-off questions, and run the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! tutor --config ./config/tutor.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tutor serve` | Start the HTTP API |
//! | `tutor ingest` | Ingest pending files from the uploads directory |
//! | `tutor search "<query>"` | Semantic search over the knowledge base |
//! | `tutor stats` | Knowledge items by category and file type |
//! | `tutor export [path]` | Dump knowledge items as JSON |
//! | `tutor clear <what>` | Clear knowledge, context, processed list, or all |
//! | `tutor chat "<message>"` | One-shot answer |

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;

use tutor_rag::assistant::Assistant;
use tutor_rag::config::{self, CategoryRule, Config};
use tutor_rag::tracker::ProcessedFiles;
use tutor_rag::{export, ingest, logging, server, stats};

/// Tutor RAG CLI: document ingestion, FAQ answers and student consultations.
#[derive(Parser)]
#[command(
    name = "tutor",
    about = "Retrieval-augmented chat backend for an English-tutoring school",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/tutor.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API.
    ///
    /// Pending uploads are ingested first when `uploads.process_on_startup`
    /// is set.
    Serve,

    /// Ingest pending files from the uploads directory.
    ///
    /// Exits with code 2 when any file failed to ingest.
    Ingest {
        /// List what would be ingested without extracting or embedding.
        #[arg(long)]
        dry_run: bool,

        /// Extra filename rule, checked before the configured ones.
        #[arg(long, num_args = 2, value_names = ["PATTERN", "CATEGORY"])]
        category: Vec<String>,
    },

    /// Semantic search over the knowledge base.
    Search {
        query: String,

        /// Only return chunks from this category.
        #[arg(long)]
        category: Option<String>,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show knowledge-base statistics.
    Stats,

    /// Export knowledge items (without embeddings) as JSON.
    ///
    /// Writes to stdout when no path is given.
    Export { path: Option<PathBuf> },

    /// Clear stored data.
    Clear {
        #[arg(value_enum)]
        what: ClearTarget,
    },

    /// Ask a single question and print the answer.
    Chat {
        message: String,

        /// `faq` or `consultation`. Without a mode the assistant asks for one.
        #[arg(long)]
        mode: Option<String>,

        #[arg(long)]
        category: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ClearTarget {
    Knowledge,
    Context,
    Processed,
    All,
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => server::run_server(&cfg).await?,
        Commands::Ingest { dry_run, category } => {
            let extra: Vec<CategoryRule> = category
                .chunks_exact(2)
                .map(|pair| CategoryRule::new(&pair[0], &pair[1]))
                .collect();
            cfg.uploads.category_rules.splice(0..0, extra);

            let assistant = Assistant::from_config(cfg)?;
            let stats = ingest::process_uploads(&assistant, dry_run).await?;
            println!(
                "Ingest complete: {} processed, {} failed, {} skipped",
                stats.processed, stats.failed, stats.skipped
            );
            if stats.failed > 0 {
                return Ok(ExitCode::from(2));
            }
        }
        Commands::Search {
            query,
            category,
            limit,
        } => {
            let limit = limit.unwrap_or(cfg.retrieval.knowledge_limit);
            let assistant = Assistant::from_config(cfg)?;
            let hits = assistant.search(&query, limit, category.as_deref()).await?;
            if hits.is_empty() {
                println!("No results.");
            }
            for (i, hit) in hits.iter().enumerate() {
                println!(
                    "{}. [{:.3}] {} ({}, {})",
                    i + 1,
                    hit.relevance,
                    hit.metadata.source,
                    hit.metadata.category,
                    hit.metadata.file_type
                );
                println!("    {}", snippet(&hit.content, 160));
            }
        }
        Commands::Stats => stats::run_stats(&cfg)?,
        Commands::Export { path } => {
            let store = tutor_rag::store::KnowledgeStore::open(&cfg.store.path)?;
            export::export_knowledge(&store, path.as_deref())?;
        }
        Commands::Clear { what } => clear(&cfg, what).await?,
        Commands::Chat {
            message,
            mode,
            category,
        } => {
            let assistant = Assistant::from_config(cfg)?;
            let answer = assistant
                .generate_response(&message, mode.as_deref(), category.as_deref(), None)
                .await?;
            println!("{}", answer);
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn clear(cfg: &Config, what: ClearTarget) -> anyhow::Result<()> {
    let mut store = tutor_rag::store::KnowledgeStore::open(&cfg.store.path)?;
    let tracker = ProcessedFiles::new(&cfg.uploads.processed_files);

    match what {
        ClearTarget::Knowledge => {
            store.clear_knowledge()?;
            println!("Knowledge base cleared");
        }
        ClearTarget::Context => {
            store.clear_context()?;
            println!("Conversation context cleared");
        }
        ClearTarget::Processed => {
            tracker.clear()?;
            println!("Processed files list cleared");
        }
        ClearTarget::All => {
            store.clear_knowledge()?;
            store.clear_context()?;
            tracker.clear()?;
            println!("Knowledge, context and processed files cleared");
        }
    }
    Ok(())
}

fn snippet(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}...", cut)
}
