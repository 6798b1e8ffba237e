//! # Tutor RAG
//!
//! Retrieval-augmented chat backend for an English-tutoring school.
//!
//! Uploaded documents (PDF, DOCX, RTF, TXT) are extracted, chunked, embedded
//! and kept in a JSON-backed vector store. Parents chat with the assistant in
//! one of two modes: FAQ answers grounded in the knowledge base, or a scripted
//! consultation that collects student details, runs a short placement test
//! and recommends courses.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌─────────────┐
//! │ uploads/ │──▶│   Pipeline   │──▶│ JSON store  │
//! │ + /upload│   │ Extract+Chunk│   │ knowledge + │
//! └──────────┘   │   +Embed     │   │  context    │
//!                └──────────────┘   └──────┬──────┘
//!                                          │
//!                      ┌───────────────────┤
//!                      ▼                   ▼
//!                 ┌──────────┐       ┌──────────────┐
//!                 │   CLI    │       │  HTTP (axum) │
//!                 │ (tutor)  │       │ chat/consult │
//!                 └──────────┘       └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! tutor ingest                  # ingest everything in ./uploads
//! tutor search "class sizes" --category Curriculum
//! tutor chat "How much are lessons?" --mode faq --category Pricing
//! tutor serve                   # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types and metadata filters |
//! | [`extract`] | Text extraction from PDF, DOCX, RTF, TXT |
//! | [`chunk`] | Overlapping text splitter |
//! | [`openai`] | Shared OpenAI HTTP client with retries |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`llm`] | Chat completion provider abstraction |
//! | [`store`] | JSON-backed knowledge and context store |
//! | [`tracker`] | Processed-file bookkeeping |
//! | [`ingest`] | Upload ingestion pipeline |
//! | [`assistant`] | FAQ answering and mode routing |
//! | [`consultation`] | Consultation state machine |
//! | [`server`] | HTTP API |
//! | [`stats`] | Knowledge-base statistics |
//! | [`export`] | JSON export of the knowledge base |
//! | [`logging`] | Tracing subscriber setup |

pub mod assistant;
pub mod chunk;
pub mod config;
pub mod consultation;
pub mod embedding;
pub mod export;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod models;
pub mod openai;
pub mod server;
pub mod stats;
pub mod store;
pub mod tracker;
