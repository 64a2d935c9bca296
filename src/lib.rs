//! Joinery - woodworking Q&A with video citations
//!
//! Answers questions about a library of woodworking videos. Each question is
//! classified, rewritten for search, matched against transcript chunks and
//! answered by a streamed completion grounded in those chunks. A follow-up
//! request turns the answer into timestamped video references and related
//! products.
//!
//! # Architecture
//!
//! - `config` - Settings and prompt templates
//! - `llm` - Chat completion abstraction
//! - `embedding` - Query embedding with bounded retries
//! - `vector_store` - Transcript chunk similarity search (SQLite, Postgres)
//! - `catalog` - Product lookups by video title
//! - `rag` - Pipeline stages and citation extraction
//! - `orchestrator` - Per-request coordination and the event stream
//! - `cli` - Command-line interface and HTTP server
//!
//! # Example
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use joinery::config::Settings;
//! use joinery::orchestrator::{ChatEvent, Orchestrator};
//! use joinery::rag::Query;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::new(&settings)?;
//!
//!     let query = Query::new("How do I flatten a workbench top?", Vec::new());
//!     let mut response = orchestrator.respond("session-1", &query).await?;
//!     while let Some(event) = response.events.next().await {
//!         if let ChatEvent::Token(token) = event {
//!             print!("{}", token);
//!         }
//!     }
//!
//!     let citations = orchestrator.request_citations("session-1", None).await;
//!     println!("{} video references", citations.video_references.len());
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod openai;
pub mod orchestrator;
pub mod rag;
pub mod vector_store;

pub use error::{JoineryError, Result};
