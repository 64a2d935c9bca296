//! Ask command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::llm::ChatMessage;
use crate::orchestrator::{ChatEvent, Orchestrator};
use crate::rag::{CitationPayload, Query, RelevanceLabel};
use anyhow::Result;
use futures::StreamExt;
use std::io::Write;
use uuid::Uuid;

/// Run the ask command.
pub async fn run_ask(question: &str, settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Ask, &settings) {
        Output::error(&e.to_string());
        Output::info("Run 'joinery doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let orchestrator = Orchestrator::new(&settings)?;
    let session_id = Uuid::new_v4().to_string();
    let query = Query::new(question, vec![ChatMessage::user(question)]);

    let spinner = Output::spinner("Searching knowledge base...");
    let response = match orchestrator.respond(&session_id, &query).await {
        Ok(response) => {
            spinner.finish_and_clear();
            response
        }
        Err(e) => {
            spinner.finish_and_clear();
            Output::error(&format!("Failed to generate answer: {}", e));
            return Err(e.into());
        }
    };

    println!();
    let mut in_band: Option<CitationPayload> = None;
    let mut events = response.events;
    let mut stdout = std::io::stdout();
    while let Some(event) = events.next().await {
        match event {
            ChatEvent::Token(token) => {
                print!("{}", token);
                stdout.flush()?;
            }
            ChatEvent::Citations(payload) => in_band = Some(payload),
            ChatEvent::Error(payload) => {
                println!();
                Output::error(&format!("Answer interrupted: {}", payload.message));
                anyhow::bail!("{}", payload.message);
            }
            ChatEvent::Done => {}
        }
    }
    println!("\n");

    if response.label != RelevanceLabel::Relevant {
        return Ok(());
    }

    if !response.sources.is_empty() {
        Output::header("Sources");
        for source in &response.sources {
            Output::source(&source.title, source.similarity_score, &source.text, &source.url);
        }
    }

    let payload = match in_band {
        Some(payload) => payload,
        None => {
            let spinner = Output::spinner("Finding video references...");
            let payload = orchestrator.request_citations(&session_id, None).await;
            spinner.finish_and_clear();
            payload
        }
    };

    if !payload.video_references.is_empty() {
        Output::header("Video References");
        for reference in payload.video_references.iter() {
            Output::reference(reference);
        }
    }

    if !payload.related_products.is_empty() {
        Output::header("Related Products");
        for product in &payload.related_products {
            Output::product(product);
        }
    }

    Ok(())
}
