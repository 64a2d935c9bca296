//! CLI module for Joinery.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Joinery - woodworking Q&A over a video transcript library
///
/// Answers questions from retrieved transcript excerpts, cites the videos
/// they came from, and links related products.
#[derive(Parser, Debug)]
#[command(name = "joinery")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "JOINERY_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check API key, configuration and store reachability
    Doctor,

    /// Ask a question and print the answer with video references
    Ask {
        /// The question to ask
        question: String,
    },

    /// Load a JSONL file into the local SQLite store
    Index {
        /// JSONL file, one record per line
        file: PathBuf,

        /// Collection (table) to write chunks into
        #[arg(long)]
        collection: Option<String>,

        /// Treat records as products ({id, title, tags, link}) instead of chunks
        #[arg(long)]
        products: bool,
    },

    /// Start the HTTP API server
    Serve {
        /// Host to bind to (defaults to server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (defaults to server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "rag.answer_model")
        key: String,
        /// Configuration value
        value: String,
    },

    /// Open configuration file in editor
    Edit,

    /// Show configuration file path
    Path,
}
