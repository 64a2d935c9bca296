//! Doctor command - verify configuration and store reachability.

use crate::catalog::{PgProductCatalog, ProductCatalog};
use crate::cli::Output;
use crate::config::{Settings, StoreProvider};
use crate::vector_store::{PgPool, PgVectorStore, SqliteVectorStore, VectorStore};
use console::style;
use std::sync::Arc;
use std::time::Duration;

/// Check result for a single item.
#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, message: &str, hint: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.to_string(),
            hint: hint.map(str::to_string),
        }
    }

    fn ok(name: &str, message: &str) -> Self {
        Self::new(name, CheckStatus::Ok, message, None)
    }

    fn warning(name: &str, message: &str, hint: &str) -> Self {
        Self::new(name, CheckStatus::Warning, message, Some(hint))
    }

    fn error(name: &str, message: &str, hint: &str) -> Self {
        Self::new(name, CheckStatus::Error, message, Some(hint))
    }

    fn print(&self) {
        let icon = match self.status {
            CheckStatus::Ok => style("✓").green(),
            CheckStatus::Warning => style("!").yellow(),
            CheckStatus::Error => style("✗").red(),
        };

        println!("  {} {} - {}", icon, style(&self.name).bold(), self.message);

        if let Some(hint) = &self.hint {
            println!("    {} {}", style("→").dim(), style(hint).dim());
        }
    }
}

/// Run all diagnostic checks.
pub async fn run_doctor(settings: &Settings) -> anyhow::Result<()> {
    Output::header("Joinery Doctor");
    println!();
    println!("Checking configuration and storage...\n");

    let mut checks = Vec::new();

    let store_checks = match settings.vector_store.provider {
        StoreProvider::Sqlite => check_sqlite(settings).await,
        StoreProvider::Postgres => check_postgres(settings).await,
    };
    let sections = [
        (
            "Provider".to_string(),
            vec![check_openai_api_key(std::env::var("OPENAI_API_KEY").ok())],
        ),
        ("Configuration".to_string(), vec![check_config_file()]),
        (
            format!("Storage ({})", settings.vector_store.provider),
            store_checks,
        ),
    ];

    for (title, section) in sections {
        println!("{}", style(title).bold());
        for check in &section {
            check.print();
        }
        checks.extend(section);
        println!();
    }

    let count = |status: CheckStatus| checks.iter().filter(|c| c.status == status).count();
    let (errors, warnings) = (count(CheckStatus::Error), count(CheckStatus::Warning));

    if errors > 0 {
        Output::error(&format!(
            "{} error(s) found. Please fix them before using Joinery.",
            errors
        ));
        std::process::exit(1);
    } else if warnings > 0 {
        Output::warning(&format!("All checks passed with {} warning(s).", warnings));
    } else {
        Output::success("All checks passed! Joinery is ready to use.");
    }

    Ok(())
}

/// Check the OpenAI API key.
fn check_openai_api_key(key: Option<String>) -> CheckResult {
    match key {
        Some(key) if key.starts_with("sk-") && key.len() > 20 => {
            let masked = format!("{}...{}", &key[..7], &key[key.len() - 4..]);
            CheckResult::ok("OPENAI_API_KEY", &format!("configured ({})", masked))
        }
        Some(key) if key.is_empty() => CheckResult::error(
            "OPENAI_API_KEY",
            "empty",
            "Set with: export OPENAI_API_KEY='sk-...'",
        ),
        Some(_) => CheckResult::warning(
            "OPENAI_API_KEY",
            "set but format looks unusual",
            "Expected format: sk-... (OpenAI API key)",
        ),
        None => CheckResult::error(
            "OPENAI_API_KEY",
            "not set",
            "Set with: export OPENAI_API_KEY='sk-...'",
        ),
    }
}

/// Check if config file exists.
fn check_config_file() -> CheckResult {
    let config_path = Settings::default_config_path();
    if config_path.exists() {
        CheckResult::ok("Config file", &format!("{}", config_path.display()))
    } else {
        CheckResult::warning(
            "Config file",
            "using defaults",
            "Create with: joinery config edit",
        )
    }
}

fn collection_check(collection: &str, count: crate::Result<usize>) -> CheckResult {
    let name = format!("Collection '{}'", collection);
    match count {
        Ok(0) => CheckResult::warning(&name, "empty", "Load chunks with: joinery index <file.jsonl>"),
        Ok(n) => CheckResult::ok(&name, &format!("{} chunks", n)),
        Err(e) => CheckResult::error(
            &name,
            &e.to_string(),
            "Load chunks with: joinery index <file.jsonl>",
        ),
    }
}

async fn check_sqlite(settings: &Settings) -> Vec<CheckResult> {
    let mut results = Vec::new();
    let db_path = settings.sqlite_path();

    if !db_path.exists() {
        results.push(CheckResult::warning(
            "Database",
            &format!("{} (not created yet)", db_path.display()),
            "Database will be created by: joinery index <file.jsonl>",
        ));
        return results;
    }

    let size = std::fs::metadata(&db_path)
        .map(|m| format_size(m.len()))
        .unwrap_or_else(|_| "unknown size".to_string());
    results.push(CheckResult::ok(
        "Database",
        &format!("{} ({})", db_path.display(), size),
    ));

    match SqliteVectorStore::new(&db_path) {
        Ok(store) => {
            let collection = &settings.vector_store.collection;
            results.push(collection_check(collection, store.count(collection).await));
        }
        Err(e) => results.push(CheckResult::error(
            "Database",
            &e.to_string(),
            "Check file permissions",
        )),
    }

    results
}

async fn check_postgres(settings: &Settings) -> Vec<CheckResult> {
    let Some(url) = settings.postgres_url() else {
        return vec![CheckResult::error(
            "Postgres URL",
            "not configured",
            "Set vector_store.postgres_url or POSTGRES_URL",
        )];
    };

    let pool = match PgPool::new(
        &url,
        1,
        Duration::from_secs(settings.vector_store.connect_timeout_secs),
        settings.vector_store.idle_timeout(),
    ) {
        Ok(pool) => Arc::new(pool),
        Err(e) => {
            return vec![CheckResult::error("Postgres URL", &e.to_string(), "Check the connection string")]
        }
    };

    if let Err(e) = pool.client().await {
        return vec![CheckResult::error(
            "Postgres",
            &e.to_string(),
            "Check that the database is reachable",
        )];
    }

    let mut results = vec![CheckResult::ok("Postgres", "connected")];
    let collection = &settings.vector_store.collection;
    let store = PgVectorStore::new(pool.clone());
    results.push(collection_check(collection, store.count(collection).await));

    let catalog = PgProductCatalog::new(pool);
    match catalog.find_by_titles(&["__doctor__".to_string()]).await {
        Ok(_) => results.push(CheckResult::ok("Products table", "queryable")),
        Err(e) => results.push(CheckResult::warning(
            "Products table",
            &e.to_string(),
            "Product links will be empty until the products table exists",
        )),
    }

    results
}

/// Format file size in human-readable format.
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
