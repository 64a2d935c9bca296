//! Pre-flight checks before commands that call the provider or the store.
//!
//! Fails fast with an actionable message instead of midway through a request.

use crate::config::{Settings, StoreProvider};
use crate::error::{JoineryError, Result};

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Asking needs the API key and a reachable store.
    Ask,
    /// Serving has the same needs as asking.
    Serve,
    /// Indexing embeds locally and writes to SQLite.
    Index,
    /// Product import only touches SQLite.
    ImportProducts,
}

/// Run pre-flight checks for the given operation.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    match operation {
        Operation::Ask | Operation::Serve => {
            check_api_key(std::env::var("OPENAI_API_KEY").ok())?;
            check_api_base(settings.openai.api_base.as_deref())?;
            check_store(settings)?;
        }
        Operation::Index => {
            check_api_key(std::env::var("OPENAI_API_KEY").ok())?;
            check_api_base(settings.openai.api_base.as_deref())?;
            check_local_store(settings)?;
        }
        Operation::ImportProducts => {
            check_local_store(settings)?;
        }
    }
    Ok(())
}

fn check_api_key(key: Option<String>) -> Result<()> {
    match key {
        Some(key) if !key.is_empty() => Ok(()),
        Some(_) => Err(JoineryError::Config(
            "OPENAI_API_KEY is empty. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
        None => Err(JoineryError::Config(
            "OPENAI_API_KEY not set. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
    }
}

fn check_api_base(api_base: Option<&str>) -> Result<()> {
    let Some(base) = api_base else {
        return Ok(());
    };
    match url::Url::parse(base) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        Ok(parsed) => Err(JoineryError::Config(format!(
            "openai.api_base must be an http(s) URL, got scheme {:?}",
            parsed.scheme()
        ))),
        Err(e) => Err(JoineryError::Config(format!(
            "openai.api_base is not a valid URL ({}): {}",
            base, e
        ))),
    }
}

fn check_store(settings: &Settings) -> Result<()> {
    if settings.vector_store.provider == StoreProvider::Postgres && settings.postgres_url().is_none() {
        return Err(JoineryError::Config(
            "vector_store.provider is postgres but no postgres_url is configured \
             (set vector_store.postgres_url or POSTGRES_URL)"
                .to_string(),
        ));
    }
    Ok(())
}

fn check_local_store(settings: &Settings) -> Result<()> {
    if settings.vector_store.provider != StoreProvider::Sqlite {
        return Err(JoineryError::Config(format!(
            "indexing writes to the SQLite store, but vector_store.provider is {}",
            settings.vector_store.provider
        )));
    }
    Ok(())
}
