//! OpenAI client configuration and bounded-call helpers.

use crate::error::{JoineryError, Result};
use async_openai::{config::OpenAIConfig, Client};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Create an OpenAI client with an optional API base and a custom HTTP timeout.
///
/// The API key is read from `OPENAI_API_KEY` by `async-openai`.
pub fn create_client_with(api_base: Option<&str>, timeout: Duration) -> Result<Client<OpenAIConfig>> {
    let http_client = reqwest::Client::builder().timeout(timeout).build()?;

    let mut config = OpenAIConfig::default();
    if let Some(base) = api_base {
        config = config.with_api_base(base);
    }

    Ok(Client::with_config(config).with_http_client(http_client))
}

/// Await `fut`, failing with [`JoineryError::Timeout`] once `timeout` elapses.
pub async fn bounded<T, F>(stage: &'static str, timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(JoineryError::Timeout {
            stage,
            seconds: timeout.as_secs_f64(),
        }),
    }
}

/// Run `op` with a per-attempt timeout, retrying up to `max_retries` extra times.
///
/// The last error is returned once all attempts are spent.
pub async fn with_retries<T, F, Fut>(
    stage: &'static str,
    timeout: Duration,
    max_retries: usize,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0usize;
    loop {
        match bounded(stage, timeout, op()).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_retries => {
                attempt += 1;
                warn!("{} attempt {} failed, retrying: {}", stage, attempt, e);
                tokio::time::sleep(retry_backoff(attempt)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(4) as u32;
    Duration::from_millis(100 * (1 << capped))
}
