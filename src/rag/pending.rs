//! Per-session state carried from answer streaming to citation extraction.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// What the extractor needs once the answer is known.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingExtractionContext {
    /// Formatted context the answer was grounded in.
    pub context: String,
    /// The search query used for retrieval.
    pub query: String,
    /// Full answer text, once streaming has finished.
    pub answer: Option<String>,
}

/// Pending extraction contexts keyed by session id.
///
/// Entries expire after the TTL and are removed when taken.
pub struct PendingContextStore {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, PendingExtractionContext)>>,
}

impl PendingContextStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn with_entries<R>(
        &self,
        f: impl FnOnce(&mut HashMap<String, (Instant, PendingExtractionContext)>) -> R,
    ) -> R {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let ttl = self.ttl;
        entries.retain(|_, (created, _)| created.elapsed() < ttl);
        f(&mut entries)
    }

    /// Store a context for `session_id`, replacing any earlier one.
    pub fn put(&self, session_id: &str, context: PendingExtractionContext) {
        self.with_entries(|entries| {
            entries.insert(session_id.to_string(), (Instant::now(), context));
        });
        debug!("Stored pending context for session {}", session_id);
    }

    /// Attach the finished answer; returns false when nothing is pending.
    pub fn record_answer(&self, session_id: &str, answer: &str) -> bool {
        self.with_entries(|entries| match entries.get_mut(session_id) {
            Some((_, pending)) => {
                pending.answer = Some(answer.to_string());
                true
            }
            None => false,
        })
    }

    /// Remove and return the context for `session_id`.
    pub fn take(&self, session_id: &str) -> Option<PendingExtractionContext> {
        self.with_entries(|entries| entries.remove(session_id).map(|(_, pending)| pending))
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.with_entries(|entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
