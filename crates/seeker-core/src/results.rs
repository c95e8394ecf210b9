//! Short-lived result tokens
//!
//! A ranked result set is stored behind a random token so a later action
//! ("download #3") can fetch the exact record without searching again.

use crate::query::MediaKind;
use crate::rank::RankedResult;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

/// How long a stored result set stays readable
pub const RESULT_TTL: Duration = Duration::from_secs(15 * 60);

/// Options the search ran with, needed to act on a result later
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    pub use_flaresolverr: bool,
    pub base_url: String,
    pub search_type: MediaKind,
}

#[derive(Debug, Clone)]
struct StoredResults {
    results: Vec<RankedResult>,
    options: SearchOptions,
    created_at: Instant,
}

/// A single result resolved from a token
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedResult {
    pub result: RankedResult,
    pub options: SearchOptions,
}

/// Token-keyed store of recent result sets
#[derive(Debug)]
pub struct ResultStore {
    entries: Mutex<HashMap<String, StoredResults>>,
    ttl: Duration,
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::with_ttl(RESULT_TTL)
    }
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Store a result set and return its token
    pub fn save_results(&self, results: Vec<RankedResult>, options: SearchOptions) -> String {
        self.save_results_at(results, options, Instant::now())
    }

    fn save_results_at(
        &self,
        results: Vec<RankedResult>,
        options: SearchOptions,
        now: Instant,
    ) -> String {
        let token = Uuid::new_v4().to_string();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        let before = entries.len();
        entries.retain(|_, entry| !self.is_expired(entry, now));
        if entries.len() < before {
            debug!("Evicted {} expired result sets", before - entries.len());
        }

        entries.insert(
            token.clone(),
            StoredResults {
                results,
                options,
                created_at: now,
            },
        );
        token
    }

    /// Look up result `index` of the set behind `token`
    pub fn get_result(&self, token: &str, index: usize) -> Option<ResolvedResult> {
        self.get_result_at(token, index, Instant::now())
    }

    fn get_result_at(&self, token: &str, index: usize, now: Instant) -> Option<ResolvedResult> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if self.is_expired(entries.get(token)?, now) {
            entries.remove(token);
            return None;
        }

        let entry = entries.get(token)?;
        let result = entry.results.get(index)?.clone();
        Some(ResolvedResult {
            result,
            options: entry.options.clone(),
        })
    }

    /// Forget a token
    pub fn clear_token(&self, token: &str) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(token);
    }

    /// Number of stored sets, expired or not
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_expired(&self, entry: &StoredResults, now: Instant) -> bool {
        now.saturating_duration_since(entry.created_at) > self.ttl
    }
}
