//! Search orchestration
//!
//! Builds the search term and URL, retrieves the page through the chosen
//! strategy, extracts and ranks the rows. Also resolves a chosen result to
//! a downloadable link.

use crate::extract::{extract_download_link, extract_rows_from_html};
use crate::fetch::{FetchStrategy, Fetcher, SearchRequest};
use crate::progress::ProgressSink;
use crate::query::SearchQuery;
use crate::rank::{rank_rows, RankedResult};
use crate::results::SearchOptions;
use crate::session::{Scope, SearchPlan};
use crate::{Result, SeekerError};
use std::sync::Arc;
use tracing::{debug, info};

/// Upper bound on seasons probed for an all-seasons search
pub const MAX_SEASON_PROBE: u32 = 20;

/// Ranked results for one search term
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub term: String,
    /// URL the results were read from
    pub page_url: String,
    pub results: Vec<RankedResult>,
}

/// Results of a session's search plan, one outcome per searched term
#[derive(Debug, Clone, Default)]
pub struct PlanOutcome {
    pub outcomes: Vec<SearchOutcome>,
    /// Seasons found by an all-seasons search
    pub season_count: Option<u32>,
}

impl PlanOutcome {
    pub fn total_results(&self) -> usize {
        self.outcomes.iter().map(|o| o.results.len()).sum()
    }
}

/// Runs searches against the configured site
pub struct SearchService {
    fetcher: Arc<Fetcher>,
}

impl SearchService {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self { fetcher }
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// Search for `query` on the site at `base_url`
    pub async fn search(
        &self,
        query: &SearchQuery,
        base_url: &str,
        strategy: &FetchStrategy,
        progress: &dyn ProgressSink,
    ) -> Result<SearchOutcome> {
        let term = query.term();
        let request = SearchRequest::new(base_url, &term)?;
        info!("Searching for \"{}\" via {}", term, strategy);
        progress.step(&format!("Searching for \"{}\" ({})", term, strategy));

        let page = self.fetcher.retrieve(&request, strategy, progress).await?;
        let rows = extract_rows_from_html(&page.html, &page.url);
        debug!("{} raw rows from {}", rows.len(), page.url);

        let results = rank_rows(&rows);
        progress.step(&format!(
            "Search finished via {} with {} result(s)",
            page.url,
            results.len()
        ));

        Ok(SearchOutcome {
            term,
            page_url: page.url,
            results,
        })
    }

    /// Run everything a session asked for. All-seasons plans search each
    /// season in turn until one comes back empty.
    pub async fn run_plan(
        &self,
        plan: &SearchPlan,
        base_url: &str,
        progress: &dyn ProgressSink,
    ) -> Result<PlanOutcome> {
        if plan.scope != Scope::AllSeasons {
            let outcome = self
                .search(&plan.query()?, base_url, &plan.strategy, progress)
                .await?;
            return Ok(PlanOutcome {
                outcomes: vec![outcome],
                season_count: None,
            });
        }

        let mut outcomes = Vec::new();
        for season in 1..=MAX_SEASON_PROBE {
            let query = plan.season_query(season)?;
            let outcome = self
                .search(&query, base_url, &plan.strategy, progress)
                .await?;
            if outcome.results.is_empty() {
                break;
            }
            outcomes.push(outcome);
        }

        let season_count = outcomes.len() as u32;
        progress.step(&format!("Found {} season(s) of {}", season_count, plan.title));
        Ok(PlanOutcome {
            outcomes,
            season_count: Some(season_count),
        })
    }

    /// Turn a stored result into a magnet or `.torrent` link, following its
    /// detail page when needed
    pub async fn resolve_download_link(
        &self,
        result: &RankedResult,
        options: &SearchOptions,
        progress: &dyn ProgressSink,
    ) -> Result<String> {
        let detail_url = result
            .detail_url
            .as_deref()
            .ok_or_else(|| SeekerError::ElementNotFound(format!("link for {}", result.name)))?;

        if is_direct_download(detail_url) {
            return Ok(detail_url.to_string());
        }

        progress.step(&format!("Opening the detail page for {}", result.name));
        self.resolve_link(detail_url, options.use_flaresolverr).await
    }

    /// Magnet or `.torrent` link for `link`, reading it as a detail page
    /// unless it already is one
    pub async fn resolve_link(&self, link: &str, use_proxy: bool) -> Result<String> {
        if is_direct_download(link) {
            return Ok(link.to_string());
        }

        let page = self.fetcher.fetch_url(link, use_proxy).await?;
        extract_download_link(&page.html, &page.url).ok_or_else(|| {
            SeekerError::ElementNotFound(format!("download link on {}", page.url))
        })
    }
}

/// Magnet links and `.torrent` files need no detail page
pub fn is_direct_download(link: &str) -> bool {
    let lower = link.to_lowercase();
    let path = lower.split(['?', '#']).next().unwrap_or("");
    lower.starts_with("magnet:") || path.ends_with(".torrent")
}

/// One numbered line per result, for text replies
pub fn describe_result(index: usize, result: &RankedResult) -> String {
    let quality = result
        .quality
        .as_deref()
        .map(str::to_uppercase)
        .unwrap_or_else(|| "Unknown quality".to_string());
    let health = if result.health > 0 {
        format!("{} health/seed score", result.health)
    } else {
        "Unknown health".to_string()
    };

    format!(
        "{}. {}\n   Quality: {} | Size: {} | Health: {}",
        index + 1,
        result.name,
        quality,
        result.size_text,
        health
    )
}
