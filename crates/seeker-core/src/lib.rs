//! Seeker Core Library
//!
//! Core functionality for Seeker including:
//! - Site URL normalization and search URL building
//! - Direct, bypass-proxy, and headless browser fetching
//! - Result table extraction and multi-key ranking
//! - Browser lifecycle management with page recovery
//! - Result tokens and interactive search sessions
//! - qBittorrent hand-off and progress rendering

pub mod autocorrect;
pub mod browser;
pub mod chrome;
pub mod download;
pub mod extract;
pub mod fetch;
pub mod flaresolverr;
pub mod progress;
pub mod qbittorrent;
pub mod query;
pub mod rank;
pub mod results;
pub mod search;
pub mod session;
pub mod site;

use thiserror::Error;

// Re-export key types
pub use autocorrect::{autocorrect_title, GoogleSuggest, TitleCorrector};
pub use browser::{ActivePage, BrowserManager, BrowserOptions};
pub use chrome::ChromeLauncher;
pub use download::{DownloadTracker, TrackOutcome};
pub use fetch::{FetchStrategy, Fetcher, SearchRequest};
pub use progress::{ProgressSink, ProgressTracker};
pub use qbittorrent::{AddTorrent, QbitClient, QbitConfig};
pub use query::{MediaKind, SearchQuery};
pub use rank::RankedResult;
pub use results::{ResultStore, SearchOptions};
pub use search::SearchService;
pub use session::{Details, Scope, SearchPlan, Session, SessionStore, Step};
pub use site::{ensure_url, SavePaths, SiteStore};

#[derive(Error, Debug)]
pub enum SeekerError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("Request to {url} failed with status {status}")]
    Fetch { status: u16, url: String },

    #[error("FlareSolverr error: {0}")]
    Proxy(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("This session expired. Start a new search.")]
    SessionExpired,

    #[error("This session belongs to another user")]
    OwnershipViolation,

    #[error("Cannot {action} while {state}")]
    InvalidTransition {
        state: &'static str,
        action: &'static str,
    },

    #[error("qBittorrent authentication failed: {0}")]
    AuthFailed(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<url::ParseError> for SeekerError {
    fn from(err: url::ParseError) -> Self {
        SeekerError::InvalidUrl(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SeekerError>;

/// Configuration for HTTP fetching
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string
    pub user_agent: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// FlareSolverr endpoint (without the `/v1` suffix)
    pub flaresolverr_url: Option<String>,
    /// `maxTimeout` passed to FlareSolverr, in milliseconds
    pub flaresolverr_timeout_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: format!(
                "Mozilla/5.0 (X11; Linux x86_64) Seeker/{}",
                env!("CARGO_PKG_VERSION")
            ),
            timeout_secs: 30,
            flaresolverr_url: None,
            flaresolverr_timeout_ms: flaresolverr::DEFAULT_MAX_TIMEOUT_MS,
        }
    }
}
