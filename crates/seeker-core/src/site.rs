//! Saved target site and per-kind save paths

use crate::query::MediaKind;
use crate::{Result, SeekerError};
use std::sync::Mutex;
use url::Url;

/// Default download directory for shows
pub const DEFAULT_SHOW_PATH: &str = "media-stack/shows";
/// Default download directory for movies
pub const DEFAULT_MOVIE_PATH: &str = "media-stack/movies";

/// Normalize a user-supplied site URL.
///
/// Adds `https://` when no http(s) scheme is present and returns the
/// parser's canonical serialization (bare hosts gain a trailing slash).
pub fn ensure_url(target: &str) -> Result<String> {
    let trimmed = target.trim();
    if trimmed.is_empty() {
        return Err(SeekerError::InvalidUrl("a URL string is required".to_string()));
    }

    let lower = trimmed.to_ascii_lowercase();
    let normalized = if lower.starts_with("http://") || lower.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let parsed = Url::parse(&normalized)
        .map_err(|e| SeekerError::InvalidUrl(format!("{}: {}", trimmed, e)))?;
    Ok(parsed.to_string())
}

/// The single saved target site
#[derive(Debug, Default)]
pub struct SiteStore {
    url: Mutex<Option<String>>,
}

impl SiteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize and store the site URL, returning the stored form
    pub fn set(&self, url: &str) -> Result<String> {
        let normalized = ensure_url(url)?;
        *self.url.lock().unwrap_or_else(|e| e.into_inner()) = Some(normalized.clone());
        Ok(normalized)
    }

    pub fn get(&self) -> Option<String> {
        self.url.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn clear(&self) {
        *self.url.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Paths {
    show: String,
    movie: String,
}

/// Download directory per media kind
#[derive(Debug)]
pub struct SavePaths {
    paths: Mutex<Paths>,
}

impl Default for SavePaths {
    fn default() -> Self {
        Self::with_paths(DEFAULT_SHOW_PATH, DEFAULT_MOVIE_PATH)
    }
}

impl SavePaths {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_paths(show: &str, movie: &str) -> Self {
        Self {
            paths: Mutex::new(Paths {
                show: show.to_string(),
                movie: movie.to_string(),
            }),
        }
    }

    /// Set the save path for one media kind
    pub fn set(&self, kind: MediaKind, path: &str) -> Result<()> {
        let path = path.trim();
        if path.is_empty() {
            return Err(SeekerError::MissingField("path"));
        }

        let mut paths = self.paths.lock().unwrap_or_else(|e| e.into_inner());
        match kind {
            MediaKind::Show => paths.show = path.to_string(),
            MediaKind::Movie => paths.movie = path.to_string(),
        }
        Ok(())
    }

    pub fn get(&self, kind: MediaKind) -> String {
        let paths = self.paths.lock().unwrap_or_else(|e| e.into_inner());
        match kind {
            MediaKind::Show => paths.show.clone(),
            MediaKind::Movie => paths.movie.clone(),
        }
    }
}
