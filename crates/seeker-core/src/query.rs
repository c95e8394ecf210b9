//! Search term and search URL construction

use crate::{Result, SeekerError};
use serde::{Deserialize, Serialize};
use url::Url;

/// Kind of media being searched for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Show,
}

impl std::str::FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "movie" | "film" => Ok(MediaKind::Movie),
            "show" | "tv" | "series" => Ok(MediaKind::Show),
            _ => Err(format!("Unknown media type: {}. Use 'movie' or 'show'", s)),
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Movie => write!(f, "movie"),
            MediaKind::Show => write!(f, "show"),
        }
    }
}

/// A validated search request. Shows always carry a season; a missing
/// episode means the whole season.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub kind: MediaKind,
    pub title: String,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

impl SearchQuery {
    /// Validate and build a query
    pub fn new(
        kind: MediaKind,
        title: &str,
        season: Option<u32>,
        episode: Option<u32>,
    ) -> Result<Self> {
        let title = title.trim();
        if title.is_empty() {
            return Err(SeekerError::MissingField("title"));
        }

        match kind {
            MediaKind::Movie => Ok(Self {
                kind,
                title: title.to_string(),
                season: None,
                episode: None,
            }),
            MediaKind::Show => {
                let season = season.ok_or(SeekerError::MissingField("season"))?;
                Ok(Self {
                    kind,
                    title: title.to_string(),
                    season: Some(season),
                    episode,
                })
            }
        }
    }

    pub fn movie(title: &str) -> Result<Self> {
        Self::new(MediaKind::Movie, title, None, None)
    }

    pub fn episode(title: &str, season: u32, episode: u32) -> Result<Self> {
        Self::new(MediaKind::Show, title, Some(season), Some(episode))
    }

    pub fn season(title: &str, season: u32) -> Result<Self> {
        Self::new(MediaKind::Show, title, Some(season), None)
    }

    /// Canonical search term for this query
    pub fn term(&self) -> String {
        match (self.kind, self.season, self.episode) {
            (MediaKind::Show, Some(season), Some(episode)) => {
                format!("{} s{:02}e{:02}", self.title, season, episode)
            }
            (MediaKind::Show, Some(season), None) => format!("{} s{:02}", self.title, season),
            _ => self.title.clone(),
        }
    }
}

/// Build a search term from loosely-typed inputs.
///
/// Shows require both season and episode here; use [`build_season_term`]
/// for whole-season searches.
pub fn build_search_term(
    kind: Option<MediaKind>,
    title: Option<&str>,
    season: Option<u32>,
    episode: Option<u32>,
) -> Result<String> {
    let kind = kind.ok_or(SeekerError::MissingField("type"))?;
    let title = title.ok_or(SeekerError::MissingField("title"))?;

    if kind == MediaKind::Show && episode.is_none() {
        if season.is_none() {
            return Err(SeekerError::MissingField("season"));
        }
        return Err(SeekerError::MissingField("episode"));
    }

    Ok(SearchQuery::new(kind, title, season, episode)?.term())
}

/// Build a whole-season search term (`"{title} s{season:02}"`)
pub fn build_season_term(title: Option<&str>, season: Option<u32>) -> Result<String> {
    let title = title.ok_or(SeekerError::MissingField("title"))?;
    Ok(SearchQuery::new(MediaKind::Show, title, season, None)?.term())
}

/// Lowercase and hyphenate a term for use in a URL path
pub fn slugify(term: &str) -> String {
    let mut slug = String::with_capacity(term.len());
    let mut pending_hyphen = false;

    for c in term.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

/// Build `{origin}/search/all/{slug}/` for a site
pub fn build_search_url(base: &str, term: &str) -> Result<String> {
    let base = Url::parse(&crate::site::ensure_url(base)?)?;
    Ok(format!(
        "{}/search/all/{}/",
        base.origin().ascii_serialization(),
        slugify(term)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_show_term_padded() {
        let term =
            build_search_term(Some(MediaKind::Show), Some("South Park"), Some(1), Some(2)).unwrap();
        assert_eq!(term, "South Park s01e02");
    }

    #[test]
    fn test_build_movie_term() {
        let term = build_search_term(Some(MediaKind::Movie), Some("Inception"), None, None).unwrap();
        assert_eq!(term, "Inception");
    }

    #[test]
    fn test_build_term_missing_fields() {
        assert!(matches!(
            build_search_term(None, Some("Inception"), None, None),
            Err(SeekerError::MissingField("type"))
        ));
        assert!(matches!(
            build_search_term(Some(MediaKind::Movie), None, None, None),
            Err(SeekerError::MissingField("title"))
        ));
        assert!(matches!(
            build_search_term(Some(MediaKind::Show), Some("South Park"), None, Some(2)),
            Err(SeekerError::MissingField("season"))
        ));
        assert!(matches!(
            build_search_term(Some(MediaKind::Show), Some("South Park"), Some(1), None),
            Err(SeekerError::MissingField("episode"))
        ));
    }

    #[test]
    fn test_build_season_term() {
        assert_eq!(
            build_season_term(Some("The Wire"), Some(3)).unwrap(),
            "The Wire s03"
        );
        assert!(matches!(
            build_season_term(Some("The Wire"), None),
            Err(SeekerError::MissingField("season"))
        ));
    }

    #[test]
    fn test_query_term_large_numbers() {
        let query = SearchQuery::episode("Show", 12, 104).unwrap();
        assert_eq!(query.term(), "Show s12e104");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("South Park s01e02"), "south-park-s01e02");
        assert_eq!(slugify("  Spider-Man: No Way Home! "), "spider-man-no-way-home");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn test_build_search_url() {
        let url = build_search_url("https://www.site.fun", "South Park s04e05").unwrap();
        assert_eq!(url, "https://www.site.fun/search/all/south-park-s04e05/");
    }

    #[test]
    fn test_build_search_url_uses_origin() {
        let url = build_search_url("www.site.fun/home?page=2", "Inception").unwrap();
        assert_eq!(url, "https://www.site.fun/search/all/inception/");
    }

    #[test]
    fn test_media_kind_from_str() {
        assert_eq!("Show".parse::<MediaKind>().unwrap(), MediaKind::Show);
        assert_eq!("movie".parse::<MediaKind>().unwrap(), MediaKind::Movie);
        assert!("album".parse::<MediaKind>().is_err());
    }
}
