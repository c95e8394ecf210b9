//! Interactive search sessions
//!
//! A session collects one user's search intent over several independent
//! interactions:
//!
//! ```text
//! AwaitingFetchMode -> [AwaitingProxyChoice] -> AwaitingType -> AwaitingDetails
//!     -> [AwaitingCorrection] -> [AwaitingScope] -> Searching -> Done
//! ```
//!
//! Every transition checks the session owner and the current state, and
//! validates its input before touching the session. The transition that
//! completes the input returns a [`SearchPlan`].
//!
//! Whether detail pages go through FlareSolverr is asked separately from the
//! fetch mode. The proxy fetch mode implies it and skips the question.

use crate::fetch::FetchStrategy;
use crate::query::{MediaKind, SearchQuery};
use crate::results::SearchOptions;
use crate::{Result, SeekerError};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

/// Sessions untouched for this long are dropped
pub const SESSION_IDLE_TTL: Duration = Duration::from_secs(30 * 60);

/// Granularity of what to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Episode,
    Season,
    AllSeasons,
    Movie,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Episode => write!(f, "single episode"),
            Scope::Season => write!(f, "full season"),
            Scope::AllSeasons => write!(f, "all seasons"),
            Scope::Movie => write!(f, "movie"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingFetchMode,
    AwaitingProxyChoice,
    AwaitingType,
    AwaitingDetails,
    AwaitingCorrection,
    AwaitingScope,
    Searching,
    Done,
}

impl SessionState {
    pub fn describe(&self) -> &'static str {
        match self {
            SessionState::AwaitingFetchMode => "choosing a fetch mode",
            SessionState::AwaitingProxyChoice => "choosing whether to use FlareSolverr",
            SessionState::AwaitingType => "choosing a media type",
            SessionState::AwaitingDetails => "entering title details",
            SessionState::AwaitingCorrection => "confirming a title correction",
            SessionState::AwaitingScope => "choosing a scope",
            SessionState::Searching => "searching",
            SessionState::Done => "finished",
        }
    }
}

/// Title, season and episode as entered by the user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Details {
    pub name: String,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub owner_id: String,
    pub state: SessionState,
    pub strategy: Option<FetchStrategy>,
    pub use_flaresolverr: Option<bool>,
    pub kind: Option<MediaKind>,
    pub name: Option<String>,
    pub original_name: Option<String>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub scope: Option<Scope>,
    pub corrected: Option<String>,
    pub season_count: Option<u32>,
    pub requested_all_seasons: bool,
    touched_at: Instant,
}

impl Session {
    fn new(owner_id: &str, now: Instant) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            state: SessionState::AwaitingFetchMode,
            strategy: None,
            use_flaresolverr: None,
            kind: None,
            name: None,
            original_name: None,
            season: None,
            episode: None,
            scope: None,
            corrected: None,
            season_count: None,
            requested_all_seasons: false,
            touched_at: now,
        }
    }

    fn expect_state(&self, expected: SessionState, action: &'static str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SeekerError::InvalidTransition {
                state: self.state.describe(),
                action,
            })
        }
    }

    /// Human-readable summary of the choices made so far
    pub fn summary(&self) -> Vec<String> {
        let mut lines = vec![
            format!(
                "Fetch mode: {}",
                self.strategy
                    .as_ref()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "Choose an option".to_string())
            ),
            format!(
                "FlareSolverr: {}",
                match self.use_flaresolverr {
                    Some(true) => "yes",
                    Some(false) => "no",
                    None => "Choose an option",
                }
            ),
            format!(
                "Type: {}",
                self.kind
                    .map(|k| k.to_string())
                    .unwrap_or_else(|| "Select media type".to_string())
            ),
        ];

        match (self.kind, self.name.as_deref()) {
            (Some(MediaKind::Show), Some(name)) => {
                let mut detail = name.to_string();
                if let Some(season) = self.season {
                    detail.push_str(&format!(" - S{:02}", season));
                    if let Some(episode) = self.episode {
                        detail.push_str(&format!("E{:02}", episode));
                    }
                }
                lines.push(format!("Show: {}", detail));
            }
            (Some(MediaKind::Show), None) => {
                lines.push("Show: Enter show name, season, and episode".to_string())
            }
            (Some(MediaKind::Movie), Some(name)) => lines.push(format!("Movie: {}", name)),
            (Some(MediaKind::Movie), None) => lines.push("Movie: Enter movie name".to_string()),
            _ => {}
        }

        if let Some(scope) = self.scope {
            lines.push(format!("Scope: {}", scope));
        }
        lines
    }

    fn after_title(&mut self) -> Step {
        match (self.kind, self.episode) {
            (Some(MediaKind::Show), None) => {
                self.state = SessionState::AwaitingScope;
                Step::Prompt(SessionState::AwaitingScope)
            }
            (Some(MediaKind::Show), Some(_)) => self.begin_search(Scope::Episode),
            _ => self.begin_search(Scope::Movie),
        }
    }

    fn begin_search(&mut self, scope: Scope) -> Step {
        self.scope = Some(scope);
        self.requested_all_seasons = scope == Scope::AllSeasons;
        self.state = SessionState::Searching;
        Step::Search(self.plan())
    }

    fn plan(&self) -> SearchPlan {
        SearchPlan {
            session_id: self.id.clone(),
            strategy: self.strategy.unwrap_or_default(),
            use_flaresolverr: self.use_flaresolverr.unwrap_or(false),
            kind: self.kind.unwrap_or(MediaKind::Movie),
            title: self.name.clone().unwrap_or_default(),
            season: self.season,
            episode: self.episode,
            scope: self.scope.unwrap_or(Scope::Movie),
        }
    }
}

/// Everything needed to run the search a session asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPlan {
    pub session_id: String,
    pub strategy: FetchStrategy,
    /// Read detail pages through FlareSolverr
    pub use_flaresolverr: bool,
    pub kind: MediaKind,
    pub title: String,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub scope: Scope,
}

impl SearchPlan {
    /// The query for this plan. All-seasons plans return the first season;
    /// use [`SearchPlan::season_query`] for the others.
    pub fn query(&self) -> Result<SearchQuery> {
        match self.scope {
            Scope::Movie => SearchQuery::movie(&self.title),
            Scope::Episode => SearchQuery::new(MediaKind::Show, &self.title, self.season, self.episode),
            Scope::Season => SearchQuery::new(MediaKind::Show, &self.title, self.season, None),
            Scope::AllSeasons => self.season_query(1),
        }
    }

    pub fn season_query(&self, season: u32) -> Result<SearchQuery> {
        SearchQuery::season(&self.title, season)
    }

    /// Options stored with this plan's results
    pub fn search_options(&self, base_url: &str) -> SearchOptions {
        SearchOptions {
            use_flaresolverr: self.use_flaresolverr,
            base_url: base_url.to_string(),
            search_type: self.kind,
        }
    }
}

/// Outcome of a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// More input is needed; the session is now in this state
    Prompt(SessionState),
    /// Input is complete; the session is now searching
    Search(SearchPlan),
}

/// All live sessions, keyed by session id
#[derive(Debug)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    idle_ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_idle_ttl(SESSION_IDLE_TTL)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_ttl,
        }
    }

    /// Start a new session for `owner_id`
    pub fn start(&self, owner_id: &str) -> Session {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());

        let before = sessions.len();
        sessions.retain(|_, s| now.saturating_duration_since(s.touched_at) < self.idle_ttl);
        if sessions.len() < before {
            debug!("Evicted {} idle sessions", before - sessions.len());
        }

        let session = Session::new(owner_id, now);
        sessions.insert(session.id.clone(), session.clone());
        session
    }

    /// Current view of a session
    pub fn get(&self, id: &str, user_id: &str) -> Result<Session> {
        self.update(id, user_id, |s| Ok(s.clone()))
    }

    /// Pick how the results page is fetched. The proxy mode also settles the
    /// FlareSolverr question; the others ask it next.
    pub fn choose_fetch_mode(&self, id: &str, user_id: &str, strategy: FetchStrategy) -> Result<Step> {
        self.update(id, user_id, |s| {
            s.expect_state(SessionState::AwaitingFetchMode, "choose a fetch mode")?;
            s.strategy = Some(strategy);
            if strategy.uses_proxy() {
                s.use_flaresolverr = Some(true);
                s.state = SessionState::AwaitingType;
            } else {
                s.state = SessionState::AwaitingProxyChoice;
            }
            Ok(Step::Prompt(s.state))
        })
    }

    /// Decide whether detail pages are read through FlareSolverr
    pub fn choose_proxy(&self, id: &str, user_id: &str, use_flaresolverr: bool) -> Result<Step> {
        self.update(id, user_id, |s| {
            s.expect_state(SessionState::AwaitingProxyChoice, "choose FlareSolverr")?;
            s.use_flaresolverr = Some(use_flaresolverr);
            s.state = SessionState::AwaitingType;
            Ok(Step::Prompt(SessionState::AwaitingType))
        })
    }

    pub fn choose_type(&self, id: &str, user_id: &str, kind: MediaKind) -> Result<Step> {
        self.update(id, user_id, |s| {
            s.expect_state(SessionState::AwaitingType, "choose a media type")?;
            s.kind = Some(kind);
            s.state = SessionState::AwaitingDetails;
            Ok(Step::Prompt(SessionState::AwaitingDetails))
        })
    }

    /// Record the title details. `corrected` is a suggested spelling of the
    /// title; when it differs from what was typed the user must confirm it.
    pub fn submit_details(
        &self,
        id: &str,
        user_id: &str,
        details: Details,
        corrected: Option<&str>,
    ) -> Result<Step> {
        self.update(id, user_id, |s| {
            s.expect_state(SessionState::AwaitingDetails, "enter details")?;

            let name = details.name.trim();
            if name.is_empty() {
                return Err(SeekerError::MissingField("title"));
            }
            let kind = s.kind.unwrap_or(MediaKind::Movie);
            if kind == MediaKind::Show && details.season.is_none() {
                return Err(SeekerError::MissingField("season"));
            }

            s.original_name = Some(name.to_string());
            s.name = Some(name.to_string());
            if kind == MediaKind::Show {
                s.season = details.season;
                s.episode = details.episode;
            }

            s.corrected = corrected
                .map(str::trim)
                .filter(|c| !c.is_empty() && *c != name)
                .map(str::to_string);

            if s.corrected.is_some() {
                s.state = SessionState::AwaitingCorrection;
                return Ok(Step::Prompt(SessionState::AwaitingCorrection));
            }
            Ok(s.after_title())
        })
    }

    /// Accept or reject the suggested title
    pub fn confirm_correction(&self, id: &str, user_id: &str, accept: bool) -> Result<Step> {
        self.update(id, user_id, |s| {
            s.expect_state(SessionState::AwaitingCorrection, "confirm a correction")?;
            if accept {
                s.name = s.corrected.clone().or_else(|| s.original_name.clone());
            } else {
                s.name = s.original_name.clone();
            }
            Ok(s.after_title())
        })
    }

    /// Pick whole season or all seasons for a show without an episode
    pub fn choose_scope(&self, id: &str, user_id: &str, scope: Scope) -> Result<Step> {
        self.update(id, user_id, |s| {
            s.expect_state(SessionState::AwaitingScope, "choose a scope")?;
            match scope {
                Scope::Season | Scope::AllSeasons => Ok(s.begin_search(scope)),
                Scope::Episode => Err(SeekerError::MissingField("episode")),
                Scope::Movie => Err(SeekerError::InvalidTransition {
                    state: s.state.describe(),
                    action: "search a show as a movie",
                }),
            }
        })
    }

    /// Record how many seasons were detected for an all-seasons search
    pub fn record_season_count(&self, id: &str, user_id: &str, count: u32) -> Result<()> {
        self.update(id, user_id, |s| {
            s.expect_state(SessionState::Searching, "record a season count")?;
            s.season_count = Some(count);
            Ok(())
        })
    }

    /// End a search and discard the session
    pub fn finish(&self, id: &str, user_id: &str) -> Result<Session> {
        let mut session = self.update(id, user_id, |s| {
            s.expect_state(SessionState::Searching, "finish")?;
            Ok(s.clone())
        })?;
        self.remove(id);
        session.state = SessionState::Done;
        Ok(session)
    }

    /// Drop a session at any point
    pub fn abandon(&self, id: &str, user_id: &str) -> Result<()> {
        self.update(id, user_id, |_| Ok(()))?;
        self.remove(id);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, id: &str) {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
    }

    fn update<T>(
        &self,
        id: &str,
        user_id: &str,
        f: impl FnOnce(&mut Session) -> Result<T>,
    ) -> Result<T> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());

        let expired = match sessions.get(id) {
            None => return Err(SeekerError::SessionExpired),
            Some(s) => now.saturating_duration_since(s.touched_at) >= self.idle_ttl,
        };
        if expired {
            sessions.remove(id);
            return Err(SeekerError::SessionExpired);
        }

        let session = sessions.get_mut(id).ok_or(SeekerError::SessionExpired)?;
        if session.owner_id != user_id {
            return Err(SeekerError::OwnershipViolation);
        }

        let out = f(session)?;
        session.touched_at = now;
        Ok(out)
    }
}
