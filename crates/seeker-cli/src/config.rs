//! Configuration management

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use seeker_core::browser::BrowserOptions;
use seeker_core::flaresolverr::DEFAULT_MAX_TIMEOUT_MS;
use seeker_core::site::{DEFAULT_MOVIE_PATH, DEFAULT_SHOW_PATH};
use seeker_core::{ensure_url, FetchConfig, MediaKind, QbitConfig, SavePaths};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Site to search
    #[serde(default)]
    pub site: SiteConfig,

    /// Bypass proxy
    #[serde(default)]
    pub flaresolverr: FlareSolverrConfig,

    /// Download manager
    #[serde(default)]
    pub qbittorrent: QbittorrentConfig,

    /// Where downloads land, per media type
    #[serde(default)]
    pub save_paths: SavePathsConfig,

    /// Shared browser settings
    #[serde(default)]
    pub browser: BrowserConfig,

    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlareSolverrConfig {
    /// Endpoint without the `/v1` suffix
    pub endpoint: Option<String>,

    #[serde(default = "default_proxy_timeout")]
    pub max_timeout_ms: u64,
}

impl Default for FlareSolverrConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            max_timeout_ms: default_proxy_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QbittorrentConfig {
    pub host: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavePathsConfig {
    #[serde(default = "default_show_path")]
    pub show: String,

    #[serde(default = "default_movie_path")]
    pub movie: String,
}

impl Default for SavePathsConfig {
    fn default() -> Self {
        Self {
            show: default_show_path(),
            movie: default_movie_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Launch without a window unless a search asks for one
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Chrome binary; discovered when unset
    pub chrome_path: Option<PathBuf>,

    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,

    #[serde(default = "default_results_timeout")]
    pub results_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: default_true(),
            chrome_path: None,
            navigation_timeout_secs: default_navigation_timeout(),
            results_timeout_secs: default_results_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Overrides the default user agent
    pub user_agent: Option<String>,

    /// Users allowed to run commands. Empty allows everyone.
    #[serde(default)]
    pub admin_ids: Vec<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            user_agent: None,
            admin_ids: Vec::new(),
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_timeout() -> u64 {
    30
}
fn default_proxy_timeout() -> u64 {
    DEFAULT_MAX_TIMEOUT_MS
}
fn default_navigation_timeout() -> u64 {
    30
}
fn default_results_timeout() -> u64 {
    20
}
fn default_show_path() -> String {
    DEFAULT_SHOW_PATH.to_string()
}
fn default_movie_path() -> String {
    DEFAULT_MOVIE_PATH.to_string()
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(path) = Self::config_path() {
            self.save_to(&path)?;
        }
        Ok(())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "seeker", "seeker")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Apply `FLARESOLVERR_URL` and `QBITTORRENT_*` from the environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(endpoint) = get("FLARESOLVERR_URL") {
            self.flaresolverr.endpoint = Some(endpoint);
        }
        if let Some(host) = get("QBITTORRENT_HOST") {
            self.qbittorrent.host = Some(host);
        }
        if let Some(username) = get("QBITTORRENT_USERNAME") {
            self.qbittorrent.username = Some(username);
        }
        if let Some(password) = get("QBITTORRENT_PASSWORD") {
            self.qbittorrent.password = Some(password);
        }
    }

    /// Set a configuration value
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "website" | "site" | "site.url" => {
                self.site.url = Some(ensure_url(value)?);
            }
            "flaresolverr" | "flaresolverr.endpoint" => {
                self.flaresolverr.endpoint = non_empty(value);
            }
            "flaresolverr.max_timeout_ms" => {
                self.flaresolverr.max_timeout_ms = parse_number(key, value)?;
            }
            "qbittorrent.host" => self.qbittorrent.host = Some(ensure_url(value)?),
            "qbittorrent.username" => self.qbittorrent.username = non_empty(value),
            "qbittorrent.password" => self.qbittorrent.password = non_empty(value),
            "save_paths.show" | "show_path" => {
                self.set_save_path(MediaKind::Show, value)?;
            }
            "save_paths.movie" | "movie_path" => {
                self.set_save_path(MediaKind::Movie, value)?;
            }
            "browser.headless" | "headless" => {
                self.browser.headless = value
                    .parse()
                    .with_context(|| format!("{} expects true or false", key))?;
            }
            "browser.chrome_path" | "chrome_path" => {
                self.browser.chrome_path = non_empty(value).map(PathBuf::from);
            }
            "browser.navigation_timeout_secs" => {
                self.browser.navigation_timeout_secs = parse_number(key, value)?;
            }
            "browser.results_timeout_secs" => {
                self.browser.results_timeout_secs = parse_number(key, value)?;
            }
            "timeout" | "general.timeout_secs" => {
                self.general.timeout_secs = parse_number(key, value)?;
            }
            "user_agent" | "general.user_agent" => {
                self.general.user_agent = non_empty(value);
            }
            "admin_ids" | "general.admin_ids" => {
                self.general.admin_ids = value
                    .split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            _ => bail!("Unknown config key: {}", key),
        }
        Ok(())
    }

    pub fn set_save_path(&mut self, kind: MediaKind, path: &str) -> Result<()> {
        let path = path.trim();
        if path.is_empty() {
            bail!("A save path is required");
        }
        match kind {
            MediaKind::Show => self.save_paths.show = path.to_string(),
            MediaKind::Movie => self.save_paths.movie = path.to_string(),
        }
        Ok(())
    }

    /// Whether `user` may run commands
    pub fn is_admin(&self, user: &str) -> bool {
        self.general.admin_ids.is_empty() || self.general.admin_ids.iter().any(|id| id == user)
    }

    pub fn fetch_config(&self) -> FetchConfig {
        let defaults = FetchConfig::default();
        FetchConfig {
            user_agent: self
                .general
                .user_agent
                .clone()
                .unwrap_or(defaults.user_agent),
            timeout_secs: self.general.timeout_secs,
            flaresolverr_url: self.flaresolverr.endpoint.clone(),
            flaresolverr_timeout_ms: self.flaresolverr.max_timeout_ms,
        }
    }

    pub fn browser_options(&self) -> BrowserOptions {
        BrowserOptions {
            headless: self.browser.headless,
            navigation_timeout: Duration::from_secs(self.browser.navigation_timeout_secs),
            results_timeout: Duration::from_secs(self.browser.results_timeout_secs),
        }
    }

    /// qBittorrent settings, when all three values are present
    pub fn qbit_config(&self) -> Option<QbitConfig> {
        let qb = &self.qbittorrent;
        match (&qb.host, &qb.username, &qb.password) {
            (Some(host), Some(username), Some(password)) => {
                QbitConfig::new(host, username, password).ok()
            }
            _ => None,
        }
    }

    pub fn save_paths(&self) -> SavePaths {
        SavePaths::with_paths(&self.save_paths.show, &self.save_paths.movie)
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .with_context(|| format!("{} expects a whole number, got {:?}", key, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.site.url, None);
        assert_eq!(config.flaresolverr.max_timeout_ms, 60_000);
        assert_eq!(config.save_paths.show, "media-stack/shows");
        assert_eq!(config.save_paths.movie, "media-stack/movies");
        assert!(config.browser.headless);
        assert_eq!(config.browser.navigation_timeout_secs, 30);
        assert_eq!(config.browser.results_timeout_secs, 20);
        assert_eq!(config.general.timeout_secs, 30);
        assert!(config.qbit_config().is_none());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [site]
            url = "https://www.site.fun/"

            [browser]
            headless = false
            "#,
        )
        .unwrap();

        assert_eq!(config.site.url.as_deref(), Some("https://www.site.fun/"));
        assert!(!config.browser.headless);
        assert_eq!(config.browser.results_timeout_secs, 20);
        assert_eq!(config.save_paths, SavePathsConfig::default());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = std::env::temp_dir().join(format!("seeker-config-{}", std::process::id()));
        let path = dir.join("config.toml");

        let mut config = Config::default();
        config.set("website", "www.site.fun").unwrap();
        config.set("admin_ids", "alice, bob").unwrap();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_set_values() {
        let mut config = Config::default();
        config.set("site.url", "www.site.fun").unwrap();
        config.set("flaresolverr", "http://proxy:8191/").unwrap();
        config.set("headless", "false").unwrap();
        config.set("timeout", "45").unwrap();
        config.set("movie_path", "/data/movies").unwrap();

        assert_eq!(config.site.url.as_deref(), Some("https://www.site.fun/"));
        assert_eq!(
            config.flaresolverr.endpoint.as_deref(),
            Some("http://proxy:8191/")
        );
        assert!(!config.browser.headless);
        assert_eq!(config.general.timeout_secs, 45);
        assert_eq!(config.save_paths().get(MediaKind::Movie), "/data/movies");
    }

    #[test]
    fn test_set_rejects_bad_values() {
        let mut config = Config::default();
        assert!(config.set("timeout", "soon").is_err());
        assert!(config.set("headless", "maybe").is_err());
        assert!(config.set("show_path", "  ").is_err());
        assert!(config.set("colour", "blue").is_err());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("FLARESOLVERR_URL", "http://proxy:8191"),
            ("QBITTORRENT_HOST", "http://qbit:8080"),
            ("QBITTORRENT_USERNAME", "admin"),
            ("QBITTORRENT_PASSWORD", "secret"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(
            config.fetch_config().flaresolverr_url.as_deref(),
            Some("http://proxy:8191")
        );
        let qbit = config.qbit_config().unwrap();
        assert_eq!(qbit.host, "http://qbit:8080/");
        assert_eq!(qbit.username, "admin");
    }

    #[test]
    fn test_admin_check() {
        let mut config = Config::default();
        assert!(config.is_admin("anyone"));

        config.general.admin_ids = vec!["alice".to_string()];
        assert!(config.is_admin("alice"));
        assert!(!config.is_admin("bob"));
    }
}
