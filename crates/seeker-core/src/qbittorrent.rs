//! qBittorrent Web API client
//!
//! Logs in with form credentials, keeps the session cookie, and retries a
//! request exactly once after re-authenticating when the cookie is rejected.

use crate::site::ensure_url;
use crate::{Result, SeekerError};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// Connection settings for a qBittorrent instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QbitConfig {
    pub host: String,
    pub username: String,
    pub password: String,
}

impl QbitConfig {
    /// Validate and normalize connection settings
    pub fn new(host: &str, username: &str, password: &str) -> Result<Self> {
        if host.trim().is_empty() {
            return Err(SeekerError::MissingField("host"));
        }
        if username.trim().is_empty() {
            return Err(SeekerError::MissingField("username"));
        }
        if password.trim().is_empty() {
            return Err(SeekerError::MissingField("password"));
        }

        Ok(Self {
            host: ensure_url(host)?,
            username: username.trim().to_string(),
            password: password.trim().to_string(),
        })
    }
}

/// A torrent submission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddTorrent {
    /// Magnet or `.torrent` URL
    pub urls: String,
    pub save_path: Option<String>,
    pub tags: Option<String>,
}

/// Subset of `/api/v2/torrents/info` fields used for progress
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TorrentInfo {
    pub hash: String,
    pub name: String,
    /// 0.0 to 1.0
    pub progress: f64,
    /// Bytes per second
    pub dlspeed: u64,
    pub downloaded: u64,
    pub size: u64,
    /// Seconds; qBittorrent reports 8640000 when unknown
    pub eta: i64,
    pub state: String,
    pub tags: String,
}

/// Unique tag used to find a submitted torrent again
pub fn download_tag() -> String {
    format!("seeker-{}", Uuid::new_v4().simple())
}

/// Client for the qBittorrent Web API
#[derive(Debug)]
pub struct QbitClient {
    client: Client,
    config: Mutex<Option<QbitConfig>>,
    cookie: Mutex<Option<String>>,
}

impl QbitClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            config: Mutex::new(None),
            cookie: Mutex::new(None),
        }
    }

    pub fn with_config(client: Client, config: QbitConfig) -> Self {
        let qbit = Self::new(client);
        qbit.configure(config);
        qbit
    }

    /// Replace the connection settings and drop any session
    pub fn configure(&self, config: QbitConfig) {
        *self.config.lock().unwrap_or_else(|e| e.into_inner()) = Some(config);
        self.clear_cookie();
    }

    pub fn config(&self) -> Option<QbitConfig> {
        self.config.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_configured(&self) -> bool {
        self.config().is_some()
    }

    fn require_config(&self) -> Result<QbitConfig> {
        self.config().ok_or(SeekerError::NotConfigured("qBittorrent"))
    }

    fn cookie(&self) -> Option<String> {
        self.cookie.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_cookie(&self, cookie: Option<String>) {
        *self.cookie.lock().unwrap_or_else(|e| e.into_inner()) = cookie;
    }

    fn clear_cookie(&self) {
        self.set_cookie(None);
    }

    fn api_url(config: &QbitConfig, path: &str) -> Result<String> {
        Ok(Url::parse(&config.host)?.join(path)?.to_string())
    }

    /// Authenticate and cache the session cookie
    pub async fn login(&self) -> Result<String> {
        let config = self.require_config()?;
        let url = Self::api_url(&config, "/api/v2/auth/login")?;
        debug!("Logging in to qBittorrent at {}", url);

        let response = self
            .client
            .post(&url)
            .form(&[
                ("username", config.username.as_str()),
                ("password", config.password.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SeekerError::AuthFailed(format!(
                "login failed with status {}",
                response.status().as_u16()
            )));
        }

        let cookie = response
            .headers()
            .get(reqwest::header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                SeekerError::AuthFailed("qBittorrent did not return a session cookie".to_string())
            })?;

        info!("Logged in to qBittorrent");
        self.set_cookie(Some(cookie.clone()));
        Ok(cookie)
    }

    async fn ensure_session(&self) -> Result<String> {
        match self.cookie() {
            Some(cookie) => Ok(cookie),
            None => self.login().await,
        }
    }

    /// Send an authenticated request, re-authenticating once on 401/403
    async fn send_authed<F>(&self, path: &str, build: F) -> Result<Response>
    where
        F: Fn(&Client, &str) -> RequestBuilder,
    {
        let config = self.require_config()?;
        let url = Self::api_url(&config, path)?;

        let cookie = self.ensure_session().await?;
        let response = build(&self.client, &url)
            .header(reqwest::header::COOKIE, cookie)
            .send()
            .await?;

        let response = if is_auth_rejection(response.status()) {
            warn!("qBittorrent rejected the session, logging in again");
            self.clear_cookie();
            let cookie = self.login().await?;
            let retried = build(&self.client, &url)
                .header(reqwest::header::COOKIE, cookie)
                .send()
                .await?;
            if is_auth_rejection(retried.status()) {
                self.clear_cookie();
                return Err(SeekerError::AuthFailed(format!(
                    "{} still rejected after re-authenticating (status {})",
                    path,
                    retried.status().as_u16()
                )));
            }
            retried
        } else {
            response
        };

        if !response.status().is_success() {
            return Err(SeekerError::Fetch {
                status: response.status().as_u16(),
                url,
            });
        }
        Ok(response)
    }

    /// Submit a torrent or magnet link
    pub async fn add_torrent(&self, torrent: &AddTorrent) -> Result<()> {
        if torrent.urls.trim().is_empty() {
            return Err(SeekerError::MissingField("url"));
        }

        let mut form = vec![("urls", torrent.urls.trim().to_string())];
        if let Some(ref save_path) = torrent.save_path {
            form.push(("savepath", save_path.clone()));
        }
        if let Some(ref tags) = torrent.tags {
            form.push(("tags", tags.clone()));
        }

        self.send_authed("/api/v2/torrents/add", |client, url| {
            client.post(url).form(&form)
        })
        .await?;

        info!("Submitted torrent to qBittorrent");
        Ok(())
    }

    /// Torrents carrying `tag`
    pub async fn torrents_by_tag(&self, tag: &str) -> Result<Vec<TorrentInfo>> {
        let response = self
            .send_authed("/api/v2/torrents/info", |client, url| {
                client.get(url).query(&[("tag", tag)])
            })
            .await?;
        Ok(response.json().await?)
    }

    /// First torrent carrying `tag`, if any
    pub async fn torrent_by_tag(&self, tag: &str) -> Result<Option<TorrentInfo>> {
        Ok(self.torrents_by_tag(tag).await?.into_iter().next())
    }
}

fn is_auth_rejection(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client_for(server: &mockito::Server) -> QbitClient {
        QbitClient::with_config(
            Client::new(),
            QbitConfig::new(&server.url(), "admin", "secret").unwrap(),
        )
    }

    #[test]
    fn test_config_validation() {
        assert!(matches!(
            QbitConfig::new("", "u", "p"),
            Err(SeekerError::MissingField("host"))
        ));
        assert!(matches!(
            QbitConfig::new("qbit.local:8080", "u", " "),
            Err(SeekerError::MissingField("password"))
        ));

        let config = QbitConfig::new("qbit.local:8080", " admin ", "pw").unwrap();
        assert_eq!(config.host, "https://qbit.local:8080/");
        assert_eq!(config.username, "admin");
    }

    #[test]
    fn test_download_tag_unique() {
        let a = download_tag();
        assert!(a.starts_with("seeker-"));
        assert_ne!(a, download_tag());
    }

    #[tokio::test]
    async fn test_not_configured() {
        let qbit = QbitClient::new(Client::new());
        assert!(matches!(
            qbit.login().await,
            Err(SeekerError::NotConfigured(_))
        ));
        let add = AddTorrent {
            urls: "magnet:?xt=1".to_string(),
            ..AddTorrent::default()
        };
        assert!(matches!(
            qbit.add_torrent(&add).await,
            Err(SeekerError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_login_caches_cookie() {
        let mut server = mockito::Server::new_async().await;
        let login = server
            .mock("POST", "/api/v2/auth/login")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("username".into(), "admin".into()),
                Matcher::UrlEncoded("password".into(), "secret".into()),
            ]))
            .with_status(200)
            .with_header("set-cookie", "SID=abc123; HttpOnly; path=/")
            .with_body("Ok.")
            .expect(1)
            .create_async()
            .await;
        let add = server
            .mock("POST", "/api/v2/torrents/add")
            .match_header("cookie", "SID=abc123")
            .with_status(200)
            .with_body("Ok.")
            .expect(2)
            .create_async()
            .await;

        let qbit = client_for(&server);
        let torrent = AddTorrent {
            urls: "magnet:?xt=urn:btih:abc".to_string(),
            save_path: Some("media-stack/movies".to_string()),
            tags: Some("seeker-1".to_string()),
        };
        qbit.add_torrent(&torrent).await.unwrap();
        qbit.add_torrent(&torrent).await.unwrap();

        login.assert_async().await;
        add.assert_async().await;
    }

    #[tokio::test]
    async fn test_add_sends_fields() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v2/auth/login")
            .with_status(200)
            .with_header("set-cookie", "SID=x")
            .create_async()
            .await;
        let add = server
            .mock("POST", "/api/v2/torrents/add")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("urls".into(), "magnet:?xt=urn:btih:abc".into()),
                Matcher::UrlEncoded("savepath".into(), "media-stack/shows".into()),
                Matcher::UrlEncoded("tags".into(), "seeker-2".into()),
            ]))
            .with_status(200)
            .create_async()
            .await;

        let qbit = client_for(&server);
        qbit.add_torrent(&AddTorrent {
            urls: "magnet:?xt=urn:btih:abc".to_string(),
            save_path: Some("media-stack/shows".to_string()),
            tags: Some("seeker-2".to_string()),
        })
        .await
        .unwrap();
        add.assert_async().await;
    }

    #[tokio::test]
    async fn test_reauth_once_on_forbidden() {
        let mut server = mockito::Server::new_async().await;
        let stale = server
            .mock("POST", "/api/v2/torrents/add")
            .match_header("cookie", "SID=stale")
            .with_status(403)
            .expect(1)
            .create_async()
            .await;
        let login = server
            .mock("POST", "/api/v2/auth/login")
            .with_status(200)
            .with_header("set-cookie", "SID=fresh; path=/")
            .expect(1)
            .create_async()
            .await;
        let fresh = server
            .mock("POST", "/api/v2/torrents/add")
            .match_header("cookie", "SID=fresh")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let qbit = client_for(&server);
        qbit.set_cookie(Some("SID=stale".to_string()));
        qbit.add_torrent(&AddTorrent {
            urls: "magnet:?xt=urn:btih:abc".to_string(),
            ..AddTorrent::default()
        })
        .await
        .unwrap();

        stale.assert_async().await;
        login.assert_async().await;
        fresh.assert_async().await;
    }

    #[tokio::test]
    async fn test_second_rejection_fails() {
        let mut server = mockito::Server::new_async().await;
        let login = server
            .mock("POST", "/api/v2/auth/login")
            .with_status(200)
            .with_header("set-cookie", "SID=abc")
            .expect(2)
            .create_async()
            .await;
        let add = server
            .mock("POST", "/api/v2/torrents/add")
            .with_status(401)
            .expect(2)
            .create_async()
            .await;

        let qbit = client_for(&server);
        let result = qbit
            .add_torrent(&AddTorrent {
                urls: "magnet:?xt=urn:btih:abc".to_string(),
                ..AddTorrent::default()
            })
            .await;

        assert!(matches!(result, Err(SeekerError::AuthFailed(_))));
        login.assert_async().await;
        add.assert_async().await;
    }

    #[tokio::test]
    async fn test_login_without_cookie_fails() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v2/auth/login")
            .with_status(200)
            .with_body("Fails.")
            .create_async()
            .await;

        let qbit = client_for(&server);
        assert!(matches!(qbit.login().await, Err(SeekerError::AuthFailed(_))));
    }

    #[tokio::test]
    async fn test_torrents_by_tag() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v2/auth/login")
            .with_status(200)
            .with_header("set-cookie", "SID=abc")
            .create_async()
            .await;
        server
            .mock("GET", "/api/v2/torrents/info")
            .match_query(Matcher::UrlEncoded("tag".into(), "seeker-3".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{"hash":"h","name":"Movie","progress":0.5,"dlspeed":1048576,"downloaded":524288000,"size":1048576000,"eta":500,"state":"downloading","tags":"seeker-3","ratio":0.1}]"#,
            )
            .create_async()
            .await;

        let qbit = client_for(&server);
        let info = qbit.torrent_by_tag("seeker-3").await.unwrap().unwrap();
        assert_eq!(info.name, "Movie");
        assert_eq!(info.dlspeed, 1_048_576);
        assert_eq!(info.state, "downloading");
    }

    #[tokio::test]
    async fn test_add_requires_url() {
        let qbit = QbitClient::new(Client::new());
        assert!(matches!(
            qbit.add_torrent(&AddTorrent::default()).await,
            Err(SeekerError::MissingField("url"))
        ));
    }
}
