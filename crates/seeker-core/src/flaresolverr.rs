//! FlareSolverr bypass-proxy client
//!
//! FlareSolverr renders a page in its own browser, solves any challenge, and
//! hands back the final URL and HTML.

use crate::site::ensure_url;
use crate::{Result, SeekerError};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// `maxTimeout` sent with every request, in milliseconds
pub const DEFAULT_MAX_TIMEOUT_MS: u64 = 60_000;

/// Extra time allowed on top of `maxTimeout` for the proxy to answer
const REQUEST_MARGIN: Duration = Duration::from_secs(10);

/// HTTP timeout for one proxy call. Overrides the shared client timeout.
pub fn request_timeout(max_timeout_ms: u64) -> Duration {
    Duration::from_millis(max_timeout_ms) + REQUEST_MARGIN
}

/// Trim an endpoint and drop one trailing `/`. Blank means not configured.
pub fn sanitize_endpoint(endpoint: Option<&str>) -> Option<String> {
    let trimmed = endpoint?.trim();
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[derive(Debug, Serialize)]
struct SolveRequest<'a> {
    cmd: &'static str,
    url: &'a str,
    #[serde(rename = "maxTimeout")]
    max_timeout: u64,
}

#[derive(Debug, Deserialize)]
struct SolveResponse {
    status: Option<String>,
    message: Option<String>,
    solution: Option<Solution>,
}

#[derive(Debug, Deserialize)]
struct Solution {
    url: Option<String>,
    response: Option<String>,
}

/// A page solved by the proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolvedPage {
    /// Final URL after redirects, or the requested URL
    pub url: String,
    pub html: String,
}

/// Client for a FlareSolverr `/v1` endpoint
#[derive(Debug, Clone)]
pub struct FlareSolverr {
    client: Client,
    endpoint: Option<String>,
    max_timeout_ms: u64,
}

impl FlareSolverr {
    pub fn new(client: Client, endpoint: Option<&str>, max_timeout_ms: u64) -> Self {
        Self {
            client,
            endpoint: sanitize_endpoint(endpoint),
            max_timeout_ms,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Fetch `target` through the proxy
    pub async fn fetch_page(&self, target: &str) -> Result<SolvedPage> {
        let url = ensure_url(target)?;
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or(SeekerError::NotConfigured("FlareSolverr URL (FLARESOLVERR_URL)"))?;

        info!("Fetching through FlareSolverr: {}", url);
        let response = self
            .client
            .post(format!("{}/v1", endpoint))
            .timeout(request_timeout(self.max_timeout_ms))
            .json(&SolveRequest {
                cmd: "request.get",
                url: &url,
                max_timeout: self.max_timeout_ms,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SeekerError::Proxy(format!(
                "FlareSolverr responded with status {}",
                status.as_u16()
            )));
        }

        let body = response.text().await?;
        let payload: SolveResponse = serde_json::from_str(&body).map_err(|e| {
            SeekerError::Proxy(format!("FlareSolverr returned an unreadable payload: {}", e))
        })?;
        if payload.status.as_deref() != Some("ok") {
            return Err(SeekerError::Proxy(payload.message.unwrap_or_else(|| {
                "FlareSolverr did not return an ok status".to_string()
            })));
        }

        let (solved_url, html) = match payload.solution {
            Some(solution) => (solution.url, solution.response),
            None => (None, None),
        };
        let solved_url = solved_url.filter(|u| !u.is_empty()).unwrap_or(url);
        let html = html.unwrap_or_default();
        debug!("FlareSolverr solved {} ({} bytes)", solved_url, html.len());

        Ok(SolvedPage {
            url: solved_url,
            html,
        })
    }
}
