//! Page retrieval: direct HTTP, FlareSolverr, or the shared browser

use crate::browser::{BrowserManager, BrowserPage};
use crate::flaresolverr::FlareSolverr;
use crate::progress::ProgressSink;
use crate::query::build_search_url;
use crate::site::ensure_url;
use crate::{FetchConfig, Result, SeekerError};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Search form on the site's landing page, most specific first
pub const FORM_XPATHS: &[&str] = &[
    "/html/body/div[2]/div/div[2]/form",
    "//form[.//input[@type='text' or @type='search']]",
    "//form",
];

/// Text input inside the search form
pub const INPUT_SELECTORS: &[&str] = &["input[type=\"text\"]", "input[name]", "input"];

/// Submit control inside the search form
pub const SUBMIT_SELECTORS: &[&str] = &["button[type=\"submit\"]", "input[type=\"submit\"]"];

/// Results table body once a search has rendered
pub const RESULTS_XPATH: &str = "/html/body/div[1]/div[6]/div[1]/table[2]/tbody";

/// How a page gets retrieved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchStrategy {
    /// Plain HTTP GET
    #[default]
    Direct,
    /// Through the FlareSolverr proxy
    Proxy,
    /// Through the on-page search form of the shared browser
    Browser { headless: bool },
}

impl FetchStrategy {
    pub fn uses_proxy(&self) -> bool {
        matches!(self, FetchStrategy::Proxy)
    }
}

impl std::str::FromStr for FetchStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "direct" | "http" => Ok(FetchStrategy::Direct),
            "proxy" | "flaresolverr" => Ok(FetchStrategy::Proxy),
            "browser" | "headless" => Ok(FetchStrategy::Browser { headless: true }),
            "headed" => Ok(FetchStrategy::Browser { headless: false }),
            _ => Err(format!(
                "Unknown fetch mode: {}. Use 'direct', 'proxy', 'browser' or 'headed'",
                s
            )),
        }
    }
}

impl std::fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchStrategy::Direct => write!(f, "direct"),
            FetchStrategy::Proxy => write!(f, "FlareSolverr"),
            FetchStrategy::Browser { headless: true } => write!(f, "browser (headless)"),
            FetchStrategy::Browser { headless: false } => write!(f, "browser (headed)"),
        }
    }
}

/// A search to run against the configured site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub base_url: String,
    pub term: String,
    /// `{origin}/search/all/{slug}/`
    pub search_url: String,
}

impl SearchRequest {
    pub fn new(base_url: &str, term: &str) -> Result<Self> {
        Ok(Self {
            base_url: ensure_url(base_url)?,
            term: term.to_string(),
            search_url: build_search_url(base_url, term)?,
        })
    }
}

/// Retrieved HTML and the URL it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub url: String,
    pub html: String,
}

/// How the search was submitted in the browser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMethod {
    Button,
    Enter,
}

/// Fetcher for search and detail pages
pub struct Fetcher {
    client: Client,
    proxy: FlareSolverr,
    browser: Option<Arc<BrowserManager>>,
}

impl Fetcher {
    /// Create a new fetcher with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(FetchConfig::default())
    }

    /// Create a new fetcher with custom configuration
    pub fn with_config(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .cookie_store(true)
            .build()?;

        let proxy = FlareSolverr::new(
            client.clone(),
            config.flaresolverr_url.as_deref(),
            config.flaresolverr_timeout_ms,
        );

        Ok(Self {
            client,
            proxy,
            browser: None,
        })
    }

    /// Enable the browser strategy
    pub fn with_browser(mut self, browser: Arc<BrowserManager>) -> Self {
        self.browser = Some(browser);
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn proxy(&self) -> &FlareSolverr {
        &self.proxy
    }

    pub fn browser(&self) -> Option<&Arc<BrowserManager>> {
        self.browser.as_ref()
    }

    /// Retrieve the results page for `request` using `strategy`
    pub async fn retrieve(
        &self,
        request: &SearchRequest,
        strategy: &FetchStrategy,
        progress: &dyn ProgressSink,
    ) -> Result<FetchedPage> {
        match strategy {
            FetchStrategy::Direct => {
                progress.step(&format!("Fetching {}", request.search_url));
                self.fetch_direct(&request.search_url).await
            }
            FetchStrategy::Proxy => {
                progress.step(&format!(
                    "Fetching {} through FlareSolverr",
                    request.search_url
                ));
                self.fetch_proxied(&request.search_url).await
            }
            FetchStrategy::Browser { headless } => {
                self.search_in_browser(request, *headless, progress).await
            }
        }
    }

    /// Fetch a single page, such as a result's detail page
    pub async fn fetch_url(&self, url: &str, use_proxy: bool) -> Result<FetchedPage> {
        if use_proxy {
            self.fetch_proxied(url).await
        } else {
            self.fetch_direct(url).await
        }
    }

    /// Fetch using HTTP only
    pub async fn fetch_direct(&self, url: &str) -> Result<FetchedPage> {
        let url = ensure_url(url)?;
        info!("Fetching: {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SeekerError::Fetch {
                status: status.as_u16(),
                url,
            });
        }

        let final_url = response.url().to_string();
        let html = response.text().await?;
        debug!("Fetched {} bytes from {}", html.len(), final_url);
        Ok(FetchedPage {
            url: final_url,
            html,
        })
    }

    async fn fetch_proxied(&self, url: &str) -> Result<FetchedPage> {
        let solved = self.proxy.fetch_page(url).await?;
        Ok(FetchedPage {
            url: solved.url,
            html: solved.html,
        })
    }

    async fn search_in_browser(
        &self,
        request: &SearchRequest,
        headless: bool,
        progress: &dyn ProgressSink,
    ) -> Result<FetchedPage> {
        let manager = self
            .browser
            .as_ref()
            .ok_or(SeekerError::NotConfigured("browser"))?;

        manager.ensure(headless).await?;

        progress.step("Checking the browser page");
        let page = match manager.ensure_active_page(true).await? {
            Some(active) => {
                if active.revived {
                    progress.step("Recovered the browser page");
                }
                active.page
            }
            None => {
                progress.step(&format!("Opening {}", request.base_url));
                manager.open(&request.base_url, headless).await?
            }
        };

        if let Err(e) = page.bring_to_front().await {
            debug!("Could not bring page to front: {}", e);
        }

        progress.step(&format!("Searching the site for \"{}\"", request.term));
        let method = submit_search_form(page.as_ref(), &request.term).await?;
        debug!("Search submitted via {:?}", method);

        progress.step("Waiting for results");
        let timeout = manager.options().results_timeout;
        page.wait_for_xpath(RESULTS_XPATH, timeout).await?;

        let html = page.content().await?;
        let url = page
            .url()
            .await
            .unwrap_or_else(|| request.search_url.clone());
        Ok(FetchedPage { url, html })
    }
}

/// Type `term` into the page's search form and submit it
pub async fn submit_search_form(page: &dyn BrowserPage, term: &str) -> Result<SubmitMethod> {
    let mut form = None;
    for xpath in FORM_XPATHS {
        if let Some(found) = page.find_xpath(xpath).await {
            debug!("Search form matched {}", xpath);
            form = Some(found);
            break;
        }
    }
    let form = form.ok_or_else(|| {
        SeekerError::ElementNotFound("search form; open the site again and retry".to_string())
    })?;

    let mut input = None;
    for selector in INPUT_SELECTORS {
        if let Some(found) = form.find(selector).await {
            input = Some(found);
            break;
        }
    }
    let input = input
        .ok_or_else(|| SeekerError::ElementNotFound("search input inside the form".to_string()))?;

    if let Err(e) = input.click().await {
        warn!("Could not focus search input: {}", e);
    }
    input.replace_text(term).await?;

    for selector in SUBMIT_SELECTORS {
        if let Some(button) = form.find(selector).await {
            button.click().await?;
            return Ok(SubmitMethod::Button);
        }
    }

    input.press_enter().await?;
    Ok(SubmitMethod::Enter)
}
