//! Chrome backend for the browser manager
//!
//! Finds a Chrome binary (configured path, well-known locations, then PATH)
//! and drives it over CDP with chromiumoxide.

use crate::browser::{BrowserLauncher, BrowserPage, BrowserProcess, PageElement, PageProbe};
use crate::{Result, SeekerError};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::Page;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Pause after navigation so late requests can settle
const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Launches Chrome through chromiumoxide
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher {
    /// Explicit binary; discovered when unset
    pub chrome_path: Option<PathBuf>,
}

impl ChromeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(chrome_path: Option<PathBuf>) -> Self {
        Self { chrome_path }
    }

    /// Resolve the Chrome binary to launch
    pub fn resolve_chrome(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.chrome_path {
            if path.exists() {
                return Ok(path.clone());
            }
            warn!("Configured Chrome path {:?} does not exist", path);
        }

        find_system_chrome().ok_or_else(|| {
            SeekerError::Browser(
                "No Chrome or Chromium found; set browser.chrome_path in the config".to_string(),
            )
        })
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self, headless: bool) -> Result<Box<dyn BrowserProcess>> {
        let chrome_path = self.resolve_chrome()?;
        let process = launch_browser(&chrome_path, headless).await?;
        Ok(Box::new(process))
    }
}

/// A running Chrome and its CDP event loop
pub struct ChromeProcess {
    browser: Browser,
    handle: tokio::task::JoinHandle<()>,
}

/// Launch a browser instance with the given Chrome path
async fn launch_browser(chrome_path: &Path, headless: bool) -> Result<ChromeProcess> {
    info!("Launching browser from {:?}", chrome_path);

    let mut builder = BrowserConfig::builder()
        .chrome_executable(chrome_path)
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-software-rasterizer");
    if !headless {
        builder = builder.with_head();
    }

    let (browser, mut handler) = Browser::launch(
        builder
            .build()
            .map_err(SeekerError::Browser)?,
    )
    .await
    .map_err(|e| SeekerError::Browser(format!("Failed to launch browser: {}", e)))?;

    let handle = tokio::spawn(async move {
        while handler.next().await.is_some() {}
    });

    Ok(ChromeProcess { browser, handle })
}

#[async_trait]
impl BrowserProcess for ChromeProcess {
    async fn new_page(&self) -> Result<Arc<dyn BrowserPage>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| SeekerError::Browser(e.to_string()))?;
        Ok(Arc::new(ChromePage { page }))
    }

    async fn pages(&self) -> Result<Vec<Arc<dyn BrowserPage>>> {
        let pages = self
            .browser
            .pages()
            .await
            .map_err(|e| SeekerError::Browser(e.to_string()))?;

        let mut loaded: Vec<Arc<dyn BrowserPage>> = Vec::new();
        for page in pages {
            // Blank tabs have no site form to drive
            match page.url().await {
                Ok(Some(url)) if url != "about:blank" => loaded.push(Arc::new(ChromePage { page })),
                _ => {}
            }
        }
        Ok(loaded)
    }

    async fn close(&mut self) -> Result<()> {
        let closed = self.browser.close().await;
        if let Err(e) = self.browser.wait().await {
            debug!("Waiting for browser exit failed: {}", e);
        }
        self.handle.abort();
        closed
            .map(|_| ())
            .map_err(|e| SeekerError::Browser(e.to_string()))
    }
}

/// A Chrome tab
pub struct ChromePage {
    page: Page,
}

impl ChromePage {
    async fn eval_bool(&self, expression: &str) -> Option<bool> {
        self.page
            .evaluate(expression)
            .await
            .ok()
            .and_then(|result| result.into_value::<bool>().ok())
    }
}

#[async_trait]
impl BrowserPage for ChromePage {
    async fn probe(&self) -> PageProbe {
        let Some(open) = self.eval_bool("document.readyState !== undefined").await else {
            return PageProbe::default();
        };

        PageProbe {
            open,
            element_lookup: self
                .eval_bool("typeof document.evaluate === 'function'")
                .await
                .unwrap_or(false),
            explicit_wait: self
                .eval_bool("typeof MutationObserver === 'function'")
                .await
                .unwrap_or(false),
        }
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        debug!("Navigating to {}", url);
        self.page
            .goto(url)
            .await
            .map_err(|e| SeekerError::Browser(format!("Navigation to {} failed: {}", url, e)))?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| SeekerError::Browser(e.to_string()))?;
        tokio::time::sleep(SETTLE_DELAY).await;
        Ok(())
    }

    async fn find_xpath(&self, xpath: &str) -> Option<Box<dyn PageElement>> {
        match self.page.find_xpath(xpath).await {
            Ok(element) => Some(Box::new(ChromeElement { element })),
            Err(e) => {
                debug!("XPath {} not found: {}", xpath, e);
                None
            }
        }
    }

    async fn wait_for_xpath(&self, xpath: &str, timeout: Duration) -> Result<()> {
        let start = Instant::now();
        let mut poll_interval = Duration::from_millis(100);
        let max_interval = Duration::from_secs(1);

        loop {
            if self.page.find_xpath(xpath).await.is_ok() {
                return Ok(());
            }

            if start.elapsed() >= timeout {
                return Err(SeekerError::Timeout(format!(
                    "results did not appear within {}s ({})",
                    timeout.as_secs(),
                    xpath
                )));
            }

            tokio::time::sleep(poll_interval).await;
            poll_interval = (poll_interval * 2).min(max_interval);
        }
    }

    async fn content(&self) -> Result<String> {
        self.page
            .content()
            .await
            .map_err(|e| SeekerError::Browser(e.to_string()))
    }

    async fn url(&self) -> Option<String> {
        self.page.url().await.ok().flatten()
    }

    async fn bring_to_front(&self) -> Result<()> {
        self.page
            .bring_to_front()
            .await
            .map(|_| ())
            .map_err(|e| SeekerError::Browser(e.to_string()))
    }

    async fn close(&self) -> Result<()> {
        self.page
            .clone()
            .close()
            .await
            .map_err(|e| SeekerError::Browser(e.to_string()))
    }
}

/// An element on a Chrome tab
pub struct ChromeElement {
    element: Element,
}

#[async_trait]
impl PageElement for ChromeElement {
    async fn find(&self, selector: &str) -> Option<Box<dyn PageElement>> {
        self.element
            .find_element(selector)
            .await
            .ok()
            .map(|element| Box::new(ChromeElement { element }) as Box<dyn PageElement>)
    }

    async fn click(&self) -> Result<()> {
        self.element
            .click()
            .await
            .map(|_| ())
            .map_err(|e| SeekerError::Browser(e.to_string()))
    }

    async fn replace_text(&self, text: &str) -> Result<()> {
        self.element
            .call_js_fn("function() { this.value = ''; }", false)
            .await
            .map_err(|e| SeekerError::Browser(e.to_string()))?;
        self.element
            .type_str(text)
            .await
            .map(|_| ())
            .map_err(|e| SeekerError::Browser(e.to_string()))
    }

    async fn press_enter(&self) -> Result<()> {
        self.element
            .press_key("Enter")
            .await
            .map(|_| ())
            .map_err(|e| SeekerError::Browser(e.to_string()))
    }
}

/// Find Chrome installed on the system
pub fn find_system_chrome() -> Option<PathBuf> {
    let candidates: Vec<&str> = if cfg!(target_os = "macos") {
        vec![
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else if cfg!(target_os = "linux") {
        vec![
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
        ]
    } else if cfg!(target_os = "windows") {
        vec![
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    } else {
        vec![]
    };

    for candidate in candidates {
        let path = PathBuf::from(candidate);
        if path.exists() {
            return Some(path);
        }
    }

    which::which("google-chrome")
        .or_else(|_| which::which("google-chrome-stable"))
        .or_else(|_| which::which("chromium"))
        .or_else(|_| which::which("chromium-browser"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_system_chrome() {
        // Only checks that discovery does not panic
        let _result = find_system_chrome();
    }

    #[test]
    fn test_missing_configured_path() {
        let launcher = ChromeLauncher::with_path(Some(PathBuf::from("/nonexistent/chrome")));
        match launcher.resolve_chrome() {
            Ok(path) => assert_ne!(path, PathBuf::from("/nonexistent/chrome")),
            Err(e) => assert!(matches!(e, SeekerError::Browser(_))),
        }
    }
}
