//! Shared browser lifecycle
//!
//! One browser process and one authoritative page are shared by every
//! browser-driven search. [`BrowserManager`] launches, reuses, recovers and
//! tears them down. The backend sits behind the [`BrowserLauncher`],
//! [`BrowserProcess`] and [`BrowserPage`] traits; `chrome` provides the
//! chromiumoxide implementation.

use crate::site::ensure_url;
use crate::{Result, SeekerError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Timeouts and defaults for browser-driven work
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    /// Launch without a visible window
    pub headless: bool,
    /// Upper bound for a page navigation
    pub navigation_timeout: Duration,
    /// Upper bound for the results container to appear
    pub results_timeout: Duration,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            navigation_timeout: Duration::from_secs(30),
            results_timeout: Duration::from_secs(20),
        }
    }
}

/// What a page reports about itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageProbe {
    pub open: bool,
    /// Elements can be looked up by XPath
    pub element_lookup: bool,
    /// The page can wait for an XPath to appear
    pub explicit_wait: bool,
}

impl PageProbe {
    pub fn usable(&self) -> bool {
        self.open && self.element_lookup && self.explicit_wait
    }
}

/// A located element on a live page
#[async_trait]
pub trait PageElement: Send + Sync {
    /// First descendant matching a CSS selector
    async fn find(&self, selector: &str) -> Option<Box<dyn PageElement>>;
    async fn click(&self) -> Result<()>;
    /// Replace the element's value with `text`, typing it key by key
    async fn replace_text(&self, text: &str) -> Result<()>;
    async fn press_enter(&self) -> Result<()>;
}

/// A tab in the browser process
#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn probe(&self) -> PageProbe;
    /// Navigate and wait for the page to settle
    async fn navigate(&self, url: &str) -> Result<()>;
    async fn find_xpath(&self, xpath: &str) -> Option<Box<dyn PageElement>>;
    /// Wait until `xpath` resolves to an element
    async fn wait_for_xpath(&self, xpath: &str, timeout: Duration) -> Result<()>;
    /// Rendered HTML
    async fn content(&self) -> Result<String>;
    async fn url(&self) -> Option<String>;
    async fn bring_to_front(&self) -> Result<()>;
    async fn close(&self) -> Result<()>;
}

/// A running browser process
#[async_trait]
pub trait BrowserProcess: Send + Sync {
    async fn new_page(&self) -> Result<Arc<dyn BrowserPage>>;
    /// Every page currently attached to the process
    async fn pages(&self) -> Result<Vec<Arc<dyn BrowserPage>>>;
    async fn close(&mut self) -> Result<()>;
}

/// Starts browser processes
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, headless: bool) -> Result<Box<dyn BrowserProcess>>;
}

/// The page to drive, and whether recovery was needed to get it
#[derive(Clone)]
pub struct ActivePage {
    pub page: Arc<dyn BrowserPage>,
    pub revived: bool,
}

impl std::fmt::Debug for ActivePage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivePage")
            .field("revived", &self.revived)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct BrowserState {
    process: Option<Box<dyn BrowserProcess>>,
    headless: Option<bool>,
    page: Option<Arc<dyn BrowserPage>>,
    last_url: Option<String>,
}

/// Owns the single shared browser and page
pub struct BrowserManager {
    launcher: Arc<dyn BrowserLauncher>,
    options: BrowserOptions,
    state: Mutex<BrowserState>,
}

impl BrowserManager {
    pub fn new(launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self::with_options(launcher, BrowserOptions::default())
    }

    pub fn with_options(launcher: Arc<dyn BrowserLauncher>, options: BrowserOptions) -> Self {
        Self {
            launcher,
            options,
            state: Mutex::new(BrowserState::default()),
        }
    }

    pub fn options(&self) -> &BrowserOptions {
        &self.options
    }

    /// Make sure a browser with the requested mode is running
    pub async fn ensure(&self, headless: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        self.ensure_locked(&mut state, headless).await
    }

    /// Open `url` in a fresh page, replacing the current one
    pub async fn open(&self, url: &str, headless: bool) -> Result<Arc<dyn BrowserPage>> {
        let url = ensure_url(url)?;
        let mut state = self.state.lock().await;
        self.open_locked(&mut state, &url, headless).await
    }

    /// The current page, if it is still open
    pub async fn active_page(&self) -> Option<Arc<dyn BrowserPage>> {
        let page = self.state.lock().await.page.clone()?;
        if page.probe().await.open {
            Some(page)
        } else {
            None
        }
    }

    /// Find a usable page, recovering one if needed.
    ///
    /// Tries the current page, then any other usable page in the running
    /// process, then reopens the last URL. With `allow_restart`, a failed
    /// reopen relaunches the browser and tries once more.
    pub async fn ensure_active_page(&self, allow_restart: bool) -> Result<Option<ActivePage>> {
        let mut state = self.state.lock().await;

        if let Some(page) = state.page.clone() {
            if is_usable(page.as_ref()).await {
                return Ok(Some(ActivePage {
                    page,
                    revived: false,
                }));
            }
            debug!("Current page is not usable, looking for another");
        }

        if let Some(process) = state.process.as_ref() {
            match process.pages().await {
                Ok(pages) => {
                    for page in pages {
                        if is_usable(page.as_ref()).await {
                            info!("Adopted an open page from the running browser");
                            state.page = Some(Arc::clone(&page));
                            return Ok(Some(ActivePage {
                                page,
                                revived: true,
                            }));
                        }
                    }
                }
                Err(e) => warn!("Could not list browser pages: {}", e),
            }
        }

        let Some(url) = state.last_url.clone() else {
            debug!("No page to recover and no URL to reopen");
            return Ok(None);
        };
        let headless = state.headless.unwrap_or(self.options.headless);

        match self.open_locked(&mut state, &url, headless).await {
            Ok(page) => {
                info!("Reopened {}", url);
                Ok(Some(ActivePage {
                    page,
                    revived: true,
                }))
            }
            Err(e) if allow_restart => {
                warn!("Reopening {} failed ({}), relaunching the browser", url, e);
                self.teardown_locked(&mut state).await;
                self.ensure_locked(&mut state, headless).await?;
                let page = self.open_locked(&mut state, &url, headless).await?;
                Ok(Some(ActivePage {
                    page,
                    revived: true,
                }))
            }
            Err(e) => {
                warn!("Reopening {} failed: {}", url, e);
                Ok(None)
            }
        }
    }

    /// Probe a page for the capabilities searches rely on
    pub async fn is_usable(&self, page: &dyn BrowserPage) -> bool {
        is_usable(page).await
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.process.is_some()
    }

    pub async fn last_url(&self) -> Option<String> {
        self.state.lock().await.last_url.clone()
    }

    /// Close the page and the browser process
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        self.teardown_locked(&mut state).await;
    }

    async fn ensure_locked(&self, state: &mut BrowserState, headless: bool) -> Result<()> {
        if state.process.is_some() && state.headless == Some(headless) {
            debug!("Reusing running browser (headless: {})", headless);
            return Ok(());
        }

        if state.process.is_some() {
            info!("Switching browser to headless: {}", headless);
        }
        self.teardown_locked(state).await;

        info!("Launching browser (headless: {})", headless);
        let process = self.launcher.launch(headless).await?;
        state.process = Some(process);
        state.headless = Some(headless);
        Ok(())
    }

    async fn open_locked(
        &self,
        state: &mut BrowserState,
        url: &str,
        headless: bool,
    ) -> Result<Arc<dyn BrowserPage>> {
        self.ensure_locked(state, headless).await?;

        if let Some(previous) = state.page.take() {
            if previous.probe().await.open {
                if let Err(e) = previous.close().await {
                    debug!("Failed to close previous page: {}", e);
                }
            }
        }

        let process = state
            .process
            .as_ref()
            .ok_or_else(|| SeekerError::Browser("browser is not running".to_string()))?;

        let navigated = match process.new_page().await {
            Ok(page) => {
                let timeout = self.options.navigation_timeout;
                match tokio::time::timeout(timeout, page.navigate(url)).await {
                    Ok(Ok(())) => Ok(page),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(SeekerError::Timeout(format!(
                        "navigation to {} exceeded {}s",
                        url,
                        timeout.as_secs()
                    ))),
                }
            }
            Err(e) => Err(e),
        };

        match navigated {
            Ok(page) => {
                state.page = Some(Arc::clone(&page));
                state.last_url = Some(url.to_string());
                Ok(page)
            }
            Err(e) => {
                warn!("Opening {} failed, closing the browser: {}", url, e);
                self.teardown_locked(state).await;
                Err(e)
            }
        }
    }

    /// Drop the page and process. The last URL is kept for recovery.
    async fn teardown_locked(&self, state: &mut BrowserState) {
        if let Some(page) = state.page.take() {
            let _ = page.close().await;
        }
        if let Some(mut process) = state.process.take() {
            if let Err(e) = process.close().await {
                debug!("Browser did not close cleanly: {}", e);
            }
        }
        state.headless = None;
    }
}

async fn is_usable(page: &dyn BrowserPage) -> bool {
    page.probe().await.usable()
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    pub struct FakeElement {
        pub page: Arc<FakePage>,
        pub kind: &'static str,
    }

    #[async_trait]
    impl PageElement for FakeElement {
        async fn find(&self, selector: &str) -> Option<Box<dyn PageElement>> {
            let kind = if selector.starts_with("input[type=\"text\"]") && self.page.has_input {
                "input"
            } else if selector.contains("submit") && self.page.has_submit {
                "submit"
            } else {
                return None;
            };
            Some(Box::new(FakeElement {
                page: Arc::clone(&self.page),
                kind,
            }))
        }

        async fn click(&self) -> Result<()> {
            if self.kind == "submit" {
                self.page.log("click submit");
                self.page.submitted.store(true, Ordering::SeqCst);
            }
            Ok(())
        }

        async fn replace_text(&self, text: &str) -> Result<()> {
            self.page.log(&format!("type {}", text));
            Ok(())
        }

        async fn press_enter(&self) -> Result<()> {
            self.page.log("press enter");
            self.page.submitted.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    pub struct FakePage {
        pub open: AtomicBool,
        pub lookup: AtomicBool,
        pub wait: AtomicBool,
        pub fail_navigation: bool,
        pub has_form: bool,
        pub has_input: bool,
        pub has_submit: bool,
        pub html: String,
        pub submitted: AtomicBool,
        pub url: StdMutex<Option<String>>,
        pub actions: StdMutex<Vec<String>>,
    }

    impl Default for FakePage {
        fn default() -> Self {
            Self {
                open: AtomicBool::new(true),
                lookup: AtomicBool::new(true),
                wait: AtomicBool::new(true),
                fail_navigation: false,
                has_form: true,
                has_input: true,
                has_submit: true,
                html: String::new(),
                submitted: AtomicBool::new(false),
                url: StdMutex::new(None),
                actions: StdMutex::new(Vec::new()),
            }
        }
    }

    impl FakePage {
        pub fn log(&self, action: &str) {
            self.actions.lock().unwrap().push(action.to_string());
        }

        pub fn actions(&self) -> Vec<String> {
            self.actions.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BrowserPage for Arc<FakePage> {
        async fn probe(&self) -> PageProbe {
            PageProbe {
                open: self.open.load(Ordering::SeqCst),
                element_lookup: self.lookup.load(Ordering::SeqCst),
                explicit_wait: self.wait.load(Ordering::SeqCst),
            }
        }

        async fn navigate(&self, url: &str) -> Result<()> {
            if self.fail_navigation {
                return Err(SeekerError::Browser("net::ERR_NAME_NOT_RESOLVED".to_string()));
            }
            *self.url.lock().unwrap() = Some(url.to_string());
            Ok(())
        }

        async fn find_xpath(&self, _xpath: &str) -> Option<Box<dyn PageElement>> {
            if self.has_form {
                Some(Box::new(FakeElement {
                    page: Arc::clone(self),
                    kind: "form",
                }))
            } else {
                None
            }
        }

        async fn wait_for_xpath(&self, xpath: &str, _timeout: Duration) -> Result<()> {
            if self.submitted.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(SeekerError::Timeout(xpath.to_string()))
            }
        }

        async fn content(&self) -> Result<String> {
            Ok(self.html.clone())
        }

        async fn url(&self) -> Option<String> {
            self.url.lock().unwrap().clone()
        }

        async fn bring_to_front(&self) -> Result<()> {
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            self.open.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct FakeProcessState {
        pub pages: StdMutex<Vec<Arc<FakePage>>>,
        pub closed: AtomicBool,
        pub broken: bool,
        pub fail_navigation: bool,
        pub page_html: String,
    }

    pub struct FakeProcess(pub Arc<FakeProcessState>);

    #[async_trait]
    impl BrowserProcess for FakeProcess {
        async fn new_page(&self) -> Result<Arc<dyn BrowserPage>> {
            if self.0.broken || self.0.closed.load(Ordering::SeqCst) {
                return Err(SeekerError::Browser("target crashed".to_string()));
            }
            let page = Arc::new(FakePage {
                fail_navigation: self.0.fail_navigation,
                html: self.0.page_html.clone(),
                ..FakePage::default()
            });
            self.0.pages.lock().unwrap().push(Arc::clone(&page));
            Ok(Arc::new(page))
        }

        async fn pages(&self) -> Result<Vec<Arc<dyn BrowserPage>>> {
            if self.0.closed.load(Ordering::SeqCst) {
                return Err(SeekerError::Browser("browser closed".to_string()));
            }
            Ok(self
                .0
                .pages
                .lock()
                .unwrap()
                .iter()
                .map(|p| Arc::new(Arc::clone(p)) as Arc<dyn BrowserPage>)
                .collect())
        }

        async fn close(&mut self) -> Result<()> {
            self.0.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Launches fake processes. The first `broken_launches` processes cannot
    /// open pages.
    #[derive(Default)]
    pub struct FakeLauncher {
        pub launches: AtomicUsize,
        pub broken_launches: usize,
        pub fail_navigation: bool,
        pub page_html: String,
        pub processes: StdMutex<Vec<Arc<FakeProcessState>>>,
        pub headless_modes: StdMutex<Vec<bool>>,
    }

    impl FakeLauncher {
        pub fn launch_count(&self) -> usize {
            self.launches.load(Ordering::SeqCst)
        }

        pub fn process(&self, index: usize) -> Arc<FakeProcessState> {
            Arc::clone(&self.processes.lock().unwrap()[index])
        }
    }

    #[async_trait]
    impl BrowserLauncher for FakeLauncher {
        async fn launch(&self, headless: bool) -> Result<Box<dyn BrowserProcess>> {
            let index = self.launches.fetch_add(1, Ordering::SeqCst);
            let state = Arc::new(FakeProcessState {
                broken: index < self.broken_launches,
                fail_navigation: self.fail_navigation,
                page_html: self.page_html.clone(),
                ..FakeProcessState::default()
            });
            self.processes.lock().unwrap().push(Arc::clone(&state));
            self.headless_modes.lock().unwrap().push(headless);
            Ok(Box::new(FakeProcess(state)))
        }
    }
}
