//! Services shared by every command

use crate::config::Config;
use anyhow::{anyhow, Result};
use futures::future::join_all;
use seeker_core::qbittorrent::download_tag;
use seeker_core::{
    AddTorrent, BrowserManager, ChromeLauncher, DownloadTracker, Fetcher, GoogleSuggest,
    MediaKind, ProgressSink, QbitClient, ResultStore, SavePaths, SearchService, SessionStore,
    SiteStore, TrackOutcome,
};
use std::sync::Arc;
use tracing::info;

/// A torrent handed to qBittorrent, found again by its tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitted {
    pub tag: String,
    pub name: String,
}

pub struct App {
    pub config: Config,
    pub site: SiteStore,
    pub save_paths: SavePaths,
    pub search: SearchService,
    pub results: ResultStore,
    pub sessions: SessionStore,
    pub qbit: QbitClient,
    pub browser: Arc<BrowserManager>,
    pub suggest: GoogleSuggest,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let launcher = Arc::new(ChromeLauncher::with_path(config.browser.chrome_path.clone()));
        let browser = Arc::new(BrowserManager::with_options(
            launcher,
            config.browser_options(),
        ));

        let fetcher = Fetcher::with_config(config.fetch_config())?.with_browser(browser.clone());
        let client = fetcher.client().clone();

        let site = SiteStore::new();
        if let Some(ref url) = config.site.url {
            site.set(url)?;
        }

        let qbit = QbitClient::new(client.clone());
        if let Some(qbit_config) = config.qbit_config() {
            qbit.configure(qbit_config);
        }

        Ok(Self {
            save_paths: config.save_paths(),
            site,
            search: SearchService::new(Arc::new(fetcher)),
            results: ResultStore::new(),
            sessions: SessionStore::new(),
            qbit,
            browser,
            suggest: GoogleSuggest::new(client),
            config,
        })
    }

    /// The saved site, or an error telling the user how to set one
    pub fn base_url(&self) -> Result<String> {
        self.site
            .get()
            .ok_or_else(|| anyhow!("No website configured. Run `seeker website <url>` first."))
    }

    /// Hand a magnet or `.torrent` link to qBittorrent, saving under the
    /// path configured for `kind`
    pub async fn send_to_qbittorrent(
        &self,
        link: &str,
        kind: MediaKind,
        name: &str,
    ) -> Result<Submitted> {
        let tag = download_tag();
        let save_path = self.save_paths.get(kind);
        self.qbit
            .add_torrent(&AddTorrent {
                urls: link.to_string(),
                save_path: Some(save_path.clone()),
                tags: Some(tag.clone()),
            })
            .await?;

        info!("Queued {} into {} with tag {}", name, save_path, tag);
        Ok(Submitted {
            tag,
            name: name.to_string(),
        })
    }

    /// Follow every submitted torrent until each one finishes or is lost
    pub async fn track_downloads(
        &self,
        downloads: &[Submitted],
        progress: &dyn ProgressSink,
    ) -> Vec<TrackOutcome> {
        let tracker = DownloadTracker::new(&self.qbit);
        join_all(
            downloads
                .iter()
                .map(|d| tracker.track(&d.tag, &d.name, progress)),
        )
        .await
    }

    /// Close the browser if any command started one
    pub async fn shutdown(&self) {
        if self.browser.is_running().await {
            self.browser.shutdown().await;
        }
    }
}
