//! Download progress formatting and polling

use crate::progress::ProgressSink;
use crate::qbittorrent::{QbitClient, TorrentInfo};
use crate::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

/// Delay before the first status check
pub const INITIAL_DELAY: Duration = Duration::from_millis(2500);

/// Delay between status checks
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Consecutive lookups that may miss before tracking gives up
pub const MAX_MISSES: u32 = 6;

/// ETA qBittorrent reports when it cannot estimate one
const UNKNOWN_ETA: i64 = 8_640_000;

/// Human-readable byte count (`1.5 KB`, `12 MB`)
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;

    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if value >= 10.0 {
        format!("{:.0} {}", value, UNITS[unit])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Remaining time as `1h 2m`, `2m 5s` or `42s`
pub fn format_eta(seconds: i64) -> String {
    if seconds <= 0 || seconds >= UNKNOWN_ETA {
        return "Calculating...".to_string();
    }

    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// A rendered status message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRender {
    pub content: String,
    /// Finished or failed; stop polling
    pub done: bool,
}

pub fn render_progress(info: &TorrentInfo, display_name: &str) -> ProgressRender {
    let percent = ((info.progress * 100.0).round() as u64).min(100);
    let state = if info.state.is_empty() {
        "downloading".to_string()
    } else {
        info.state.to_lowercase()
    };

    let is_error = state.contains("error");
    let is_complete =
        percent >= 100 || state.contains("stalledup") || state.contains("pausedup");

    let prefix = if is_error {
        "❌"
    } else if is_complete {
        "✅"
    } else {
        "⬇️"
    };

    ProgressRender {
        content: format!(
            "{} {}\nProgress: {}% | {} / {}\nSpeed: {}/s | ETA: {}",
            prefix,
            display_name,
            percent,
            format_bytes(info.downloaded),
            format_bytes(info.size),
            format_bytes(info.dlspeed),
            format_eta(info.eta)
        ),
        done: is_error || is_complete,
    }
}

/// Source of torrent status by tag
#[async_trait]
pub trait TorrentLookup: Send + Sync {
    async fn torrent_by_tag(&self, tag: &str) -> Result<Option<TorrentInfo>>;
}

#[async_trait]
impl TorrentLookup for QbitClient {
    async fn torrent_by_tag(&self, tag: &str) -> Result<Option<TorrentInfo>> {
        QbitClient::torrent_by_tag(self, tag).await
    }
}

/// How tracking ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    /// Completed or errored; carries the last render
    Finished(ProgressRender),
    /// The tag never showed up
    NotFound,
    /// A lookup failed
    Lost(String),
}

/// Polls a torrent until it completes, fails or cannot be found
pub struct DownloadTracker<'a> {
    lookup: &'a dyn TorrentLookup,
    initial_delay: Duration,
    poll_interval: Duration,
    max_misses: u32,
}

impl<'a> DownloadTracker<'a> {
    pub fn new(lookup: &'a dyn TorrentLookup) -> Self {
        Self {
            lookup,
            initial_delay: INITIAL_DELAY,
            poll_interval: POLL_INTERVAL,
            max_misses: MAX_MISSES,
        }
    }

    pub fn with_intervals(mut self, initial_delay: Duration, poll_interval: Duration) -> Self {
        self.initial_delay = initial_delay;
        self.poll_interval = poll_interval;
        self
    }

    /// Publish a status message after every check
    pub async fn track(
        &self,
        tag: &str,
        display_name: &str,
        publish: &dyn ProgressSink,
    ) -> TrackOutcome {
        publish.step(&format!("📥 Starting download for {}...", display_name));
        tokio::time::sleep(self.initial_delay).await;

        let mut misses = 0;
        loop {
            match self.lookup.torrent_by_tag(tag).await {
                Ok(Some(info)) => {
                    let rendered = render_progress(&info, display_name);
                    publish.step(&rendered.content);
                    if rendered.done {
                        debug!("Download {} finished", tag);
                        return TrackOutcome::Finished(rendered);
                    }
                }
                Ok(None) => {
                    misses += 1;
                    if misses > self.max_misses {
                        warn!("Gave up tracking {} after {} misses", tag, misses);
                        publish.step(&format!(
                            "⚠️ Could not find the download for {} to track.",
                            display_name
                        ));
                        return TrackOutcome::NotFound;
                    }
                }
                Err(e) => {
                    warn!("Lost connection while tracking {}: {}", tag, e);
                    publish.step(&format!(
                        "⚠️ Lost connection while tracking {}: {}",
                        display_name, e
                    ));
                    return TrackOutcome::Lost(e.to_string());
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SeekerError;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn info(progress: f64, state: &str) -> TorrentInfo {
        TorrentInfo {
            name: "Movie".to_string(),
            progress,
            dlspeed: 2 * 1024 * 1024,
            downloaded: 512 * 1024 * 1024,
            size: 1024 * 1024 * 1024,
            eta: 125,
            state: state.to_string(),
            ..TorrentInfo::default()
        }
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(10 * 1024), "10 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.0 MB");
        assert_eq!(format_bytes(3 * 1024u64.pow(4)), "3.0 TB");
        assert_eq!(format_bytes(2048 * 1024u64.pow(4)), "2048 TB");
    }

    #[test]
    fn test_format_eta() {
        assert_eq!(format_eta(0), "Calculating...");
        assert_eq!(format_eta(-5), "Calculating...");
        assert_eq!(format_eta(UNKNOWN_ETA), "Calculating...");
        assert_eq!(format_eta(42), "42s");
        assert_eq!(format_eta(125), "2m 5s");
        assert_eq!(format_eta(3725), "1h 2m");
    }

    #[test]
    fn test_render_downloading() {
        let rendered = render_progress(&info(0.5, "downloading"), "Movie (2020)");
        assert!(!rendered.done);
        assert_eq!(
            rendered.content,
            "⬇️ Movie (2020)\nProgress: 50% | 512 MB / 1.0 GB\nSpeed: 2.0 MB/s | ETA: 2m 5s"
        );
    }

    #[test]
    fn test_render_complete_and_error() {
        let complete = render_progress(&info(0.3, "stalledUP"), "Movie");
        assert!(complete.done);
        assert!(complete.content.starts_with("✅ Movie"));

        let full = render_progress(&info(1.2, "downloading"), "Movie");
        assert!(full.done);
        assert!(full.content.contains("Progress: 100%"));

        let failed = render_progress(&info(1.0, "error"), "Movie");
        assert!(failed.done);
        assert!(failed.content.starts_with("❌ Movie"));
    }

    struct Scripted(Mutex<VecDeque<Result<Option<TorrentInfo>>>>);

    #[async_trait]
    impl TorrentLookup for Scripted {
        async fn torrent_by_tag(&self, _tag: &str) -> Result<Option<TorrentInfo>> {
            self.0.lock().unwrap().pop_front().unwrap_or(Ok(None))
        }
    }

    fn scripted(steps: Vec<Result<Option<TorrentInfo>>>) -> Scripted {
        Scripted(Mutex::new(steps.into()))
    }

    #[tokio::test]
    async fn test_track_until_complete() {
        let lookup = scripted(vec![
            Ok(None),
            Ok(Some(info(0.4, "downloading"))),
            Ok(Some(info(1.0, "uploading"))),
        ]);
        let messages = Mutex::new(Vec::new());
        let sink = |m: &str| messages.lock().unwrap().push(m.to_string());

        let outcome = DownloadTracker::new(&lookup)
            .with_intervals(Duration::ZERO, Duration::ZERO)
            .track("seeker-1", "Movie", &sink)
            .await;

        assert!(matches!(outcome, TrackOutcome::Finished(ref r) if r.content.starts_with("✅")));
        let messages = messages.lock().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], "📥 Starting download for Movie...");
    }

    #[tokio::test]
    async fn test_track_gives_up_after_misses() {
        let lookup = scripted(vec![]);
        let outcome = DownloadTracker::new(&lookup)
            .with_intervals(Duration::ZERO, Duration::ZERO)
            .track("seeker-2", "Movie", &crate::progress::NoProgress)
            .await;
        assert_eq!(outcome, TrackOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_track_stops_on_error() {
        let lookup = scripted(vec![Err(SeekerError::AuthFailed("nope".to_string()))]);
        let outcome = DownloadTracker::new(&lookup)
            .with_intervals(Duration::ZERO, Duration::ZERO)
            .track("seeker-3", "Movie", &crate::progress::NoProgress)
            .await;
        assert!(matches!(outcome, TrackOutcome::Lost(ref m) if m.contains("nope")));
    }
}
