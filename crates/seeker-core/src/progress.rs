//! Step-by-step progress reporting for chat-style replies
//!
//! Every long-running operation reports steps through a [`ProgressSink`].
//! [`ProgressTracker`] collects them and renders a reply that fits the
//! platform's message ceiling, trimming the oldest lines first so the most
//! recent status is always visible.

use std::sync::{Arc, Mutex};
use tracing::info;

/// Largest rendered message, in characters
pub const MAX_CONTENT_LENGTH: usize = 1900;

/// Prefix added when earlier steps had to be dropped
pub const TRIM_INDICATOR: &str = "...(earlier steps trimmed)...\n";

/// Receiver for intermediate progress messages
pub trait ProgressSink: Send + Sync {
    fn step(&self, message: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn step(&self, message: &str) {
        self(message)
    }
}

/// A sink that discards everything
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn step(&self, _message: &str) {}
}

/// Kind of step, rendered as a leading marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Info,
    Success,
    Fail,
}

impl StepKind {
    pub fn marker(&self) -> &'static str {
        match self {
            StepKind::Info => "⏳",
            StepKind::Success => "✅",
            StepKind::Fail => "❌",
        }
    }
}

/// Callback invoked with the re-rendered message after each step
pub type Publisher = Box<dyn Fn(&str) + Send + Sync>;

/// Append-only step log bound to one interaction
pub struct ProgressTracker {
    scope: String,
    steps: Mutex<Vec<String>>,
    publisher: Option<Arc<Publisher>>,
}

impl ProgressTracker {
    pub fn new(scope: &str) -> Self {
        Self {
            scope: scope.to_string(),
            steps: Mutex::new(Vec::new()),
            publisher: None,
        }
    }

    /// Publish the rendered message after every step
    pub fn with_publisher<F>(mut self, publisher: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.publisher = Some(Arc::new(Box::new(publisher)));
        self
    }

    pub fn info(&self, message: &str) -> String {
        self.log(StepKind::Info, message)
    }

    pub fn success(&self, message: &str) -> String {
        self.log(StepKind::Success, message)
    }

    pub fn fail(&self, message: &str) -> String {
        self.log(StepKind::Fail, message)
    }

    fn log(&self, kind: StepKind, message: &str) -> String {
        let line = format!("{} {}", kind.marker(), message);
        info!(scope = %self.scope, "{}", line);

        self.steps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(line);

        let rendered = self.render(None);
        if let Some(ref publisher) = self.publisher {
            publisher(&rendered);
        }
        rendered
    }

    /// Render the final message with an optional trailing block
    pub fn complete(&self, extra: Option<&str>) -> String {
        if let Some(extra) = extra {
            info!(scope = %self.scope, "ℹ️ {}", extra);
        }

        let rendered = self.render(extra);
        if let Some(ref publisher) = self.publisher {
            publisher(&rendered);
        }
        rendered
    }

    /// All steps logged so far, untrimmed
    pub fn steps(&self) -> Vec<String> {
        self.steps.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Render the steps (and extra block) within [`MAX_CONTENT_LENGTH`]
    pub fn render(&self, extra: Option<&str>) -> String {
        let steps = self.steps();
        render_lines(&steps, extra, MAX_CONTENT_LENGTH)
    }
}

impl ProgressSink for ProgressTracker {
    fn step(&self, message: &str) {
        self.info(message);
    }
}

fn build(lines: &[String], extra: Option<&str>) -> String {
    let body = lines.join("\n");
    match extra {
        Some(extra) => format!("{}\n\n{}", body, extra),
        None => body,
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn tail_chars(text: &str, count: usize) -> String {
    let skip = char_len(text).saturating_sub(count);
    text.chars().skip(skip).collect()
}

/// Drop the earliest lines until the message fits, keeping the latest line
pub fn render_lines(lines: &[String], extra: Option<&str>, max_len: usize) -> String {
    let message = build(lines, extra);
    if char_len(&message) <= max_len {
        return message;
    }

    let budget = max_len.saturating_sub(char_len(TRIM_INDICATOR));
    let mut start = 0;
    let mut message = build(&lines[start..], extra);
    while char_len(&message) > budget && start + 1 < lines.len() {
        start += 1;
        message = build(&lines[start..], extra);
    }

    if char_len(&message) > budget {
        message = tail_chars(&message, budget);
    }

    format!("{}{}", TRIM_INDICATOR, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_message_untouched() {
        let tracker = ProgressTracker::new("test");
        tracker.info("Starting");
        let rendered = tracker.success("Done");
        assert_eq!(rendered, "⏳ Starting\n✅ Done");
    }

    #[test]
    fn test_trims_earlier_steps() {
        let published = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&published);
        let tracker = ProgressTracker::new("go-to")
            .with_publisher(move |m| sink.lock().unwrap().push(m.to_string()));

        for i in 0..150 {
            tracker.info(&format!("Step {} - {}", i, "x".repeat(30)));
        }

        let published = published.lock().unwrap();
        assert_eq!(published.len(), 150);
        let last = published.last().unwrap();
        assert!(last.chars().count() <= MAX_CONTENT_LENGTH);
        assert!(last.contains("earlier steps trimmed"));
        assert!(last.ends_with(&format!("Step 149 - {}", "x".repeat(30))));
        assert!(!last.contains("Step 0 -"));
        assert_eq!(tracker.steps().len(), 150);
    }

    #[test]
    fn test_complete_keeps_extra() {
        let tracker = ProgressTracker::new("search");
        for i in 0..100 {
            tracker.info(&format!("line {} {}", i, "y".repeat(40)));
        }
        let final_message = tracker.complete(Some("No matching results."));
        assert!(final_message.chars().count() <= MAX_CONTENT_LENGTH);
        assert!(final_message.starts_with(TRIM_INDICATOR));
        assert!(final_message.ends_with("No matching results."));
        assert!(final_message.contains("line 99"));
    }

    #[test]
    fn test_single_oversized_line() {
        let huge = "z".repeat(5000) + "END";
        let rendered = render_lines(&[huge], None, MAX_CONTENT_LENGTH);
        assert_eq!(rendered.chars().count(), MAX_CONTENT_LENGTH);
        assert!(rendered.starts_with(TRIM_INDICATOR));
        assert!(rendered.ends_with("END"));
    }

    #[test]
    fn test_closure_sink() {
        let seen = Mutex::new(Vec::new());
        let sink = |m: &str| seen.lock().unwrap().push(m.to_string());
        sink.step("one");
        sink.step("two");
        assert_eq!(*seen.lock().unwrap(), vec!["one", "two"]);
    }
}
