//! Progress reporting for batch runs.
//!
//! The pipeline never logs straight to a UI. It emits [`ProgressEvent`]s to
//! an injected [`ProgressSink`] and signals the end of a run separately via
//! [`ProgressSink::finished`].

use crate::pipeline::RunSummary;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProgressLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for ProgressLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProgressLevel::Info => "INFO",
            ProgressLevel::Warn => "WARNING",
            ProgressLevel::Error => "ERROR",
        };
        f.write_str(label)
    }
}

/// One timestamped, leveled progress message
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub timestamp: DateTime<Utc>,
    pub level: ProgressLevel,
    /// File name of the archive the message is about, if any
    pub archive: Option<String>,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(level: ProgressLevel, archive: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            archive: archive.map(str::to_string),
            message: message.into(),
        }
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.level,
            self.message
        )
    }
}

/// Receiver of pipeline progress.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);

    /// Terminal notification, sent once after the last archive.
    fn finished(&self, _summary: &RunSummary) {}
}

/// Forwards events to `tracing` at the matching level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn report(&self, event: ProgressEvent) {
        let archive = event.archive.as_deref().unwrap_or("-");
        match event.level {
            ProgressLevel::Info => info!(archive = archive, "{}", event.message),
            ProgressLevel::Warn => warn!(archive = archive, "{}", event.message),
            ProgressLevel::Error => error!(archive = archive, "{}", event.message),
        }
    }

    fn finished(&self, summary: &RunSummary) {
        info!("{}", summary);
    }
}

/// Message delivered by [`ChannelSink`]
#[derive(Debug, Clone)]
pub enum ProgressMessage {
    Event(ProgressEvent),
    Finished(RunSummary),
}

/// Sends progress over a channel, for running the pipeline on a background
/// task while another task renders messages.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: UnboundedSender<ProgressMessage>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<ProgressMessage>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelSink {
    fn report(&self, event: ProgressEvent) {
        // A closed receiver only means nobody is listening anymore.
        let _ = self.tx.send(ProgressMessage::Event(event));
    }

    fn finished(&self, summary: &RunSummary) {
        let _ = self.tx.send(ProgressMessage::Finished(summary.clone()));
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<ProgressEvent>>,
    summary: Mutex<Option<RunSummary>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        lock(&self.events).clone()
    }

    pub fn summary(&self) -> Option<RunSummary> {
        lock(&self.summary).clone()
    }

    /// Events at `level` that mention `archive`
    pub fn events_for(&self, archive: &str, level: ProgressLevel) -> Vec<ProgressEvent> {
        lock(&self.events)
            .iter()
            .filter(|e| e.level == level && e.archive.as_deref() == Some(archive))
            .cloned()
            .collect()
    }
}

impl ProgressSink for CollectingSink {
    fn report(&self, event: ProgressEvent) {
        lock(&self.events).push(event);
    }

    fn finished(&self, summary: &RunSummary) {
        *lock(&self.summary) = Some(summary.clone());
    }
}

// Poisoning is ignored: the guarded values are only pushed to or replaced.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_display_format() {
        let event = ProgressEvent::new(ProgressLevel::Warn, Some("mod2.jar"), "en_us.json not found");
        let line = event.to_string();
        assert!(line.ends_with("WARNING: en_us.json not found"));
        // "YYYY-MM-DD HH:MM:SS " prefix
        assert_eq!(line.find(" WARNING"), Some(19));
    }

    #[test]
    fn test_level_ordering() {
        assert!(ProgressLevel::Info < ProgressLevel::Warn);
        assert!(ProgressLevel::Warn < ProgressLevel::Error);
    }

    #[test]
    fn test_collecting_sink_filters_by_archive_and_level() {
        let sink = CollectingSink::new();
        sink.report(ProgressEvent::new(ProgressLevel::Info, Some("a.jar"), "Processing a.jar"));
        sink.report(ProgressEvent::new(ProgressLevel::Warn, Some("a.jar"), "skip"));
        sink.report(ProgressEvent::new(ProgressLevel::Warn, Some("b.jar"), "skip"));

        assert_eq!(sink.events().len(), 3);
        assert_eq!(sink.events_for("a.jar", ProgressLevel::Warn).len(), 1);
        assert!(sink.summary().is_none());
    }

    #[tokio::test]
    async fn test_channel_sink_delivers_events_and_completion() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = ChannelSink::new(tx);

        sink.report(ProgressEvent::new(ProgressLevel::Info, None, "hello"));
        sink.finished(&RunSummary::default());

        match rx.recv().await {
            Some(ProgressMessage::Event(e)) => assert_eq!(e.message, "hello"),
            other => panic!("unexpected message: {:?}", other),
        }
        assert!(matches!(rx.recv().await, Some(ProgressMessage::Finished(_))));
    }

    #[test]
    fn test_channel_sink_ignores_closed_receiver() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        ChannelSink::new(tx).report(ProgressEvent::new(ProgressLevel::Info, None, "late"));
    }
}
