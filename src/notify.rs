use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::Result;
use crate::models::Item;

pub const NO_CONTENT_PLACEHOLDER: &str = "no content available";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    New,
    Removed,
}

/// A fully rendered message, ready for any downstream transport.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub link: String,
    pub author: Option<String>,
    pub body: String,
    pub image: Option<String>,
}

impl Notification {
    pub fn render(kind: NotificationKind, item: &Item) -> Self {
        Self {
            kind,
            title: item.title.clone(),
            link: item.link.clone(),
            author: item.author.clone(),
            body: item
                .content
                .clone()
                .unwrap_or_else(|| NO_CONTENT_PLACEHOLDER.to_string()),
            image: item.thumbnail.clone(),
        }
    }
}

/// Downstream transport boundary. Implementations report success or
/// failure per send; retrying is their concern, not the core's.
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;
    fn send(&self, note: &Notification) -> Result<()>;
}

/// Prints one line per notification, like the original console output.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    fn send(&self, note: &Notification) -> Result<()> {
        let tag = match note.kind {
            NotificationKind::New => "new",
            NotificationKind::Removed => "removed",
        };
        println!("[{}] {} ({})", tag, note.title, note.link);
        Ok(())
    }
}

/// Appends one JSON object per notification to a file, so later tooling
/// can consume the run's output the way the original's JSON dump was.
pub struct JsonLinesNotifier {
    path: PathBuf,
}

impl JsonLinesNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Notifier for JsonLinesNotifier {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    fn send(&self, note: &Notification) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(note)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

/// Fans rendered messages out to every configured notifier. A failed send
/// is logged and skipped; delivery is at-least-once across runs, never
/// exactly-once.
pub struct Dispatcher {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl Dispatcher {
    pub fn new(notifiers: Vec<Box<dyn Notifier>>) -> Self {
        Self { notifiers }
    }

    pub fn dispatch(&self, new: &[Item], removed: &[Item]) {
        let notes = new
            .iter()
            .map(|item| Notification::render(NotificationKind::New, item))
            .chain(
                removed
                    .iter()
                    .map(|item| Notification::render(NotificationKind::Removed, item)),
            );

        for note in notes {
            for notifier in &self.notifiers {
                if let Err(e) = notifier.send(&note) {
                    tracing::warn!("{} notifier failed for {}: {}", notifier.name(), note.link, e);
                }
            }
        }
    }
}
