//! User-facing notifications
//!
//! Edits that are rejected and steps that fail are reported through a
//! [`NotificationSink`] as `(kind, title, message)` triples.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Info,
    Warning,
    Error,
}

/// A message for a human
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Info, title, message)
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Warning, title, message)
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Error, title, message)
    }
}

/// Receiver of notifications
pub trait NotificationSink {
    fn notify(&mut self, notification: Notification);
}

/// Collects notifications in order
impl NotificationSink for Vec<Notification> {
    fn notify(&mut self, notification: Notification) {
        self.push(notification);
    }
}

/// Forwards notifications to `tracing` at the matching level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&mut self, n: Notification) {
        match n.kind {
            NotificationKind::Info => info!(title = %n.title, "{}", n.message),
            NotificationKind::Warning => warn!(title = %n.title, "{}", n.message),
            NotificationKind::Error => error!(title = %n.title, "{}", n.message),
        }
    }
}
