//! User-facing notifications
//!
//! Controllers report failures and retries through a [`Notifier`]; the page
//! glue turns them into toasts or banners. [`TracingNotifier`] just logs,
//! [`RecordingNotifier`] keeps them for assertions.

use serde::Serialize;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// One message for the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub severity: Severity,
    pub message: String,
    /// Offer a retry affordance
    pub retryable: bool,
    /// Stay visible until dismissed
    pub persistent: bool,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
            retryable: false,
            persistent: false,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Success,
            ..Self::info(message)
        }
    }

    /// Retry in progress after a timeout
    pub fn retrying(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::info(message)
        }
    }

    /// Transient failure; `retryable` for network-class errors
    pub fn error(message: impl Into<String>, retryable: bool) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            retryable,
            persistent: false,
        }
    }

    /// Permanent failure, shown without auto-retry
    pub fn permanent_error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            retryable: false,
            persistent: true,
        }
    }
}

/// Sink for user-facing notifications
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Logs notifications through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification.severity {
            Severity::Info | Severity::Success => tracing::info!("{}", notification.message),
            Severity::Warning => tracing::warn!("{}", notification.message),
            Severity::Error => tracing::error!(
                retryable = notification.retryable,
                persistent = notification.persistent,
                "{}",
                notification.message
            ),
        }
    }
}

/// Keeps every notification in memory
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.seen
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default()
    }

    pub fn errors(&self) -> Vec<Notification> {
        self.notifications()
            .into_iter()
            .filter(|n| n.severity == Severity::Error)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let err = Notification::error("Network down", true);
        assert_eq!(err.severity, Severity::Error);
        assert!(err.retryable);
        assert!(!err.persistent);

        let fatal = Notification::permanent_error("Gave up");
        assert!(fatal.persistent);
        assert!(!fatal.retryable);

        assert_eq!(Notification::retrying("again").severity, Severity::Warning);
    }

    #[test]
    fn test_recording_notifier() {
        let notifier = RecordingNotifier::new();
        notifier.notify(Notification::info("Loaded"));
        notifier.notify(Notification::error("Failed", false));

        assert_eq!(notifier.notifications().len(), 2);
        assert_eq!(notifier.errors()[0].message, "Failed");
    }
}
