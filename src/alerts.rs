use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A transient message for the user (toast / popup).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub title: String,
    pub message: String,
}

impl Alert {
    pub fn new(level: AlertLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(AlertLevel::Error, title, message)
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, alert: Alert);
}

/// Writes alerts to the log. Used when nothing is listening.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, alert: Alert) {
        match alert.level {
            AlertLevel::Error => log::error!("{}: {}", alert.title, alert.message),
            AlertLevel::Warning => log::warn!("{}: {}", alert.title, alert.message),
            AlertLevel::Info | AlertLevel::Success => {
                log::info!("{}: {}", alert.title, alert.message)
            }
        }
    }
}

/// Forwards alerts to whoever holds the receiver (the UI layer).
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Alert>,
}

impl ChannelNotifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Alert>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, alert: Alert) {
        if self.tx.send(alert.clone()).is_err() {
            // Receiver gone; don't lose the message entirely
            LogNotifier.notify(alert);
        }
    }
}
