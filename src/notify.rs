//! Identity-deduplicated user-facing notifications.
//!
//! The reconciler and direct user actions can both legitimately report the
//! same change. The gate derives a stable identity per message (explicit key
//! or the message text itself) and suppresses re-displays while that
//! identity is still within its display window.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use log::{error, info, warn};
use tokio::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Info,
    Warning,
    Error,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Fire-and-forget display mechanism (toast surface, console, test probe).
pub trait NotificationSurface: Send + Sync {
    fn show(&self, kind: NotificationKind, message: &str);
}

/// Default surface routing through the `log` facade.
#[derive(Debug, Default)]
pub struct LogSurface;

impl NotificationSurface for LogSurface {
    fn show(&self, kind: NotificationKind, message: &str) {
        match kind {
            NotificationKind::Error => error!("{message}"),
            NotificationKind::Warning => warn!("{message}"),
            _ => info!("{message}"),
        }
    }
}

pub struct NotificationGate {
    surface: Box<dyn NotificationSurface>,
    display_for: Duration,
    active: Mutex<HashMap<String, Instant>>,
}

impl NotificationGate {
    pub const DEFAULT_DISPLAY_FOR: Duration = Duration::from_secs(4);

    pub fn new(surface: impl NotificationSurface + 'static) -> Self {
        Self::with_display_for(surface, Self::DEFAULT_DISPLAY_FOR)
    }

    pub fn with_display_for(
        surface: impl NotificationSurface + 'static,
        display_for: Duration,
    ) -> Self {
        Self {
            surface: Box::new(surface),
            display_for,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Shows `message` unless a notification with the same identity (here,
    /// the message text) is still active.
    pub fn notify(&self, kind: NotificationKind, message: &str) {
        self.deliver(kind, message, message);
    }

    /// Shows `message` deduplicated under an explicit identity key, so
    /// differently worded messages about one condition still collapse.
    pub fn notify_keyed(&self, kind: NotificationKind, message: &str, key: &str) {
        self.deliver(kind, message, key);
    }

    fn deliver(&self, kind: NotificationKind, message: &str, key: &str) {
        let now = Instant::now();
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.retain(|_, expires| *expires > now);
        if active.contains_key(key) {
            return;
        }
        active.insert(key.to_string(), now + self.display_for);
        drop(active);
        self.surface.show(kind, message);
    }
}

impl Default for NotificationGate {
    fn default() -> Self {
        Self::new(LogSurface)
    }
}
