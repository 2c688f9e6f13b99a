//! Operator notifications: short-lived toasts fanned out to every surface.
//!
//! DESIGN
//! ======
//! Producers (snapshot loader, dispatcher, surfaces) call `Notifier`, which
//! logs the notification and broadcasts it. Nothing blocks on delivery: a
//! notification with no listeners is dropped. Each consumer keeps its own
//! `ToastTray` that expires entries after their time-to-live.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::{info, warn};

pub const DEFAULT_TOAST_TTL: Duration = Duration::from_secs(4);

const CHANNEL_CAPACITY: usize = 64;
const TRAY_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Variant {
    #[default]
    Default,
    Destructive,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub variant: Variant,
    pub ttl: Duration,
}

impl Notification {
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.variant == Variant::Destructive
    }
}

#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
    ttl: Duration,
}

impl Notifier {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx, ttl }
    }

    pub fn info(&self, title: &str, description: impl Into<String>) {
        self.notify(title, description.into(), Variant::Default);
    }

    pub fn error(&self, title: &str, description: impl Into<String>) {
        self.notify(title, description.into(), Variant::Destructive);
    }

    fn notify(&self, title: &str, description: String, variant: Variant) {
        match variant {
            Variant::Default => info!(%title, %description, "notify"),
            Variant::Destructive => warn!(%title, %description, "notify"),
        }
        let notification = Notification { title: title.to_owned(), description, variant, ttl: self.ttl };
        let _ = self.tx.send(notification);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_TOAST_TTL)
    }
}

/// Visible toasts for one surface, newest first, expiring by TTL.
#[derive(Debug, Default)]
pub struct ToastTray {
    active: VecDeque<(Instant, Notification)>,
}

impl ToastTray {
    pub fn push(&mut self, now: Instant, notification: Notification) {
        self.active.push_front((now + notification.ttl, notification));
        self.active.truncate(TRAY_LIMIT);
    }

    /// Drop expired toasts. Returns how many were dismissed.
    pub fn prune(&mut self, now: Instant) -> usize {
        let before = self.active.len();
        self.active.retain(|(expires_at, _)| *expires_at > now);
        before - self.active.len()
    }

    pub fn visible(&self) -> impl Iterator<Item = &Notification> {
        self.active.iter().map(|(_, notification)| notification)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

#[cfg(test)]
#[path = "notify_test.rs"]
mod tests;
