//! Notification events emitted on resource mutation.
//!
//! The permission set produces explicit `Notification` values rather than
//! pushing through a global signal bus; callers hand them to a [`Notifier`].
//! Authorization decisions never wait on delivery.

use serde::Serialize;

use crate::db::UserId;

/// A "tell this principal something happened" event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// The user to notify.
    pub recipient: UserId,
    /// The user whose action triggered the event.
    pub actor: UserId,
    /// Short verb, e.g. "edit" or "delete".
    pub verb: String,
    /// Human-readable description of what happened.
    pub description: String,
}

/// Delivery seam for notification events.
pub trait Notifier: Send + Sync {
    fn deliver(&self, notification: &Notification);
}

/// Notifier that writes events to the log. The default collaborator when no
/// real delivery channel is wired up.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn deliver(&self, notification: &Notification) {
        tracing::info!(
            recipient = notification.recipient,
            actor = notification.actor,
            verb = %notification.verb,
            "{}",
            notification.description
        );
    }
}
