//! Push-notification sink for emissary.
//!
//! The sink is fire-and-forget: callers hand it a message and move on.
//! Delivery failures are logged and swallowed — a dead notification
//! endpoint must never fail a chat turn.

pub mod pushover;

use async_trait::async_trait;

pub use pushover::PushoverNotifier;

/// The notification sink abstraction.
///
/// `push` has no return value by contract; implementations absorb their
/// own failures.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a text message, best-effort.
    async fn push(&self, message: &str);
}
