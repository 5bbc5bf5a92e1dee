//! User-facing success/failure messages.
//!
//! Operations report every mutation outcome to a [`NotificationSink`]. The
//! sink is fire-and-forget: nothing it does is observed by the caller.

use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
  Success(String),
  Failure(String),
}

impl Notification {
  pub fn message(&self) -> &str {
    match self {
      Notification::Success(msg) | Notification::Failure(msg) => msg,
    }
  }

  pub fn is_success(&self) -> bool {
    matches!(self, Notification::Success(_))
  }
}

pub trait NotificationSink: Send + Sync {
  fn notify_success(&self, message: &str);
  fn notify_failure(&self, message: &str);
}

/// Writes notifications to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
  fn notify_success(&self, message: &str) {
    info!(target: "labcat::notify", "{}", message);
  }

  fn notify_failure(&self, message: &str) {
    warn!(target: "labcat::notify", "{}", message);
  }
}

/// Forwards notifications over an unbounded channel.
///
/// A closed receiver drops the notification silently.
#[derive(Debug, Clone)]
pub struct ChannelSink {
  tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
  pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { tx }, rx)
  }

  fn send(&self, notification: Notification) {
    let _ = self.tx.send(notification);
  }
}

impl NotificationSink for ChannelSink {
  fn notify_success(&self, message: &str) {
    self.send(Notification::Success(message.to_string()));
  }

  fn notify_failure(&self, message: &str) {
    self.send(Notification::Failure(message.to_string()));
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_channel_sink_forwards_in_order() {
    let (sink, mut rx) = ChannelSink::new();
    sink.notify_success("ok");
    sink.notify_failure("bad");

    assert_eq!(rx.try_recv().unwrap(), Notification::Success("ok".into()));
    let failure = rx.try_recv().unwrap();
    assert!(!failure.is_success());
    assert_eq!(failure.message(), "bad");
    assert!(rx.try_recv().is_err());
  }

  #[test]
  fn test_channel_sink_survives_closed_receiver() {
    let (sink, rx) = ChannelSink::new();
    drop(rx);
    sink.notify_failure("nobody listening");
  }
}
