use tokio::sync::mpsc;

use crate::notification::ProgressNotification;
use crate::session::SessionId;

/// Receives progress notifications as soon as they are parsed.
///
/// Called synchronously from the read loop, in stream order. Implementations
/// must return quickly; buffer internally if the work is slow. A sink shared
/// between sessions may be called concurrently.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, session: &SessionId, notification: &ProgressNotification);
}

impl<F> ProgressSink for F
where
    F: Fn(&SessionId, &ProgressNotification) + Send + Sync,
{
    fn on_progress(&self, session: &SessionId, notification: &ProgressNotification) {
        self(session, notification)
    }
}

/// Sink that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn on_progress(&self, _session: &SessionId, _notification: &ProgressNotification) {}
}

/// Forwards notifications over an unbounded channel.
///
/// Sending never blocks. Once the receiver is gone notifications are dropped.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<(SessionId, ProgressNotification)>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(SessionId, ProgressNotification)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn on_progress(&self, session: &SessionId, notification: &ProgressNotification) {
        let _ = self.tx.send((session.clone(), notification.clone()));
    }
}
