//! Events delivered from the session controller to the front-end.
//!
//! Match results and queue snapshots travel on a bounded channel and are
//! dropped with a warning when the front-end falls behind. Every other
//! event travels on an unbounded channel and is never dropped.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tracing::{debug, warn};

use crate::protocol::{MatchEvent, QueueSnapshot};

/// Session state as seen by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No valid credential; the login screen is showing.
    Unauthenticated,
    /// A stored credential is being checked with the server.
    Validating,
    /// Logged in, realtime link closed.
    AuthenticatedDisconnected,
    /// Logged in, subscribed to match results.
    AuthenticatedConnected,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(
            self,
            Self::AuthenticatedDisconnected | Self::AuthenticatedConnected
        )
    }

    /// Status-bar label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "Logged out",
            Self::Validating => "Validating...",
            Self::AuthenticatedDisconnected => "Disconnected",
            Self::AuthenticatedConnected => "Connected",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Events emitted by a [`SessionController`](crate::session::SessionController).
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The session moved to a new state.
    StateChanged(SessionState),

    /// The front-end must show the login screen.
    ///
    /// Emitted once per transition into `Unauthenticated`.
    RedirectToLogin { reason: String },

    /// Auto-refresh stopped because no valid credential is held.
    AuthenticationRequired,

    /// A match result arrived on the realtime link.
    Match(MatchEvent),

    /// The queue table was replaced.
    QueueRefreshed(QueueSnapshot),

    /// The server ended the realtime connection.
    LinkClosed { reason: Option<String> },
}

impl SessionEvent {
    /// Match results and queue snapshots; a later one supersedes a lost one.
    pub fn is_droppable(&self) -> bool {
        matches!(self, Self::Match(_) | Self::QueueRefreshed(_))
    }
}

/// Create the event stream. `capacity` bounds the droppable events only.
pub fn event_channel(capacity: usize) -> (EventSink, SessionEvents) {
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let (updates_tx, updates_rx) = mpsc::channel(capacity.max(1));
    (
        EventSink {
            control: control_tx,
            updates: updates_tx,
        },
        SessionEvents {
            control: control_rx,
            updates: updates_rx,
        },
    )
}

/// Sending half of the event stream.
#[derive(Debug, Clone)]
pub struct EventSink {
    control: mpsc::UnboundedSender<SessionEvent>,
    updates: mpsc::Sender<SessionEvent>,
}

impl EventSink {
    pub fn emit(&self, event: SessionEvent) {
        if !event.is_droppable() {
            if self.control.send(event).is_err() {
                debug!("session event stream closed, receiver dropped");
            }
            return;
        }
        match self.updates.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("session event channel full, dropping update");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("session event stream closed, receiver dropped");
            }
        }
    }
}

/// Receiving half of the event stream.
///
/// Pending control events are delivered ahead of pending updates.
#[derive(Debug)]
pub struct SessionEvents {
    control: mpsc::UnboundedReceiver<SessionEvent>,
    updates: mpsc::Receiver<SessionEvent>,
}

impl SessionEvents {
    /// Wait for the next event. `None` once the controller is gone.
    ///
    /// Cancel-safe: usable as a `tokio::select!` branch.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        tokio::select! {
            biased;
            Some(event) = self.control.recv() => Some(event),
            Some(event) = self.updates.recv() => Some(event),
            else => None,
        }
    }

    /// Take the next pending event without waiting.
    ///
    /// # Errors
    ///
    /// [`TryRecvError::Empty`] when nothing is pending,
    /// [`TryRecvError::Disconnected`] once the controller is gone.
    pub fn try_recv(&mut self) -> Result<SessionEvent, TryRecvError> {
        let control = match self.control.try_recv() {
            Ok(event) => return Ok(event),
            Err(e) => e,
        };
        match self.updates.try_recv() {
            Err(TryRecvError::Disconnected) if control == TryRecvError::Empty => {
                Err(TryRecvError::Empty)
            }
            other => other,
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn control_events_survive_a_full_update_channel() {
        let (sink, mut events) = event_channel(2);
        for _ in 0..5 {
            sink.emit(SessionEvent::QueueRefreshed(QueueSnapshot::default()));
        }
        sink.emit(SessionEvent::RedirectToLogin {
            reason: "Logged out.".into(),
        });
        sink.emit(SessionEvent::StateChanged(SessionState::Unauthenticated));

        assert!(matches!(
            events.recv().await,
            Some(SessionEvent::RedirectToLogin { .. })
        ));
        assert_eq!(
            events.recv().await,
            Some(SessionEvent::StateChanged(SessionState::Unauthenticated))
        );

        let mut updates = 0;
        while let Ok(event) = events.try_recv() {
            assert!(event.is_droppable());
            updates += 1;
        }
        assert_eq!(updates, 2);
    }

    #[tokio::test]
    async fn stream_ends_when_every_sink_is_dropped() {
        let (sink, mut events) = event_channel(4);
        let clone = sink.clone();
        drop(sink);
        clone.emit(SessionEvent::AuthenticationRequired);
        drop(clone);

        assert_eq!(
            events.recv().await,
            Some(SessionEvent::AuthenticationRequired)
        );
        assert_eq!(events.recv().await, None);
        assert_eq!(events.try_recv(), Err(TryRecvError::Disconnected));
    }
}
