use std::sync::Arc;

/// Lifecycle states of a [`Connection`](crate::Connection).
///
/// Transitions only move forward; `Closed` is terminal and reachable from
/// every other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unopened,
    Connecting,
    Open,
    Closed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Unopened => "unopened",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        }
    }
}

/// Why the reactor tore a connection down.
#[derive(Debug, Clone)]
pub enum CloseReason {
    /// The peer reached end-of-stream. Graceful, not an error.
    PeerClosed,
    /// The socket reported an error.
    Error(Arc<std::io::Error>),
}

impl CloseReason {
    pub fn is_error(&self) -> bool {
        matches!(self, CloseReason::Error(_))
    }
}

/// Readiness and termination events pushed by the reactor thread.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// The outbound side is usable.
    OpenCompleted,
    /// The outbound side can accept more bytes.
    SpaceAvailable,
    /// The connection is gone. Delivered at most once.
    Closed(CloseReason),
}
