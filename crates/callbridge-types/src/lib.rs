//! Shared types for the callbridge workspace.
//!
//! Every crate that needs to talk about a call (its direction, its lifecycle
//! state, the events that move it between states, or a serialized view of it)
//! takes the definition from here. Keeping them in one leaf crate keeps the
//! dependency graph acyclic: the telephony, voice and session crates never
//! depend on each other for vocabulary.

pub mod session;

pub use session::{EventLogEntry, SessionSnapshot};

use serde::{Deserialize, Serialize};

/// Which side placed the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// The counterpart dialled our number.
    Inbound,
    /// We dialled the counterpart.
    Outbound,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Direction {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inbound" => Ok(Self::Inbound),
            "outbound" => Ok(Self::Outbound),
            _ => Err(ParseError::Direction(s.to_string())),
        }
    }
}

/// Lifecycle state of a call session.
///
/// Variants are declared in lifecycle order, so the derived `Ord` answers
/// "is this state behind that one". A transition to a state that does not
/// compare greater than the current one is a no-op, except that
/// [`CallState::Terminated`] always wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    /// Registered locally, nothing heard from the provider yet.
    Created,
    /// The provider reports the far end is ringing.
    Ringing,
    /// The far end picked up; the audio socket has not connected yet.
    Answered,
    /// The audio socket is open and the bridge is running.
    Streaming,
    /// The call ended; waiting for the socket and pipeline to drain.
    Completing,
    /// Final state. The session is torn down and leaves the registry.
    Terminated,
}

impl CallState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Ringing => "ringing",
            Self::Answered => "answered",
            Self::Streaming => "streaming",
            Self::Completing => "completing",
            Self::Terminated => "terminated",
        }
    }

    /// Returns `true` once the call is over, whether or not it has drained.
    pub fn is_ending(self) -> bool {
        self >= Self::Completing
    }
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that happened to a call.
///
/// Most kinds arrive as provider webhooks; `SocketOpened` and `SocketClosed`
/// are observed locally by the audio bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallEventKind {
    Started,
    Ringing,
    Answered,
    Completed,
    Canceled,
    Busy,
    Failed,
    Rejected,
    Timeout,
    Unanswered,
    SocketOpened,
    SocketClosed,
}

impl CallEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Ringing => "ringing",
            Self::Answered => "answered",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
            Self::Busy => "busy",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
            Self::Timeout => "timeout",
            Self::Unanswered => "unanswered",
            Self::SocketOpened => "socket_opened",
            Self::SocketClosed => "socket_closed",
        }
    }

    /// Kinds that end the call abruptly, skipping `Completing`.
    pub fn is_abort(self) -> bool {
        matches!(
            self,
            Self::Canceled
                | Self::Busy
                | Self::Failed
                | Self::Rejected
                | Self::Timeout
                | Self::Unanswered
        )
    }

    /// Kinds that may open a session for a call we have not seen before.
    pub fn opens_inbound(self) -> bool {
        matches!(self, Self::Started | Self::Ringing)
    }
}

impl std::fmt::Display for CallEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CallEventKind {
    type Err = ParseError;

    /// Parses a provider webhook `status`. Both spellings of the terminal
    /// statuses are accepted ("complete"/"completed", "canceled"/"cancelled").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(Self::Started),
            "ringing" => Ok(Self::Ringing),
            "answered" => Ok(Self::Answered),
            "complete" | "completed" => Ok(Self::Completed),
            "canceled" | "cancelled" => Ok(Self::Canceled),
            "busy" => Ok(Self::Busy),
            "failed" => Ok(Self::Failed),
            "rejected" => Ok(Self::Rejected),
            "timeout" => Ok(Self::Timeout),
            "unanswered" => Ok(Self::Unanswered),
            "socket_opened" => Ok(Self::SocketOpened),
            "socket_closed" => Ok(Self::SocketClosed),
            _ => Err(ParseError::EventKind(s.to_string())),
        }
    }
}

/// Error returned when a wire string does not name a known value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown call direction: {0}")]
    Direction(String),
    #[error("unknown call event kind: {0}")]
    EventKind(String),
}
