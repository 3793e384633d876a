//! Applies lifecycle events to sessions.

use crate::error::CallError;
use crate::registry::SessionRegistry;
use crate::session::{AttachError, CallSession, SocketHandle, Transition};
use callbridge_types::{CallEventKind, CallState, Direction};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Body of a provider event webhook. Every field is optional; providers send
/// different subsets per status.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub conversation_uuid: Option<String>,
    /// Call-leg id.
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Why an event was not applied to any session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscardReason {
    MissingStatus,
    UnknownStatus(String),
    MissingCallId,
    /// No live session and the event cannot open one.
    UnknownCall(String),
}

/// What handling an event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// A new inbound session was opened for the event.
    Opened { call_id: String, state: CallState },
    /// Applied to a live session; `from == to` for no-ops.
    Applied {
        call_id: String,
        from: CallState,
        to: CallState,
    },
    /// The session reached `Terminated` and left the registry.
    Terminated { call_id: String, from: CallState },
    Discarded(DiscardReason),
}

/// Routes webhook events and socket observations to sessions.
///
/// This is the only writer of session state. When a session reaches
/// `Terminated` the router removes it from the registry and writes its
/// event log to the structured log.
#[derive(Debug)]
pub struct EventRouter {
    registry: Arc<SessionRegistry>,
}

impl EventRouter {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Handles one provider webhook. Never fails; anything that cannot be
    /// applied is logged and discarded.
    pub fn handle(&self, event: WebhookEvent) -> RouteOutcome {
        let Some(status) = event.status.as_deref() else {
            tracing::debug!(conversation_uuid = ?event.conversation_uuid, "event without status ignored");
            return RouteOutcome::Discarded(DiscardReason::MissingStatus);
        };

        let kind = match status.parse::<CallEventKind>() {
            Ok(CallEventKind::SocketOpened | CallEventKind::SocketClosed) | Err(_) => {
                tracing::warn!(status, conversation_uuid = ?event.conversation_uuid, "unknown event status ignored");
                return RouteOutcome::Discarded(DiscardReason::UnknownStatus(status.to_string()));
            }
            Ok(kind) => kind,
        };

        let keys = [event.conversation_uuid.as_deref(), event.uuid.as_deref()];
        let Some(primary) = keys.iter().flatten().next().map(|k| k.to_string()) else {
            tracing::warn!(event = %kind, "event without call id ignored");
            return RouteOutcome::Discarded(DiscardReason::MissingCallId);
        };

        let at = event.timestamp.unwrap_or_else(Utc::now);
        let found = keys
            .iter()
            .flatten()
            .find_map(|key| self.registry.get(key));

        let session = match found {
            Some(session) => session,
            None if kind.opens_inbound() && event.direction.as_deref() != Some("outbound") => {
                match self.open_inbound(&primary, &event) {
                    Ok(session) => {
                        let t = session.apply(kind, at);
                        tracing::info!(
                            call_id = %session.id(),
                            direction = %Direction::Inbound,
                            counterpart = %session.counterpart(),
                            event = %kind,
                            state = %t.to,
                            "inbound call session opened"
                        );
                        return RouteOutcome::Opened {
                            call_id: session.id().to_string(),
                            state: t.to,
                        };
                    }
                    // Lost a race with a concurrent webhook for the same call.
                    Err(CallError::DuplicateSession(_)) => match self.registry.get(&primary) {
                        Some(session) => session,
                        None => return self.discard_unknown(&primary, kind),
                    },
                    Err(e) => {
                        tracing::warn!(call_id = %primary, "failed to open inbound session: {}", e);
                        return self.discard_unknown(&primary, kind);
                    }
                }
            }
            None => return self.discard_unknown(&primary, kind),
        };

        let t = session.apply(kind, at);
        self.settle(&session, kind, t)
    }

    fn open_inbound(
        &self,
        id: &str,
        event: &WebhookEvent,
    ) -> Result<Arc<CallSession>, CallError> {
        let counterpart = event.from.as_deref().unwrap_or_default();
        let session = self.registry.create(id, Direction::Inbound, counterpart)?;
        if let Some(leg) = event.uuid.as_deref() {
            session.set_provider_call_id(leg);
            if let Err(e) = self.registry.alias(leg, id) {
                tracing::warn!(call_id = %id, leg, "failed to alias call leg: {}", e);
            }
        }
        Ok(session)
    }

    fn discard_unknown(&self, key: &str, kind: CallEventKind) -> RouteOutcome {
        tracing::debug!(call_id = %key, event = %kind, "event for unknown call discarded");
        RouteOutcome::Discarded(DiscardReason::UnknownCall(key.to_string()))
    }

    /// Logs a transition and tears the session down if it just terminated.
    fn settle(&self, session: &CallSession, kind: CallEventKind, t: Transition) -> RouteOutcome {
        if t.changed() {
            tracing::info!(call_id = %session.id(), event = %kind, from = %t.from, to = %t.to, "call state changed");
        } else {
            tracing::debug!(call_id = %session.id(), event = %kind, state = %t.to, "call event recorded");
        }

        if t.terminated() {
            self.teardown(session, kind.as_str());
            return RouteOutcome::Terminated {
                call_id: session.id().to_string(),
                from: t.from,
            };
        }
        RouteOutcome::Applied {
            call_id: session.id().to_string(),
            from: t.from,
            to: t.to,
        }
    }

    /// Removes a terminated session and flushes its event log.
    fn teardown(&self, session: &CallSession, reason: &str) {
        self.registry.remove(session.id());
        let snapshot = session.snapshot();
        let events = serde_json::to_string(&snapshot.event_log).unwrap_or_default();
        tracing::info!(
            call_id = %snapshot.id,
            direction = %snapshot.direction,
            counterpart = %snapshot.counterpart,
            reason,
            events = %events,
            "call session closed"
        );
    }

    /// Attaches an audio socket to the session `key` resolves to.
    ///
    /// On refusal the handle is dropped, closing the socket.
    pub fn socket_opened(
        &self,
        key: &str,
        handle: SocketHandle,
    ) -> Result<Arc<CallSession>, CallError> {
        let session = self
            .registry
            .get(key)
            .ok_or_else(|| CallError::NotFound(key.to_string()))?;

        match session.open_socket(handle, Utc::now()) {
            Ok(t) => {
                self.settle(&session, CallEventKind::SocketOpened, t);
                Ok(session)
            }
            Err(reason) => {
                let state = session.state();
                match reason {
                    AttachError::Ending(_) => {
                        tracing::warn!(call_id = %session.id(), state = %state, "socket refused: call is ending")
                    }
                    AttachError::Occupied => {
                        tracing::warn!(call_id = %session.id(), "socket refused: another socket is attached")
                    }
                }
                Err(CallError::SocketRefused {
                    call_id: session.id().to_string(),
                    state,
                })
            }
        }
    }

    /// Records that socket `socket_id` of session `key` has closed.
    pub fn socket_closed(&self, key: &str, socket_id: Uuid) -> RouteOutcome {
        let Some(session) = self.registry.get(key) else {
            return self.discard_unknown(key, CallEventKind::SocketClosed);
        };
        match session.close_socket(socket_id, Utc::now()) {
            Some(t) => self.settle(&session, CallEventKind::SocketClosed, t),
            None => {
                tracing::debug!(call_id = %session.id(), %socket_id, "close of a detached socket ignored");
                RouteOutcome::Applied {
                    call_id: session.id().to_string(),
                    from: session.state(),
                    to: session.state(),
                }
            }
        }
    }

    /// Ends a session locally regardless of its state.
    ///
    /// A session that another path already terminated is left to that
    /// path's teardown; the returned transition then starts at `Terminated`.
    pub fn terminate(&self, key: &str, reason: &str) -> Result<Transition, CallError> {
        let session = self
            .registry
            .get(key)
            .ok_or_else(|| CallError::NotFound(key.to_string()))?;
        let t = session.terminate();
        if !t.terminated() {
            tracing::debug!(call_id = %session.id(), reason, "call already terminated");
            return Ok(t);
        }
        tracing::info!(call_id = %session.id(), from = %t.from, reason, "call terminated locally");
        self.teardown(&session, reason);
        Ok(t)
    }

    /// Terminates sessions that have been idle for `stale_after` without
    /// streaming. Returns the ids of the swept sessions.
    pub fn sweep_stale(&self, stale_after: Duration) -> Vec<String> {
        let now = Utc::now();
        let mut swept = Vec::new();
        for session in self.registry.sessions() {
            if session.state() == CallState::Streaming || session.idle_for(now) < stale_after {
                continue;
            }
            if let Ok(t) = self.terminate(session.id(), "stale") {
                if t.terminated() {
                    swept.push(session.id().to_string());
                }
            }
        }
        swept
    }
}
