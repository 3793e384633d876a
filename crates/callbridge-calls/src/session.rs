//! Per-call state.

use callbridge_types::{CallEventKind, CallState, Direction, EventLogEntry, SessionSnapshot};
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

/// Outbound half of an attached audio socket.
///
/// Frames sent here are forwarded to the socket by its writer task. Dropping
/// the handle closes the channel, which ends the writer and with it the
/// socket.
#[derive(Debug)]
pub struct SocketHandle {
    id: Uuid,
    outbound: mpsc::Sender<Vec<u8>>,
}

impl SocketHandle {
    pub fn new(outbound: mpsc::Sender<Vec<u8>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            outbound,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

/// A state change produced by one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: CallState,
    pub to: CallState,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }

    /// `true` when this transition is the one that ended the session.
    pub fn terminated(&self) -> bool {
        self.from != CallState::Terminated && self.to == CallState::Terminated
    }
}

/// Why a socket could not be attached.
#[derive(Debug)]
pub enum AttachError {
    /// The call is completing or over.
    Ending(CallState),
    /// Another socket is already attached.
    Occupied,
}

/// Target state for `kind`, before drain handling.
///
/// Transitions only move forward in lifecycle order; anything that would
/// move backwards leaves the state alone. Abort kinds jump straight to
/// `Terminated` from anywhere.
pub fn next_state(current: CallState, kind: CallEventKind) -> CallState {
    if current == CallState::Terminated || kind.is_abort() {
        return CallState::Terminated;
    }

    let target = match kind {
        CallEventKind::Started | CallEventKind::Ringing => CallState::Ringing,
        CallEventKind::Answered => CallState::Answered,
        CallEventKind::SocketOpened => CallState::Streaming,
        CallEventKind::Completed => CallState::Completing,
        CallEventKind::SocketClosed if current >= CallState::Streaming => CallState::Completing,
        _ => current,
    };

    target.max(current)
}

#[derive(Debug)]
struct Inner {
    state: CallState,
    provider_call_id: Option<String>,
    socket: Option<SocketHandle>,
    pipeline_in_flight: bool,
    event_log: Vec<EventLogEntry>,
    updated_at: DateTime<Utc>,
}

impl Inner {
    /// Applies `kind`, then finishes the drain if the call is completing and
    /// nothing is left to wait for.
    fn step(&mut self, kind: CallEventKind, at: DateTime<Utc>) -> Transition {
        let from = self.state;
        let mut to = next_state(from, kind);
        if to == CallState::Completing && self.socket.is_none() && !self.pipeline_in_flight {
            to = CallState::Terminated;
        }

        self.event_log.push(EventLogEntry { at, kind });
        self.updated_at = Utc::now();
        self.state = to;
        if to == CallState::Terminated {
            self.release();
        }
        Transition { from, to }
    }

    fn release(&mut self) {
        self.socket = None;
        self.pipeline_in_flight = false;
    }
}

/// One live call.
///
/// Identity fields are immutable; everything else sits behind a mutex that
/// is never held across an `.await`. Every state change is published on a
/// watch channel so the audio bridge can stop as soon as the call ends.
#[derive(Debug)]
pub struct CallSession {
    id: String,
    direction: Direction,
    counterpart: String,
    created_at: DateTime<Utc>,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<CallState>,
}

impl CallSession {
    pub fn new(id: impl Into<String>, direction: Direction, counterpart: impl Into<String>) -> Self {
        let now = Utc::now();
        let (state_tx, _) = watch::channel(CallState::Created);
        Self {
            id: id.into(),
            direction,
            counterpart: counterpart.into(),
            created_at: now,
            inner: Mutex::new(Inner {
                state: CallState::Created,
                provider_call_id: None,
                socket: None,
                pipeline_in_flight: false,
                event_log: Vec::new(),
                updated_at: now,
            }),
            state_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, t: Transition) -> Transition {
        if t.changed() {
            self.state_tx.send_replace(t.to);
        }
        t
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn counterpart(&self) -> &str {
        &self.counterpart
    }

    pub fn state(&self) -> CallState {
        self.lock().state
    }

    /// Receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<CallState> {
        self.state_tx.subscribe()
    }

    pub fn provider_call_id(&self) -> Option<String> {
        self.lock().provider_call_id.clone()
    }

    pub fn set_provider_call_id(&self, uuid: impl Into<String>) {
        self.lock().provider_call_id = Some(uuid.into());
    }

    /// Records a lifecycle event and advances the state machine.
    pub fn apply(&self, kind: CallEventKind, at: DateTime<Utc>) -> Transition {
        let t = self.lock().step(kind, at);
        self.publish(t)
    }

    /// Attaches an audio socket. Opening the socket implies the call was
    /// answered, so this advances to `Streaming` from any earlier state.
    ///
    /// On refusal the handle is dropped, which closes the socket. The
    /// attempt is still recorded in the event log.
    pub fn open_socket(
        &self,
        handle: SocketHandle,
        at: DateTime<Utc>,
    ) -> Result<Transition, AttachError> {
        let mut inner = self.lock();
        let state = inner.state;
        if state.is_ending() || inner.socket.is_some() {
            inner.event_log.push(EventLogEntry {
                at,
                kind: CallEventKind::SocketOpened,
            });
            inner.updated_at = Utc::now();
            return Err(if state.is_ending() {
                AttachError::Ending(state)
            } else {
                AttachError::Occupied
            });
        }

        inner.socket = Some(handle);
        let t = inner.step(CallEventKind::SocketOpened, at);
        drop(inner);
        Ok(self.publish(t))
    }

    /// Detaches the socket identified by `socket_id` and records the close.
    ///
    /// Returns `None` when that socket is not the attached one.
    pub fn close_socket(&self, socket_id: Uuid, at: DateTime<Utc>) -> Option<Transition> {
        let mut inner = self.lock();
        match &inner.socket {
            Some(handle) if handle.id == socket_id => {}
            _ => return None,
        }
        inner.socket = None;
        let t = inner.step(CallEventKind::SocketClosed, at);
        drop(inner);
        Some(self.publish(t))
    }

    /// Sender for writing frames to the attached socket, if any.
    pub fn socket_sender(&self) -> Option<mpsc::Sender<Vec<u8>>> {
        self.lock().socket.as_ref().map(|s| s.outbound.clone())
    }

    pub fn socket_open(&self) -> bool {
        self.lock().socket.is_some()
    }

    /// Claims the session's single pipeline slot. Returns `false` if a run
    /// is already in flight or the session is not streaming.
    pub fn begin_pipeline(&self) -> bool {
        let mut inner = self.lock();
        if inner.pipeline_in_flight || inner.state != CallState::Streaming {
            return false;
        }
        inner.pipeline_in_flight = true;
        true
    }

    pub fn finish_pipeline(&self) {
        self.lock().pipeline_in_flight = false;
    }

    pub fn pipeline_in_flight(&self) -> bool {
        self.lock().pipeline_in_flight
    }

    /// Forces `Terminated` without recording an event, dropping the socket
    /// and pipeline slot.
    pub fn terminate(&self) -> Transition {
        let mut inner = self.lock();
        let from = inner.state;
        inner.state = CallState::Terminated;
        inner.updated_at = Utc::now();
        inner.release();
        drop(inner);
        self.publish(Transition {
            from,
            to: CallState::Terminated,
        })
    }

    /// Time since the last event or state change.
    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        (now - self.lock().updated_at).to_std().unwrap_or_default()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.lock();
        SessionSnapshot {
            id: self.id.clone(),
            direction: self.direction,
            state: inner.state,
            counterpart: self.counterpart.clone(),
            provider_call_id: inner.provider_call_id.clone(),
            socket_open: inner.socket.is_some(),
            pipeline_in_flight: inner.pipeline_in_flight,
            created_at: self.created_at,
            updated_at: inner.updated_at,
            event_log: inner.event_log.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CallEventKind::*;

    fn session() -> CallSession {
        CallSession::new("abc", Direction::Outbound, "15551234567")
    }

    fn socket() -> (SocketHandle, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(8);
        (SocketHandle::new(tx), rx)
    }

    #[test]
    fn forward_only_transitions() {
        assert_eq!(next_state(CallState::Created, Ringing), CallState::Ringing);
        assert_eq!(next_state(CallState::Created, Started), CallState::Ringing);
        assert_eq!(next_state(CallState::Answered, Ringing), CallState::Answered);
        assert_eq!(next_state(CallState::Ringing, SocketOpened), CallState::Streaming);
        assert_eq!(next_state(CallState::Streaming, Answered), CallState::Streaming);
        assert_eq!(next_state(CallState::Streaming, SocketClosed), CallState::Completing);
        assert_eq!(next_state(CallState::Answered, SocketClosed), CallState::Answered);
        assert_eq!(next_state(CallState::Streaming, Busy), CallState::Terminated);
        assert_eq!(next_state(CallState::Terminated, Ringing), CallState::Terminated);
    }

    #[test]
    fn complete_without_socket_terminates_immediately() {
        let s = session();
        s.apply(Ringing, Utc::now());
        let t = s.apply(Completed, Utc::now());
        assert_eq!(t.from, CallState::Ringing);
        assert_eq!(t.to, CallState::Terminated);
        assert!(t.terminated());
        assert_eq!(s.snapshot().event_log.len(), 2);
    }

    #[test]
    fn complete_while_streaming_waits_for_socket() {
        let s = session();
        let (handle, _rx) = socket();
        let socket_id = handle.id();
        s.open_socket(handle, Utc::now()).unwrap();
        assert_eq!(s.state(), CallState::Streaming);

        assert_eq!(s.apply(Completed, Utc::now()).to, CallState::Completing);
        assert!(s.socket_open());

        let t = s.close_socket(socket_id, Utc::now()).unwrap();
        assert_eq!(t.to, CallState::Terminated);
        assert!(!s.socket_open());
    }

    #[test]
    fn duplicate_events_are_logged_but_inert() {
        let s = session();
        s.apply(Answered, Utc::now());
        let t = s.apply(Answered, Utc::now());
        assert!(!t.changed());
        let log = s.snapshot().event_log;
        assert_eq!(log.len(), 2);
        assert!(log.iter().all(|e| e.kind == Answered));
    }

    #[test]
    fn socket_refused_when_ending_and_closed() {
        let s = session();
        let (first, _rx1) = socket();
        s.open_socket(first, Utc::now()).unwrap();
        s.apply(Completed, Utc::now());

        let (late, mut late_rx) = socket();
        assert!(matches!(
            s.open_socket(late, Utc::now()),
            Err(AttachError::Ending(CallState::Completing))
        ));
        // The refused handle was dropped with its sender.
        assert!(late_rx.try_recv().is_err());
        assert!(late_rx.is_closed());
    }

    #[test]
    fn second_socket_is_refused() {
        let s = session();
        let (first, _rx1) = socket();
        let first_id = first.id();
        s.open_socket(first, Utc::now()).unwrap();
        let (second, _rx2) = socket();
        let second_id = second.id();
        assert!(matches!(
            s.open_socket(second, Utc::now()),
            Err(AttachError::Occupied)
        ));
        // A close from the refused socket does not detach the live one.
        assert!(s.close_socket(second_id, Utc::now()).is_none());
        assert!(s.close_socket(first_id, Utc::now()).is_some());
    }

    #[test]
    fn pipeline_slot_is_exclusive_and_needs_streaming() {
        let s = session();
        assert!(!s.begin_pipeline());

        let (handle, _rx) = socket();
        s.open_socket(handle, Utc::now()).unwrap();
        assert!(s.begin_pipeline());
        assert!(!s.begin_pipeline());
        s.finish_pipeline();
        assert!(s.begin_pipeline());
    }

    #[test]
    fn terminate_releases_socket_and_publishes() {
        let s = session();
        let mut rx = s.subscribe();
        let (handle, mut out) = socket();
        s.open_socket(handle, Utc::now()).unwrap();
        s.begin_pipeline();

        let t = s.terminate();
        assert!(t.terminated());
        assert!(!s.pipeline_in_flight());
        assert!(out.try_recv().is_err());
        assert!(out.is_closed());
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), CallState::Terminated);
    }
}
