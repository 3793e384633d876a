//! Call session lifecycle and audio bridging.
//!
//! [`SessionRegistry`] owns every live [`CallSession`]. [`EventRouter`] is
//! the only component that changes session state: it applies provider
//! webhooks and socket observations and tears sessions down when they
//! terminate. [`AudioBridge`] runs one loop per audio socket, and
//! [`CallController`] fronts outbound call control.

pub mod bridge;
pub mod controller;
pub mod error;
pub mod registry;
pub mod router;
pub mod session;

pub use bridge::{AudioBridge, TurnReport};
pub use controller::{CallController, ControllerConfig};
pub use error::{CallError, ProviderError};
pub use registry::SessionRegistry;
pub use router::{DiscardReason, EventRouter, RouteOutcome, WebhookEvent};
pub use session::{next_state, AttachError, CallSession, SocketHandle, Transition};
