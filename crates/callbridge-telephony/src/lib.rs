//! Telephony provider integration.
//!
//! [`TelephonyProvider`] is the seam the call controller talks through;
//! [`VonageClient`] implements it against the Vonage Voice API. [`Ncco`]
//! builds the answer-webhook response that connects call audio to our
//! WebSocket.

pub mod config;
pub mod error;
pub mod ncco;
pub mod provider;
pub mod vonage;

pub use config::TelephonyConfig;
pub use error::TelephonyError;
pub use ncco::{ConnectEndpoint, Ncco, NccoAction};
pub use provider::{CallEndpoint, OutboundCall, ProviderCallStatus, TelephonyProvider};
pub use vonage::{AppClaims, AppTokenSigner, VonageClient};
