use callbridge_telephony::TelephonyError;
use callbridge_types::CallState;
use callbridge_voice::VoiceError;
use std::time::Duration;
use thiserror::Error;

/// Failure of an external capability.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error(transparent)]
    Telephony(#[from] TelephonyError),

    #[error(transparent)]
    Voice(#[from] VoiceError),
}

#[derive(Error, Debug)]
pub enum CallError {
    #[error("call session already exists: {0}")]
    DuplicateSession(String),

    #[error("call session not found: {0}")]
    NotFound(String),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("audio socket refused for call {call_id} in state {state}")]
    SocketRefused { call_id: String, state: CallState },

    #[error("invalid request: {0}")]
    InvalidInput(String),
}

impl From<TelephonyError> for CallError {
    fn from(e: TelephonyError) -> Self {
        Self::Provider(e.into())
    }
}

impl From<VoiceError> for CallError {
    fn from(e: VoiceError) -> Self {
        Self::Provider(e.into())
    }
}
