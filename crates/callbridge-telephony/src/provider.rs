use crate::error::TelephonyError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Identifiers the provider assigns when it accepts an outbound call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundCall {
    /// Call-leg id, used for status queries and hangup.
    pub uuid: String,
    /// Conversation id carried by every webhook for this call.
    pub conversation_uuid: String,
    pub status: String,
}

/// One side of a call as the provider reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEndpoint {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
}

/// Provider-side view of a call leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCallStatus {
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_uuid: Option<String>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<CallEndpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<CallEndpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    /// Seconds, as the provider formats it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

/// Outbound call control against a telephony provider.
#[async_trait]
pub trait TelephonyProvider: Send + Sync + 'static {
    /// Asks the provider to dial `to` from `from`. Returns as soon as the
    /// provider accepts the request; progress arrives as webhooks.
    async fn create_outbound_call(&self, to: &str, from: &str)
        -> Result<OutboundCall, TelephonyError>;

    async fn get_call(&self, uuid: &str) -> Result<ProviderCallStatus, TelephonyError>;

    /// Hangs up the call leg.
    async fn terminate_call(&self, uuid: &str) -> Result<(), TelephonyError>;
}
