use crate::error::CallError;
use crate::registry::SessionRegistry;
use crate::router::EventRouter;
use callbridge_audio::AudioFormat;
use callbridge_telephony::{Ncco, ProviderCallStatus, TelephonyProvider};
use callbridge_types::{Direction, SessionSnapshot};
use std::sync::Arc;

/// Settings the controller needs from the server configuration.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Caller id for outbound calls.
    pub from_number: String,
    /// Public `ws://` or `wss://` URL of the audio socket endpoint.
    pub socket_url: String,
    /// Format announced to the provider for the socket audio.
    pub transport: AudioFormat,
    /// Audio played to the caller before the socket connects.
    pub answer_stream_url: Option<String>,
}

/// Call control operations exposed over HTTP.
pub struct CallController {
    registry: Arc<SessionRegistry>,
    router: Arc<EventRouter>,
    provider: Arc<dyn TelephonyProvider>,
    config: ControllerConfig,
}

impl std::fmt::Debug for CallController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallController")
            .field("config", &self.config)
            .field("sessions", &self.registry.len())
            .finish_non_exhaustive()
    }
}

/// Accepts E.164-ish numbers: an optional `+` followed by 6 to 15 digits.
fn validate_number(number: &str) -> Result<(), CallError> {
    let digits = number.strip_prefix('+').unwrap_or(number);
    if (6..=15).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(CallError::InvalidInput(format!(
            "not a valid phone number: {:?}",
            number
        )))
    }
}

impl CallController {
    pub fn new(
        router: Arc<EventRouter>,
        provider: Arc<dyn TelephonyProvider>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            registry: router.registry().clone(),
            router,
            provider,
            config,
        }
    }

    /// Places an outbound call and returns its session id without waiting
    /// for the far end to ring or answer.
    pub async fn initiate_call(&self, to_number: &str) -> Result<String, CallError> {
        let to_number = to_number.trim();
        validate_number(to_number)?;

        let id = uuid::Uuid::new_v4().to_string();
        let session = self.registry.create(&id, Direction::Outbound, to_number)?;

        let call = match self
            .provider
            .create_outbound_call(to_number, &self.config.from_number)
            .await
        {
            Ok(call) => call,
            Err(e) => {
                self.registry.remove(&id);
                tracing::warn!(call_id = %id, to = %to_number, "provider rejected outbound call: {}", e);
                return Err(e.into());
            }
        };

        session.set_provider_call_id(&call.uuid);
        for alias in [&call.conversation_uuid, &call.uuid] {
            if alias.is_empty() {
                continue;
            }
            if let Err(e) = self.registry.alias(alias, &id) {
                tracing::warn!(call_id = %id, alias = %alias, "failed to register provider id: {}", e);
            }
        }

        tracing::info!(
            call_id = %id,
            direction = %Direction::Outbound,
            to = %to_number,
            conversation_uuid = %call.conversation_uuid,
            leg = %call.uuid,
            "outbound call instantiated"
        );
        Ok(id)
    }

    pub fn get_status(&self, id: &str) -> Result<SessionSnapshot, CallError> {
        self.registry
            .get(id)
            .map(|s| s.snapshot())
            .ok_or_else(|| CallError::NotFound(id.to_string()))
    }

    /// Asks the provider for its view of the call leg.
    pub async fn provider_status(&self, id: &str) -> Result<ProviderCallStatus, CallError> {
        let session = self
            .registry
            .get(id)
            .ok_or_else(|| CallError::NotFound(id.to_string()))?;
        let leg = session
            .provider_call_id()
            .ok_or_else(|| CallError::NotFound(format!("{} has no provider call id", id)))?;
        Ok(self.provider.get_call(&leg).await?)
    }

    /// Hangs up at the provider in the background and ends the session
    /// locally. Returns the session as it was just before teardown.
    pub fn end_call(&self, id: &str) -> Result<SessionSnapshot, CallError> {
        let session = self
            .registry
            .get(id)
            .ok_or_else(|| CallError::NotFound(id.to_string()))?;

        if let Some(leg) = session.provider_call_id() {
            let provider = self.provider.clone();
            let call_id = session.id().to_string();
            tokio::spawn(async move {
                if let Err(e) = provider.terminate_call(&leg).await {
                    tracing::warn!(call_id = %call_id, leg = %leg, "provider hangup failed: {}", e);
                }
            });
        }

        let snapshot = session.snapshot();
        self.router.terminate(session.id(), "ended by request")?;
        Ok(snapshot)
    }

    /// Answer-webhook response: connect the call audio to our socket.
    pub fn answer_instructions(&self, call_key: Option<&str>) -> Ncco {
        let uri = match call_key {
            Some(key) if !key.is_empty() => format!("{}?call={}", self.config.socket_url, key),
            _ => self.config.socket_url.clone(),
        };

        let mut ncco = Ncco::new();
        if let Some(url) = &self.config.answer_stream_url {
            ncco = ncco.stream(url.clone());
        }
        let from = Some(self.config.from_number.clone()).filter(|n| !n.is_empty());
        ncco.connect_websocket(from, uri, self.config.transport.content_type())
    }
}
