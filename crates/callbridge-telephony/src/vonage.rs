//! Vonage Voice API client.

use crate::config::TelephonyConfig;
use crate::error::TelephonyError;
use crate::provider::{OutboundCall, ProviderCallStatus, TelephonyProvider};
use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Claims of a Vonage application JWT.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppClaims {
    pub application_id: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// Mints short-lived RS256 tokens for the application.
#[derive(Clone)]
pub struct AppTokenSigner {
    application_id: String,
    key: EncodingKey,
    ttl_secs: i64,
}

impl fmt::Debug for AppTokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppTokenSigner")
            .field("application_id", &self.application_id)
            .field("key", &"[REDACTED]")
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

impl AppTokenSigner {
    pub fn from_rsa_pem(
        application_id: impl Into<String>,
        pem: &[u8],
        ttl_secs: u64,
    ) -> Result<Self, TelephonyError> {
        let key = EncodingKey::from_rsa_pem(pem)?;
        Ok(Self {
            application_id: application_id.into(),
            key,
            ttl_secs: ttl_secs.max(1) as i64,
        })
    }

    pub fn token(&self) -> Result<String, TelephonyError> {
        let now = chrono::Utc::now().timestamp();
        let claims = AppClaims {
            application_id: self.application_id.clone(),
            iat: now,
            exp: now + self.ttl_secs,
            jti: uuid::Uuid::new_v4().to_string(),
        };
        Ok(encode(&Header::new(Algorithm::RS256), &claims, &self.key)?)
    }
}

#[derive(Debug, Serialize)]
struct PhoneEndpoint<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    number: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateCallRequest<'a> {
    to: [PhoneEndpoint<'a>; 1],
    from: PhoneEndpoint<'a>,
    answer_url: [&'a str; 1],
    event_url: [&'a str; 1],
}

#[derive(Debug, Serialize)]
struct ModifyCallRequest {
    action: &'static str,
}

/// [`TelephonyProvider`] over the Vonage Voice REST API.
#[derive(Debug, Clone)]
pub struct VonageClient {
    client: reqwest::Client,
    api_base: String,
    signer: AppTokenSigner,
    answer_url: String,
    event_url: String,
}

impl VonageClient {
    /// Builds a client from config, reading the private key file.
    pub fn from_config(cfg: &TelephonyConfig) -> Result<Self, TelephonyError> {
        if cfg.private_key_path.is_empty() {
            return Err(TelephonyError::Config(
                "telephony.private_key_path is not set".to_string(),
            ));
        }
        let pem = std::fs::read(&cfg.private_key_path).map_err(|e| {
            TelephonyError::Config(format!(
                "failed to read private key {}: {}",
                cfg.private_key_path, e
            ))
        })?;
        Self::with_private_key(cfg, &pem)
    }

    pub fn with_private_key(cfg: &TelephonyConfig, pem: &[u8]) -> Result<Self, TelephonyError> {
        if cfg.application_id.is_empty() {
            return Err(TelephonyError::Config(
                "telephony.application_id is not set".to_string(),
            ));
        }
        if cfg.answer_url.is_empty() || cfg.event_url.is_empty() {
            return Err(TelephonyError::Config(
                "telephony.answer_url and telephony.event_url must be set".to_string(),
            ));
        }

        let signer = AppTokenSigner::from_rsa_pem(&cfg.application_id, pem, cfg.jwt_ttl_secs)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            signer,
            answer_url: cfg.answer_url.clone(),
            event_url: cfg.event_url.clone(),
        })
    }

    fn call_url(&self, uuid: &str) -> String {
        format!("{}/v1/calls/{}", self.api_base, uuid)
    }
}

/// Passes successful responses through; anything else becomes `Rejected`.
async fn check(res: reqwest::Response) -> Result<reqwest::Response, TelephonyError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    Err(TelephonyError::Rejected {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl TelephonyProvider for VonageClient {
    async fn create_outbound_call(
        &self,
        to: &str,
        from: &str,
    ) -> Result<OutboundCall, TelephonyError> {
        let body = CreateCallRequest {
            to: [PhoneEndpoint {
                kind: "phone",
                number: to,
            }],
            from: PhoneEndpoint {
                kind: "phone",
                number: from,
            },
            answer_url: [self.answer_url.as_str()],
            event_url: [self.event_url.as_str()],
        };

        let res = self
            .client
            .post(format!("{}/v1/calls", self.api_base))
            .bearer_auth(self.signer.token()?)
            .json(&body)
            .send()
            .await?;
        let res = check(res).await?;

        let call: OutboundCall = res
            .json()
            .await
            .map_err(|e| TelephonyError::Decode(e.to_string()))?;
        tracing::debug!(uuid = %call.uuid, conversation_uuid = %call.conversation_uuid, status = %call.status, "provider accepted outbound call");
        Ok(call)
    }

    async fn get_call(&self, uuid: &str) -> Result<ProviderCallStatus, TelephonyError> {
        let res = self
            .client
            .get(self.call_url(uuid))
            .bearer_auth(self.signer.token()?)
            .send()
            .await?;
        let res = check(res).await?;
        res.json()
            .await
            .map_err(|e| TelephonyError::Decode(e.to_string()))
    }

    async fn terminate_call(&self, uuid: &str) -> Result<(), TelephonyError> {
        let res = self
            .client
            .put(self.call_url(uuid))
            .bearer_auth(self.signer.token()?)
            .json(&ModifyCallRequest { action: "hangup" })
            .send()
            .await?;
        check(res).await?;
        Ok(())
    }
}
