//! HTTP handlers for call control and provider webhooks.

use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Extension, Form, FromRequest, Json, Query, Request},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use callbridge_calls::{CallError, RouteOutcome, WebhookEvent};
use callbridge_telephony::{Ncco, ProviderCallStatus};
use callbridge_types::SessionSnapshot;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

/// Body extractor for call control requests. Accepts JSON and
/// `application/x-www-form-urlencoded` bodies; anything unparseable is a 400
/// with the usual `{"error": msg}` body.
#[derive(Debug)]
pub struct JsonOrForm<T>(pub T);

impl<T, S> FromRequest<S> for JsonOrForm<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"));

        if is_form {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            Ok(Self(value))
        } else {
            let Json(value) = Json::<T>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            Ok(Self(value))
        }
    }
}

/// Request body for `POST /call`.
#[derive(Debug, Deserialize)]
pub struct CreateCallRequest {
    #[serde(rename = "phoneNumber")]
    pub phone_number: String,
}

/// Request body for `POST /end-call`.
#[derive(Debug, Deserialize)]
pub struct EndCallRequest {
    pub id: String,
}

/// Response body for call control requests.
#[derive(Debug, Serialize, Deserialize)]
pub struct CallResponse {
    #[serde(rename = "callId")]
    pub call_id: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct CallStatusQuery {
    pub id: String,
    /// Also ask the provider for its view of the call.
    #[serde(default)]
    pub refresh: bool,
}

/// Response body for `GET /call-status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CallStatusResponse {
    pub session: SessionSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderCallStatus>,
}

#[derive(Debug, Deserialize)]
pub struct AnswerQuery {
    pub conversation_uuid: Option<String>,
    pub uuid: Option<String>,
}

/// API error type.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("upstream provider error: {0}")]
    BadGateway(String),
    #[error("upstream timeout: {0}")]
    GatewayTimeout(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::GatewayTimeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<CallError> for ApiError {
    fn from(e: CallError) -> Self {
        let message = e.to_string();
        match e {
            CallError::InvalidInput(_) => ApiError::BadRequest(message),
            CallError::NotFound(_) => ApiError::NotFound(message),
            CallError::DuplicateSession(_) | CallError::SocketRefused { .. } => {
                ApiError::Conflict(message)
            }
            CallError::Provider(_) => ApiError::BadGateway(message),
            CallError::Timeout(_) => ApiError::GatewayTimeout(message),
        }
    }
}

/// Handler for `GET /`.
pub async fn root_handler() -> Json<Value> {
    Json(json!({ "message": "OK" }))
}

/// Handler for `POST /call`.
///
/// Returns as soon as the provider accepts the call; ringing and answer
/// arrive later as webhooks.
pub async fn create_call_handler(
    Extension(state): Extension<Arc<AppState>>,
    JsonOrForm(payload): JsonOrForm<CreateCallRequest>,
) -> Result<Json<CallResponse>, ApiError> {
    let call_id = state.controller.initiate_call(&payload.phone_number).await?;
    Ok(Json(CallResponse {
        call_id,
        message: "call_instantiated".to_string(),
    }))
}

/// Handler for `GET /call-status`.
pub async fn call_status_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<CallStatusQuery>,
) -> Result<Json<CallStatusResponse>, ApiError> {
    let session = state.controller.get_status(&query.id)?;
    let provider = if query.refresh {
        Some(state.controller.provider_status(&query.id).await?)
    } else {
        None
    };
    Ok(Json(CallStatusResponse { session, provider }))
}

/// Handler for `GET /calls`.
pub async fn list_calls_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Json<Vec<SessionSnapshot>> {
    Json(state.registry.list())
}

/// Handler for `POST /end-call`.
pub async fn end_call_handler(
    Extension(state): Extension<Arc<AppState>>,
    JsonOrForm(payload): JsonOrForm<EndCallRequest>,
) -> Result<Json<CallResponse>, ApiError> {
    let snapshot = state.controller.end_call(&payload.id)?;
    Ok(Json(CallResponse {
        call_id: snapshot.id,
        message: "call_ended".to_string(),
    }))
}

/// Handler for `POST /event`.
///
/// The provider retries on anything but a 2xx, so every delivery is
/// acknowledged, including malformed and unknown ones.
pub async fn event_handler(
    Extension(state): Extension<Arc<AppState>>,
    body: Bytes,
) -> Json<Value> {
    match serde_json::from_slice::<WebhookEvent>(&body) {
        Ok(event) => {
            if let RouteOutcome::Discarded(reason) = state.router.handle(event) {
                tracing::debug!(?reason, "webhook discarded");
            }
        }
        Err(e) => {
            tracing::warn!(bytes = body.len(), "malformed webhook body: {}", e);
        }
    }
    Json(json!({ "status": "accepted" }))
}

/// Handler for `GET /answer`.
pub async fn answer_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<AnswerQuery>,
) -> Json<Ncco> {
    let key = query.conversation_uuid.or(query.uuid);
    tracing::info!(call = key.as_deref().unwrap_or("<none>"), "answer webhook");
    Json(state.controller.answer_instructions(key.as_deref()))
}
