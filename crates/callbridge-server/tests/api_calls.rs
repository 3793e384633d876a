mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use callbridge_server::app;
use common::{test_state, FakeProvider};
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_form(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn setup() -> (Router, Arc<FakeProvider>) {
    let provider = Arc::new(FakeProvider::default());
    (app(test_state(provider.clone())), provider)
}

async fn place_call(app: &Router) -> String {
    let (status, body) = send(app, post_json("/call", json!({ "phoneNumber": "15557654321" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "call_instantiated");
    body["callId"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_check_returns_ok() {
    let (app, _) = setup();
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

    let (status, body) = send(&app, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "OK" }));
}

#[tokio::test]
async fn create_call_registers_outbound_session() {
    let (app, provider) = setup();
    let call_id = place_call(&app).await;
    assert_eq!(provider.created.load(Ordering::SeqCst), 1);

    let (status, body) = send(&app, get(&format!("/call-status?id={}", call_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["id"], call_id);
    assert_eq!(body["session"]["direction"], "outbound");
    assert_eq!(body["session"]["state"], "created");
    assert_eq!(body["session"]["counterpart"], "15557654321");
    assert_eq!(body["session"]["providerCallId"], "leg-1");
    assert!(body.get("provider").is_none());

    // Provider ids resolve to the same session.
    let (status, body) = send(&app, get("/call-status?id=CON-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["id"], call_id);
}

#[tokio::test]
async fn create_call_rejects_bad_numbers() {
    let (app, provider) = setup();
    for number in ["", "12", "not-a-number", "+1234567890123456"] {
        let (status, body) = send(&app, post_json("/call", json!({ "phoneNumber": number }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "number {:?}", number);
        assert!(body["error"].as_str().unwrap().contains("phone number"));
    }
    assert_eq!(provider.created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn provider_rejection_is_bad_gateway_and_leaves_no_session() {
    let (app, provider) = setup();
    provider.reject.store(true, Ordering::SeqCst);

    let (status, body) = send(&app, post_json("/call", json!({ "phoneNumber": "15557654321" }))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("401"));

    let (_, calls) = send(&app, get("/calls")).await;
    assert_eq!(calls, json!([]));
}

#[tokio::test]
async fn unknown_call_status_is_not_found() {
    let (app, _) = setup();
    let (status, body) = send(&app, get("/call-status?id=nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn refresh_includes_provider_view() {
    let (app, _) = setup();
    let call_id = place_call(&app).await;

    let (status, body) = send(&app, get(&format!("/call-status?id={}&refresh=true", call_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["provider"]["uuid"], "leg-1");
    assert_eq!(body["provider"]["status"], "answered");
}

#[tokio::test]
async fn webhooks_drive_the_session() {
    let (app, _) = setup();
    let call_id = place_call(&app).await;

    for status in ["started", "ringing", "answered"] {
        let (code, body) = send(
            &app,
            post_json(
                "/event",
                json!({ "status": status, "conversation_uuid": "CON-1", "uuid": "leg-1", "direction": "outbound" }),
            ),
        )
        .await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body, json!({ "status": "accepted" }));
    }

    let (_, body) = send(&app, get(&format!("/call-status?id={}", call_id))).await;
    assert_eq!(body["session"]["state"], "answered");
    assert_eq!(body["session"]["eventLog"].as_array().unwrap().len(), 3);

    let (code, _) = send(
        &app,
        post_json("/event", json!({ "status": "completed", "uuid": "leg-1" })),
    )
    .await;
    assert_eq!(code, StatusCode::OK);

    let (status, _) = send(&app, get(&format!("/call-status?id={}", call_id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn webhook_endpoint_always_acknowledges() {
    let (app, _) = setup();

    let malformed = Request::builder()
        .method("POST")
        .uri("/event")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, malformed).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "accepted");

    for event in [
        json!({}),
        json!({ "status": "machine", "conversation_uuid": "CON-X" }),
        json!({ "status": "answered" }),
        json!({ "status": "answered", "conversation_uuid": "CON-unknown" }),
    ] {
        let (status, _) = send(&app, post_json("/event", event)).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, calls) = send(&app, get("/calls")).await;
    assert_eq!(calls, json!([]));
}

#[tokio::test]
async fn inbound_call_opens_session_from_webhook() {
    let (app, _) = setup();
    let (status, _) = send(
        &app,
        post_json(
            "/event",
            json!({
                "status": "ringing",
                "direction": "inbound",
                "conversation_uuid": "CON-in",
                "uuid": "leg-in",
                "from": "15559990000",
                "to": "15550001111",
                "timestamp": "2026-01-01T12:00:00.000Z"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, calls) = send(&app, get("/calls")).await;
    let calls = calls.as_array().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0]["id"], "CON-in");
    assert_eq!(calls[0]["direction"], "inbound");
    assert_eq!(calls[0]["state"], "ringing");
    assert_eq!(calls[0]["counterpart"], "15559990000");
    assert_eq!(calls[0]["eventLog"][0]["at"], "2026-01-01T12:00:00Z");
}

#[tokio::test]
async fn end_call_hangs_up_and_removes_session() {
    let (app, provider) = setup();
    let call_id = place_call(&app).await;

    let (status, body) = send(&app, post_json("/end-call", json!({ "id": call_id }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["callId"], call_id);
    assert_eq!(body["message"], "call_ended");

    let (status, _) = send(&app, get(&format!("/call-status?id={}", call_id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The provider hangup runs in the background.
    for _ in 0..50 {
        if !provider.hangups().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(provider.hangups(), vec!["leg-1".to_string()]);

    let (status, _) = send(&app, post_json("/end-call", json!({ "id": call_id }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn answer_connects_call_to_socket() {
    let (app, _) = setup();
    let (status, body) = send(&app, get("/answer?conversation_uuid=CON-7&uuid=leg-7")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([{
            "action": "connect",
            "from": "15550001111",
            "endpoint": [{
                "type": "websocket",
                "uri": "ws://localhost:3000/socket?call=CON-7",
                "content-type": "audio/l16;rate=16000"
            }]
        }])
    );
}

#[tokio::test]
async fn malformed_call_request_is_rejected() {
    let (app, _) = setup();
    let (status, body) = send(&app, post_json("/call", json!({ "number": "15557654321" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = send(&app, post_form("/call", "number=15557654321")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn form_encoded_call_requests_are_accepted() {
    let (app, provider) = setup();

    let (status, body) = send(&app, post_form("/call", "phoneNumber=15557654321")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "call_instantiated");
    assert_eq!(provider.created.load(Ordering::SeqCst), 1);

    let call_id = body["callId"].as_str().unwrap().to_string();
    let (status, body) = send(&app, post_form("/end-call", &format!("id={}", call_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "call_ended");
}
