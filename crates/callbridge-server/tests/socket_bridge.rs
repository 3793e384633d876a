mod common;

use callbridge_calls::{SessionRegistry, WebhookEvent};
use callbridge_server::{app, AppState};
use callbridge_types::CallState;
use common::{frame, test_state, FakeProvider};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

const WAIT: Duration = Duration::from_secs(5);

async fn serve(state: AppState) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app(state)).await.unwrap();
    });
    addr
}

fn event(status: &str, conversation_uuid: &str) -> WebhookEvent {
    WebhookEvent {
        status: Some(status.to_string()),
        conversation_uuid: Some(conversation_uuid.to_string()),
        ..WebhookEvent::default()
    }
}

async fn wait_for_state(registry: &SessionRegistry, key: &str, want: Option<CallState>) {
    for _ in 0..100 {
        if registry.get(key).map(|s| s.state()) == want {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!(
        "call {} never reached {:?} (now {:?})",
        key,
        want,
        registry.get(key).map(|s| s.state())
    );
}

/// Places an outbound call and marks it answered.
async fn answered_call(state: &AppState) -> String {
    let id = state.controller.initiate_call("15557654321").await.unwrap();
    state.router.handle(event("answered", "CON-1"));
    assert_eq!(state.registry.get(&id).unwrap().state(), CallState::Answered);
    id
}

#[tokio::test]
async fn utterance_gets_a_spoken_response_until_the_call_completes() {
    let state = test_state(Arc::new(FakeProvider::default()));
    let call_id = answered_call(&state).await;
    let router = state.router.clone();
    let registry = state.registry.clone();
    let addr = serve(state).await;

    let (mut ws, _) = connect_async(format!("ws://{}/socket?call=CON-1", addr))
        .await
        .expect("socket connect failed");
    wait_for_state(&registry, &call_id, Some(CallState::Streaming)).await;

    // 200 ms of speech followed by 200 ms of silence closes one utterance.
    for _ in 0..10 {
        ws.send(Message::Binary(frame(4_000).into())).await.unwrap();
    }
    for _ in 0..10 {
        ws.send(Message::Binary(frame(0).into())).await.unwrap();
    }

    let mut received = Vec::new();
    while received.len() < 2 {
        match tokio::time::timeout(WAIT, ws.next()).await {
            Ok(Some(Ok(Message::Binary(bytes)))) => received.push(bytes.len()),
            Ok(Some(Ok(_))) => continue,
            other => panic!("expected response audio, got {:?}", other),
        }
    }
    assert_eq!(received, vec![640, 640]);
    assert_eq!(
        registry.get(&call_id).unwrap().state(),
        CallState::Streaming
    );

    router.handle(event("completed", "CON-1"));

    let closed = tokio::time::timeout(WAIT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "server should close the socket");
    wait_for_state(&registry, &call_id, None).await;
}

#[tokio::test]
async fn caller_hangup_on_socket_ends_the_call() {
    let state = test_state(Arc::new(FakeProvider::default()));
    let call_id = answered_call(&state).await;
    let registry = state.registry.clone();
    let addr = serve(state).await;

    let (mut ws, _) = connect_async(format!("ws://{}/socket?call={}", addr, call_id))
        .await
        .unwrap();
    wait_for_state(&registry, &call_id, Some(CallState::Streaming)).await;

    ws.close(None).await.unwrap();
    wait_for_state(&registry, &call_id, None).await;
}

#[tokio::test]
async fn socket_for_unknown_call_is_not_found() {
    let state = test_state(Arc::new(FakeProvider::default()));
    let addr = serve(state).await;

    match connect_async(format!("ws://{}/socket?call=missing", addr)).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), 404);
        }
        other => panic!("expected HTTP 404, got {:?}", other.map(|_| ())),
    }

    match connect_async(format!("ws://{}/socket", addr)).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), 400);
        }
        other => panic!("expected HTTP 400, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn second_socket_is_closed_immediately() {
    let state = test_state(Arc::new(FakeProvider::default()));
    let call_id = answered_call(&state).await;
    let registry = state.registry.clone();
    let addr = serve(state).await;

    let (_first, _) = connect_async(format!("ws://{}/socket?call=CON-1", addr))
        .await
        .unwrap();
    wait_for_state(&registry, &call_id, Some(CallState::Streaming)).await;

    let (mut second, _) = connect_async(format!("ws://{}/socket?call=CON-1", addr))
        .await
        .unwrap();
    let next = tokio::time::timeout(WAIT, second.next()).await.unwrap();
    assert!(
        matches!(next, Some(Ok(Message::Close(_))) | None | Some(Err(_))),
        "unexpected message {:?}",
        next
    );

    // The first socket still owns the call.
    let session = registry.get(&call_id).unwrap();
    assert_eq!(session.state(), CallState::Streaming);
    assert!(session.socket_open());
}
