mod common;

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use axum::http::{Method, StatusCode};
use tradelink_api::{AppState, build_router};
use tradelink_gateway::RelayScope;

use common::{call, seed_account, send, test_state};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve(state: AppState) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = build_router(state);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn next_event(client: &mut Client) -> Option<Value> {
    loop {
        let frame = tokio::time::timeout(Duration::from_millis(500), client.next())
            .await
            .ok()??
            .ok()?;
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).ok();
        }
    }
}

async fn connect(addr: SocketAddr, token: &str) -> Client {
    let (mut client, _) = connect_async(format!("ws://{}/gateway?token={}", addr, token))
        .await
        .unwrap();
    let ready = next_event(&mut client).await.expect("ready event");
    assert_eq!(ready["type"], "Ready");
    client
}

#[tokio::test]
async fn handshake_without_valid_token_is_refused() {
    let addr = serve(test_state(RelayScope::Participants)).await;

    for url in [
        format!("ws://{}/gateway", addr),
        format!("ws://{}/gateway?token=not-a-jwt", addr),
    ] {
        match connect_async(url).await {
            Err(tungstenite::Error::Http(response)) => {
                assert_eq!(response.status().as_u16(), 401);
            }
            other => panic!("expected HTTP 401 rejection, got {:?}", other.map(|_| ())),
        }
    }
}

#[tokio::test]
async fn messages_reach_only_the_two_participants() {
    let state = test_state(RelayScope::Participants);
    let addr = serve(state.clone()).await;
    let app = build_router(state.clone());

    let (a, token_a) = seed_account(&state, "Alice");
    let (b, token_b) = seed_account(&state, "Bob");
    let (_c, token_c) = seed_account(&state, "Carol");

    let mut ws_a = connect(addr, &token_a).await;
    let mut ws_b = connect(addr, &token_b).await;
    let mut ws_c = connect(addr, &token_c).await;

    let (status, sent) = send(&app, &token_a, b, "live?").await;
    assert_eq!(status, StatusCode::CREATED);

    for ws in [&mut ws_a, &mut ws_b] {
        let event = next_event(ws).await.expect("message event");
        assert_eq!(event["type"], "MessageCreate");
        assert_eq!(event["data"]["message"]["content"], "live?");
        assert_eq!(event["data"]["message"]["senderId"], a.to_string());
    }
    assert!(next_event(&mut ws_c).await.is_none());

    let id = sent["data"]["id"].as_str().unwrap();
    let (status, _) = call(&app, Method::PATCH, &format!("/api/v1/messages/{}/read", id), Some(&token_b), None).await;
    assert_eq!(status, StatusCode::OK);

    for ws in [&mut ws_a, &mut ws_b] {
        let read = next_event(ws).await.expect("read receipt");
        assert_eq!(read["type"], "MessageRead");
        assert_eq!(read["data"]["messageId"], id);
        assert_eq!(read["data"]["readerId"], b.to_string());
    }

    let (status, _) = call(&app, Method::DELETE, &format!("/api/v1/messages/{}", id), Some(&token_a), None).await;
    assert_eq!(status, StatusCode::OK);

    for ws in [&mut ws_a, &mut ws_b] {
        let deleted = next_event(ws).await.expect("delete event");
        assert_eq!(deleted["type"], "MessageDelete");
        assert_eq!(deleted["data"]["messageId"], id);
        assert_eq!(deleted["data"]["deletedBy"], a.to_string());
    }
    assert!(next_event(&mut ws_c).await.is_none());
}

#[tokio::test]
async fn malformed_handshake_query_gets_structured_error() {
    let app = build_router(test_state(RelayScope::Participants));

    let (status, body) = call(&app, Method::GET, "/gateway?token=one&token=two", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_argument");
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn global_scope_reaches_every_connection() {
    let state = test_state(RelayScope::Global);
    let addr = serve(state.clone()).await;
    let app = build_router(state.clone());

    let (_a, token_a) = seed_account(&state, "Alice");
    let (b, _) = seed_account(&state, "Bob");
    let (_c, token_c) = seed_account(&state, "Carol");

    let mut ws_c = connect(addr, &token_c).await;

    send(&app, &token_a, b, "everyone hears this").await;

    let event = next_event(&mut ws_c).await.expect("broadcast event");
    assert_eq!(event["type"], "MessageCreate");
}
