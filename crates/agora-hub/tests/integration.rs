//! End-to-end tests using real WebSocket clients against a booted hub.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use agora_hub::config::HubConfig;
use agora_hub::hub::Hub;
use agora_hub::server::HubServer;
use agora_hub::shutdown::ShutdownCoordinator;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct TestHub {
    url: String,
    shutdown: ShutdownCoordinator,
}

impl Drop for TestHub {
    fn drop(&mut self) {
        self.shutdown.shutdown();
    }
}

/// Boot a hub on an auto-assigned port.
async fn boot() -> TestHub {
    let shutdown = ShutdownCoordinator::new();
    let (hub, handle) = Hub::new(shutdown.token());
    drop(tokio::spawn(hub.run()));

    let server = HubServer::new(HubConfig::default(), handle);
    let running = server.start(shutdown.token()).await.unwrap();

    TestHub {
        url: format!("ws://{}", running.addr),
        shutdown,
    }
}

/// Connect as `identity` and consume the welcome envelope.
async fn connect(hub: &TestHub, identity: &str) -> WsStream {
    let (mut ws, _) = connect_async(format!("{}/ws?identity={identity}", hub.url))
        .await
        .unwrap();
    let welcome = read_json(&mut ws).await;
    assert_eq!(welcome["kind"], "welcome");
    ws
}

/// Read the next text frame as JSON.
async fn read_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Read frames until one matches `kind` or the deadline passes.
async fn read_until_kind(ws: &mut WsStream, kind: &str) -> Value {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        assert!(
            tokio::time::Instant::now() < deadline,
            "never saw kind {kind}"
        );
        let msg = read_json(ws).await;
        if msg["kind"] == kind {
            return msg;
        }
    }
}

/// Whether any frame arrives within `dur`.
async fn try_read_json(ws: &mut WsStream, dur: Duration) -> Option<Value> {
    timeout(dur, async {
        loop {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                return serde_json::from_str::<Value>(&text).ok();
            }
        }
    })
    .await
    .ok()
    .flatten()
}

async fn send(ws: &mut WsStream, kind: &str, data: Value) {
    let frame = json!({"kind": kind, "data": data}).to_string();
    ws.send(Message::text(frame)).await.unwrap();
}

async fn join(ws: &mut WsStream, room: &str) {
    send(ws, "join-room", json!({"roomId": room})).await;
}

#[tokio::test]
async fn welcome_on_connect() {
    let hub = boot().await;
    let (mut ws, _) = connect_async(format!("{}/ws?identity=alice", hub.url))
        .await
        .unwrap();

    let welcome = read_json(&mut ws).await;
    assert_eq!(welcome["kind"], "welcome");
    assert_eq!(welcome["data"]["userId"], "alice");
    assert!(welcome["emittedAt"].is_string());
}

#[tokio::test]
async fn upgrade_without_identity_is_rejected() {
    let hub = boot().await;
    let err = connect_async(format!("{}/ws", hub.url)).await.unwrap_err();

    match err {
        tokio_tungstenite::tungstenite::Error::Http(resp) => {
            assert_eq!(resp.status(), 400);
        }
        other => panic!("expected HTTP error, got {other:?}"),
    }
}

#[tokio::test]
async fn comments_stay_in_their_room() {
    let hub = boot().await;
    let mut alice = connect(&hub, "alice").await;
    let mut bob = connect(&hub, "bob").await;
    let mut carol = connect(&hub, "carol").await;

    join(&mut alice, "proposal:1").await;
    join(&mut bob, "proposal:1").await;
    join(&mut carol, "proposal:2").await;

    // Let the joins land before commenting.
    let _ = read_until_kind(&mut alice, "user-joined").await;

    send(
        &mut alice,
        "comment",
        json!({"entityId": "1", "commentId": "c1", "body": "hello"}),
    )
    .await;

    let seen = read_until_kind(&mut bob, "comment").await;
    assert_eq!(seen["data"]["commentId"], "c1");
    assert_eq!(seen["data"]["userId"], "alice");
    // The commenter receives their own comment too.
    let own = read_until_kind(&mut alice, "comment").await;
    assert_eq!(own["data"]["commentId"], "c1");
    // carol is in a different room.
    assert!(try_read_json(&mut carol, Duration::from_millis(200)).await.is_none());
}

#[tokio::test]
async fn room_events_arrive_in_order() {
    let hub = boot().await;
    let mut alice = connect(&hub, "alice").await;
    let mut bob = connect(&hub, "bob").await;

    join(&mut alice, "proposal:1").await;
    join(&mut bob, "proposal:1").await;
    let _ = read_until_kind(&mut alice, "user-joined").await;

    for i in 0..20 {
        send(
            &mut alice,
            "comment",
            json!({"entityId": "1", "commentId": format!("c{i}"), "body": "x"}),
        )
        .await;
    }

    for i in 0..20 {
        let msg = read_until_kind(&mut bob, "comment").await;
        assert_eq!(msg["data"]["commentId"], format!("c{i}"), "comment {i} out of order");
    }
}

#[tokio::test]
async fn vote_fans_out_to_room_and_global() {
    let hub = boot().await;
    let mut alice = connect(&hub, "alice").await;
    let mut bob = connect(&hub, "bob").await;
    let mut carol = connect(&hub, "carol").await;

    join(&mut alice, "proposal:7").await;
    join(&mut alice, "global").await;
    join(&mut bob, "proposal:7").await;
    join(&mut carol, "global").await;
    // Wait until both joins are visible before voting.
    let _ = read_until_kind(&mut alice, "user-joined").await;
    let _ = read_until_kind(&mut alice, "user-joined").await;

    send(
        &mut alice,
        "vote",
        json!({"entityId": "7", "choice": "for", "weight": 3.5}),
    )
    .await;

    // Room members see the vote, caster included.
    let vote = read_until_kind(&mut bob, "vote").await;
    assert_eq!(vote["data"]["choice"], "for");
    assert_eq!(vote["sourceId"], "alice");
    let own = read_until_kind(&mut alice, "vote").await;
    assert_eq!(own["data"]["userId"], "alice");

    // Global members get a derived notification.
    let note = read_until_kind(&mut carol, "notification").await;
    assert_eq!(note["data"]["kind"], "vote");
    assert_eq!(note["entityId"], "7");
}

#[tokio::test]
async fn second_connection_supersedes_first() {
    let hub = boot().await;
    let mut first = connect(&hub, "alice").await;
    let mut bob = connect(&hub, "bob").await;
    join(&mut first, "proposal:1").await;
    join(&mut bob, "proposal:1").await;
    let _ = read_until_kind(&mut first, "user-joined").await;

    let mut second = connect(&hub, "alice").await;
    join(&mut second, "proposal:1").await;

    send(
        &mut bob,
        "comment",
        json!({"entityId": "1", "commentId": "c1", "body": "after handoff"}),
    )
    .await;

    // The new connection receives room traffic.
    let seen = read_until_kind(&mut second, "comment").await;
    assert_eq!(seen["data"]["commentId"], "c1");

    // The old one is cut off: no comment, stream ends.
    let leftover = timeout(TIMEOUT, async {
        loop {
            match first.next().await {
                Some(Ok(Message::Text(text))) => {
                    let v: Value = serde_json::from_str(&text).unwrap();
                    assert_ne!(v["kind"], "comment", "superseded socket got room traffic");
                }
                Some(Ok(_)) => continue,
                _ => break,
            }
        }
    })
    .await;
    assert!(leftover.is_ok(), "superseded socket never closed");
}

#[tokio::test]
async fn disconnect_announces_departure() {
    let hub = boot().await;
    let mut alice = connect(&hub, "alice").await;
    let mut bob = connect(&hub, "bob").await;
    join(&mut alice, "proposal:1").await;
    join(&mut bob, "proposal:1").await;
    let _ = read_until_kind(&mut alice, "user-joined").await;

    drop(bob);

    let left = read_until_kind(&mut alice, "user-left").await;
    assert_eq!(left["data"]["userId"], "bob");
    assert_eq!(left["data"]["roomId"], "proposal:1");
}

#[tokio::test]
async fn explicit_leave_announces_departure() {
    let hub = boot().await;
    let mut alice = connect(&hub, "alice").await;
    let mut bob = connect(&hub, "bob").await;
    join(&mut alice, "proposal:1").await;
    join(&mut bob, "proposal:1").await;
    let _ = read_until_kind(&mut alice, "user-joined").await;

    send(&mut bob, "leave-room", json!({"roomId": "proposal:1"})).await;

    let left = read_until_kind(&mut alice, "user-left").await;
    assert_eq!(left["data"]["userId"], "bob");

    // bob no longer receives room traffic.
    send(
        &mut alice,
        "comment",
        json!({"entityId": "1", "commentId": "c1", "body": "bye"}),
    )
    .await;
    assert!(try_read_json(&mut bob, Duration::from_millis(200)).await.is_none());
}

#[tokio::test]
async fn malformed_frames_do_not_kill_the_session() {
    let hub = boot().await;
    let mut alice = connect(&hub, "alice").await;

    alice.send(Message::text("not json")).await.unwrap();
    alice
        .send(Message::text(r#"{"kind": "mystery-kind", "data": {}}"#))
        .await
        .unwrap();
    alice
        .send(Message::text(r#"{"kind": "join-room", "data": {}}"#))
        .await
        .unwrap();

    // Session survives and still works.
    join(&mut alice, "proposal:1").await;
    send(
        &mut alice,
        "comment",
        json!({"entityId": "1", "commentId": "c1", "body": "still here"}),
    )
    .await;
    let seen = read_until_kind(&mut alice, "comment").await;
    assert_eq!(seen["data"]["commentId"], "c1");
}

#[tokio::test]
async fn quorum_reached_goes_global() {
    let hub = boot().await;
    let mut alice = connect(&hub, "alice").await;
    let mut bob = connect(&hub, "bob").await;
    join(&mut alice, "global").await;
    join(&mut bob, "global").await;
    let _ = read_until_kind(&mut alice, "user-joined").await;

    send(
        &mut bob,
        "quorum-reached",
        json!({"entityId": "42", "quorumPct": 52.1}),
    )
    .await;

    let msg = read_until_kind(&mut alice, "quorum-reached").await;
    assert_eq!(msg["entityId"], "42");
    assert_eq!(msg["data"]["quorumPct"], 52.1);
    // The announcer hears it too.
    let own = read_until_kind(&mut bob, "quorum-reached").await;
    assert_eq!(own["entityId"], "42");
}

#[tokio::test]
async fn shutdown_closes_client_sockets() {
    let hub = boot().await;
    let mut alice = connect(&hub, "alice").await;
    join(&mut alice, "global").await;

    hub.shutdown.shutdown();

    let closed = timeout(TIMEOUT, async {
        loop {
            match alice.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "socket never closed after shutdown");
}
