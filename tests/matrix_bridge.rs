//! Matrix client and bridge against a mocked homeserver.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use jarvis::channels::matrix::MatrixClient;
use jarvis::channels::traits::{ChatTransport, InboundBody};
use jarvis::channels::{AcceptancePolicy, ChatBridge, ChatOutbox};
use jarvis::config::{ChatConfig, ChatCredentials};
use jarvis::pipeline::inbox;
use jarvis::pipeline::messages::{ChannelRef, MessageSource};
use jarvis::pipeline::router::ChatSender;
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ROOM: &str = "!room:example.org";
const ME: &str = "@jarvis:example.org";
const ALICE: &str = "@alice:example.org";

fn config(server: &MockServer) -> ChatConfig {
    ChatConfig {
        enabled: true,
        homeserver: server.uri(),
        user_id: ME.to_owned(),
        room_id: ROOM.to_owned(),
        allowed_users: vec![ALICE.to_owned()],
        sync_timeout_ms: 100,
        ..ChatConfig::default()
    }
}

async fn token_client(server: &MockServer) -> MatrixClient {
    MatrixClient::connect(&config(server), ChatCredentials::AccessToken("tok".to_owned()))
        .await
        .unwrap()
}

fn text_event(id: &str, sender: &str, ts: u64, body: &str) -> serde_json::Value {
    json!({
        "type": "m.room.message",
        "event_id": id,
        "sender": sender,
        "origin_server_ts": ts,
        "content": { "msgtype": "m.text", "body": body }
    })
}

fn sync_body(next_batch: &str, events: Vec<serde_json::Value>) -> serde_json::Value {
    json!({
        "next_batch": next_batch,
        "rooms": { "join": { ROOM: { "timeline": { "events": events } } } }
    })
}

#[tokio::test]
async fn password_login_uses_returned_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_matrix/client/v3/login"))
        .and(body_partial_json(json!({
            "type": "m.login.password",
            "identifier": { "type": "m.id.user", "user": ME },
            "password": "hunter2"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh-token",
            "user_id": ME,
            "device_id": "DEV"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/_matrix/client/v3/join/"))
        .and(header("authorization", "Bearer fresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "room_id": ROOM })))
        .expect(1)
        .mount(&server)
        .await;

    let client =
        MatrixClient::connect(&config(&server), ChatCredentials::Password("hunter2".to_owned()))
            .await
            .unwrap();
    assert_eq!(client.user_id(), ME);
    client.join(ROOM).await.unwrap();
}

#[tokio::test]
async fn failed_login_reports_errcode() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_matrix/client/v3/login"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "errcode": "M_FORBIDDEN",
            "error": "Invalid password"
        })))
        .mount(&server)
        .await;

    let err = MatrixClient::connect(&config(&server), ChatCredentials::Password("x".to_owned()))
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("M_FORBIDDEN"));
}

#[tokio::test]
async fn sync_keeps_room_messages_in_timestamp_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/_matrix/client/v3/sync"))
        .and(query_param("since", "s1"))
        .and(query_param("timeout", "5000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sync_body(
            "s2",
            vec![
                text_event("$b", ALICE, 20, "second"),
                json!({
                    "type": "m.room.member",
                    "event_id": "$m",
                    "sender": ALICE,
                    "origin_server_ts": 15,
                    "content": { "membership": "join" }
                }),
                text_event("$a", ALICE, 10, "first"),
                json!({
                    "type": "m.room.message",
                    "event_id": "$v",
                    "sender": ALICE,
                    "origin_server_ts": 30,
                    "content": {
                        "msgtype": "m.audio",
                        "body": "note.ogg",
                        "url": "mxc://example.org/abc",
                        "info": { "size": 1234 }
                    }
                }),
            ],
        )))
        .mount(&server)
        .await;

    let client = token_client(&server).await;
    let batch = client.sync(Some("s1"), 5_000).await.unwrap();
    assert_eq!(batch.next_batch, "s2");
    let ids: Vec<&str> = batch.events.iter().map(|e| e.event_id.as_str()).collect();
    assert_eq!(ids, vec!["$a", "$b", "$v"]);
    assert_eq!(batch.events[0].body, InboundBody::Text("first".to_owned()));
    assert_eq!(
        batch.events[2].body,
        InboundBody::Audio {
            file_name: "note.ogg".to_owned(),
            url: "mxc://example.org/abc".to_owned(),
            size: Some(1234),
        }
    );
}

#[tokio::test]
async fn send_text_posts_m_text_with_transaction_id() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path_regex(
            r"^/_matrix/client/v3/rooms/[^/]+/send/m\.room\.message/[0-9a-f]{32}$",
        ))
        .and(header("authorization", "Bearer tok"))
        .and(body_partial_json(json!({ "msgtype": "m.text", "body": "Hallo!" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "event_id": "$sent" })))
        .expect(2)
        .mount(&server)
        .await;

    let client = token_client(&server).await;
    assert_eq!(client.send_text(ROOM, "Hallo!").await.unwrap(), "$sent");
    assert_eq!(client.send_text(ROOM, "Hallo!").await.unwrap(), "$sent");
}

#[tokio::test]
async fn download_falls_back_to_legacy_media_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/_matrix/client/v1/media/download/example.org/abc"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/_matrix/media/v3/download/example.org/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 16]))
        .expect(1)
        .mount(&server)
        .await;

    let client = token_client(&server).await;
    let bytes = client.download("mxc://example.org/abc", 1024).await.unwrap();
    assert_eq!(bytes, vec![7u8; 16]);
}

#[tokio::test]
async fn download_rejects_oversized_media() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/_matrix/client/v1/media/download/example.org/big"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 64]))
        .mount(&server)
        .await;

    let client = token_client(&server).await;
    assert!(client.download("mxc://example.org/big", 32).await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn bridge_forwards_allowed_messages_and_delivers_replies() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/_matrix/client/v3/join/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "room_id": ROOM })))
        .mount(&server)
        .await;
    // Initial sync: backlog that must never reach the inbox.
    Mock::given(method("GET"))
        .and(path("/_matrix/client/v3/sync"))
        .and(query_param("timeout", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sync_body(
            "s0",
            vec![text_event("$old", ALICE, 5_000, "old backlog")],
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/_matrix/client/v3/sync"))
        .and(query_param("since", "s0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sync_body(
            "s1",
            vec![
                text_event("$stale", ALICE, 500, "before start"),
                text_event("$self", ME, 2_000, "my own reply"),
                text_event("$stranger", "@mallory:example.org", 2_001, "hi"),
                text_event("$live", ALICE, 2_002, "Wie spät ist es?"),
            ],
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/_matrix/client/v3/sync"))
        .and(query_param("since", "s1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(sync_body("s1", Vec::new()))
                .set_delay(Duration::from_millis(100)),
        )
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/_matrix/client/v3/rooms/[^/]+/send/m\.room\.message/"))
        .and(body_partial_json(json!({ "body": "Es ist zwölf." })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "event_id": "$reply" })))
        .expect(1)
        .mount(&server)
        .await;

    let config = config(&server);
    let client = token_client(&server).await;
    let (tx, inbox) = inbox::channel();
    let policy = AcceptancePolicy::new(ROOM, ME, config.allowed_users.clone(), 1_000);
    let bridge = ChatBridge::new(client, policy, &config, tx, None);
    let (outbox, outgoing) = ChatOutbox::channel();
    let cancel = CancellationToken::new();
    let task = tokio::spawn({
        let cancel = cancel.clone();
        async move { bridge.run(outgoing, cancel).await }
    });

    let (message, inbox) = tokio::time::timeout(
        Duration::from_secs(10),
        tokio::task::spawn_blocking(move || (inbox.recv(), inbox)),
    )
    .await
    .unwrap()
    .unwrap();
    let message = message.unwrap();
    assert_eq!(message.source(), MessageSource::Chat);
    assert_eq!(message.text(), Some("Wie spät ist es?"));
    let channel: ChannelRef = message.channel_ref().cloned().unwrap();
    assert_eq!(channel.room_id, ROOM);
    assert_eq!(channel.sender, ALICE);
    assert_eq!(channel.event_id, "$live");
    assert_eq!(inbox.pending(), 0);

    tokio::task::spawn_blocking(move || outbox.send(&channel, "Es ist zwölf."))
        .await
        .unwrap()
        .unwrap();

    cancel.cancel();
    task.await.unwrap();
}
