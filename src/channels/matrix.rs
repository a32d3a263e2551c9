//! Minimal Matrix client-server API client (unencrypted rooms).
//!
//! Covers what the bridge needs: password or token auth, joining a room,
//! long-poll `/sync`, sending `m.room.message` text, and downloading media.

use super::traits::{ChatTransport, InboundBody, InboundEvent, SyncBatch};
use crate::config::{ChatConfig, ChatCredentials};
use anyhow::{Context, bail};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::Duration;

const CLIENT_API: &str = "/_matrix/client/v3";

/// Authenticated Matrix client.
#[derive(Debug, Clone)]
pub struct MatrixClient {
    http: reqwest::Client,
    homeserver: String,
    access_token: String,
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
    user_id: String,
    #[serde(default)]
    device_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    event_id: String,
}

#[derive(Debug, Deserialize)]
struct SyncResponse {
    next_batch: String,
    #[serde(default)]
    rooms: SyncRooms,
}

#[derive(Debug, Default, Deserialize)]
struct SyncRooms {
    #[serde(default)]
    join: HashMap<String, JoinedRoom>,
}

#[derive(Debug, Default, Deserialize)]
struct JoinedRoom {
    #[serde(default)]
    timeline: Timeline,
}

#[derive(Debug, Default, Deserialize)]
struct Timeline {
    #[serde(default)]
    events: Vec<RawEvent>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    event_id: String,
    #[serde(default)]
    sender: String,
    #[serde(default)]
    origin_server_ts: u64,
    #[serde(default)]
    content: Value,
}

impl MatrixClient {
    /// Authenticate against the homeserver.
    ///
    /// With a token no request is made; with a password the login API is
    /// called and the returned token is used from then on.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or login fails.
    pub async fn connect(config: &ChatConfig, credentials: ChatCredentials) -> anyhow::Result<Self> {
        // Long-poll syncs must outlive their server-side timeout.
        let request_timeout = Duration::from_millis(config.sync_timeout_ms) + Duration::from_secs(30);
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("failed to build Matrix HTTP client")?;
        let homeserver = config.homeserver.trim_end_matches('/').to_owned();

        match credentials {
            ChatCredentials::AccessToken(token) => {
                tracing::debug!(user_id = %config.user_id, "authenticating with access token");
                Ok(Self {
                    http,
                    homeserver,
                    access_token: token,
                    user_id: config.user_id.clone(),
                })
            }
            ChatCredentials::Password(password) => {
                let body = json!({
                    "type": "m.login.password",
                    "identifier": { "type": "m.id.user", "user": config.user_id },
                    "password": password,
                    "initial_device_display_name": config.device_name,
                });
                let response = http
                    .post(format!("{homeserver}{CLIENT_API}/login"))
                    .json(&body)
                    .send()
                    .await
                    .context("Matrix login request failed")?;
                let login: LoginResponse = parse(response, "login").await?;
                tracing::info!(
                    user_id = %login.user_id,
                    device_id = login.device_id.as_deref().unwrap_or("-"),
                    "logged in to Matrix"
                );
                Ok(Self {
                    http,
                    homeserver,
                    access_token: login.access_token,
                    user_id: login.user_id,
                })
            }
        }
    }

    /// The authenticated user ID.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}{CLIENT_API}{path}", self.homeserver)
    }

    async fn fetch_media(&self, url: String, max_bytes: u64) -> anyhow::Result<Option<Vec<u8>>> {
        let mut response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .context("media download request failed")?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            bail!("media download returned {status}");
        }
        if response.content_length().is_some_and(|len| len > max_bytes) {
            bail!("media exceeds {max_bytes} bytes");
        }
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.context("media download interrupted")? {
            body.extend_from_slice(&chunk);
            if body.len() as u64 > max_bytes {
                bail!("media exceeds {max_bytes} bytes");
            }
        }
        Ok(Some(body))
    }
}

#[async_trait]
impl ChatTransport for MatrixClient {
    async fn join(&self, room_id: &str) -> anyhow::Result<()> {
        let response = self
            .http
            .post(self.url(&format!("/join/{}", urlencoding::encode(room_id))))
            .bearer_auth(&self.access_token)
            .json(&json!({}))
            .send()
            .await
            .context("join request failed")?;
        let _: Value = parse(response, "join").await?;
        Ok(())
    }

    async fn sync(&self, since: Option<&str>, timeout_ms: u64) -> anyhow::Result<SyncBatch> {
        let mut query = vec![("timeout", timeout_ms.to_string())];
        if let Some(token) = since {
            query.push(("since", token.to_owned()));
        }
        let response = self
            .http
            .get(self.url("/sync"))
            .bearer_auth(&self.access_token)
            .query(&query)
            .send()
            .await
            .context("sync request failed")?;
        let sync: SyncResponse = parse(response, "sync").await?;

        let mut events = Vec::new();
        for (room_id, room) in sync.rooms.join {
            for raw in room.timeline.events {
                if raw.kind != "m.room.message" {
                    continue;
                }
                events.push(InboundEvent {
                    room_id: room_id.clone(),
                    event_id: raw.event_id,
                    sender: raw.sender,
                    origin_server_ts: raw.origin_server_ts,
                    body: parse_body(&raw.content),
                });
            }
        }
        events.sort_by_key(|e| e.origin_server_ts);
        Ok(SyncBatch {
            next_batch: sync.next_batch,
            events,
        })
    }

    async fn send_text(&self, room_id: &str, text: &str) -> anyhow::Result<String> {
        let txn_id = uuid::Uuid::new_v4().simple().to_string();
        let path = format!(
            "/rooms/{}/send/m.room.message/{txn_id}",
            urlencoding::encode(room_id)
        );
        let response = self
            .http
            .put(self.url(&path))
            .bearer_auth(&self.access_token)
            .json(&json!({ "msgtype": "m.text", "body": text }))
            .send()
            .await
            .context("send request failed")?;
        let sent: SendResponse = parse(response, "send").await?;
        Ok(sent.event_id)
    }

    async fn download(&self, mxc_url: &str, max_bytes: u64) -> anyhow::Result<Vec<u8>> {
        let (server, media_id) = parse_mxc(mxc_url)?;
        let authenticated = format!(
            "{}/_matrix/client/v1/media/download/{server}/{media_id}",
            self.homeserver
        );
        if let Some(body) = self.fetch_media(authenticated, max_bytes).await? {
            return Ok(body);
        }
        // Homeservers without authenticated media only serve the legacy path.
        let legacy = format!(
            "{}/_matrix/media/v3/download/{server}/{media_id}",
            self.homeserver
        );
        self.fetch_media(legacy, max_bytes)
            .await?
            .with_context(|| format!("media {mxc_url} not found"))
    }
}

async fn parse<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    what: &str,
) -> anyhow::Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body: Value = response.json().await.unwrap_or(Value::Null);
        let errcode = body["errcode"].as_str().unwrap_or("unknown");
        let message = body["error"].as_str().unwrap_or("");
        bail!("Matrix {what} failed with {status}: {errcode} {message}");
    }
    response
        .json()
        .await
        .with_context(|| format!("invalid Matrix {what} response"))
}

fn parse_body(content: &Value) -> InboundBody {
    let msgtype = content["msgtype"].as_str().unwrap_or_default();
    let body = content["body"].as_str().unwrap_or_default().to_owned();
    match msgtype {
        "m.text" => InboundBody::Text(body),
        "m.audio" => InboundBody::Audio {
            file_name: if body.trim().is_empty() {
                "audio.ogg".to_owned()
            } else {
                body
            },
            url: content["url"].as_str().unwrap_or_default().to_owned(),
            size: content["info"]["size"].as_u64(),
        },
        other => InboundBody::Other(other.to_owned()),
    }
}

/// Split `mxc://server/media_id`.
///
/// # Errors
///
/// Returns an error for anything that is not a well-formed MXC URI.
pub fn parse_mxc(uri: &str) -> anyhow::Result<(&str, &str)> {
    let rest = uri
        .strip_prefix("mxc://")
        .with_context(|| format!("not an mxc URI: {uri}"))?;
    match rest.split_once('/') {
        Some((server, media)) if !server.is_empty() && !media.is_empty() && !media.contains('/') => {
            Ok((server, media))
        }
        _ => bail!("malformed mxc URI: {uri}"),
    }
}
