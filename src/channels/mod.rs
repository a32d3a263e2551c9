//! Matrix chat bridge.
//!
//! The bridge runs on its own thread with a current-thread tokio runtime.
//! Inbound room messages that pass the [`AcceptancePolicy`] become inbox
//! messages; replies from the worker travel back through a [`ChatOutbox`].

pub mod matrix;
pub mod traits;

use crate::config::ChatConfig;
use crate::error::{AssistantError, Result};
use crate::input::EarlyCancel;
use crate::pipeline::inbox::InboxSender;
use crate::pipeline::messages::{AssistantMessage, AudioPayload, ChannelRef, MessageContent, preview};
use crate::pipeline::router::ChatSender;
use matrix::MatrixClient;
use std::collections::HashSet;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use traits::{ChatTransport, InboundBody, InboundEvent};

const MAX_BACKOFF_SECS: u64 = 60;

/// Why an inbound event was or was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Forward to the assistant.
    Accept,
    /// Posted in a room other than the configured one.
    OtherRoom,
    /// Sent by the assistant's own account.
    OwnMessage,
    /// Older than the bridge start.
    Backlog,
    /// Sender is not on the allow-list.
    NotAllowed,
}

/// Which inbound events reach the assistant.
///
/// Checks run in order: room, own account, age, allow-list. An empty
/// allow-list accepts nobody.
#[derive(Debug, Clone)]
pub struct AcceptancePolicy {
    room_id: String,
    own_user_id: String,
    allowed_users: HashSet<String>,
    start_ms: u64,
}

impl AcceptancePolicy {
    /// Build a policy. `start_ms` is the bridge start in epoch milliseconds.
    #[must_use]
    pub fn new(
        room_id: impl Into<String>,
        own_user_id: impl Into<String>,
        allowed_users: impl IntoIterator<Item = String>,
        start_ms: u64,
    ) -> Self {
        Self {
            room_id: room_id.into(),
            own_user_id: own_user_id.into(),
            allowed_users: allowed_users.into_iter().collect(),
            start_ms,
        }
    }

    /// Judge one event.
    #[must_use]
    pub fn check(&self, event: &InboundEvent) -> Verdict {
        if event.room_id != self.room_id {
            Verdict::OtherRoom
        } else if event.sender == self.own_user_id {
            Verdict::OwnMessage
        } else if event.origin_server_ts < self.start_ms {
            Verdict::Backlog
        } else if !self.allowed_users.contains(&event.sender) {
            Verdict::NotAllowed
        } else {
            Verdict::Accept
        }
    }
}

/// A reply waiting to be sent by the bridge.
pub struct OutgoingMessage {
    room_id: String,
    text: String,
    done: oneshot::Sender<anyhow::Result<String>>,
}

/// Worker-side handle for posting replies through the bridge.
#[derive(Debug, Clone)]
pub struct ChatOutbox {
    tx: mpsc::UnboundedSender<OutgoingMessage>,
}

impl std::fmt::Debug for OutgoingMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutgoingMessage")
            .field("room_id", &self.room_id)
            .finish_non_exhaustive()
    }
}

/// Bridge side of a [`ChatOutbox`].
pub type OutgoingQueue = mpsc::UnboundedReceiver<OutgoingMessage>;

impl ChatOutbox {
    /// Create an outbox and the queue the bridge drains.
    #[must_use]
    pub fn channel() -> (Self, OutgoingQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ChatSender for ChatOutbox {
    /// Blocks until the homeserver has accepted the message. Must not be
    /// called from inside an async runtime.
    fn send(&self, channel: &ChannelRef, text: &str) -> Result<()> {
        let (done, result) = oneshot::channel();
        self.tx
            .send(OutgoingMessage {
                room_id: channel.room_id.clone(),
                text: text.to_owned(),
                done,
            })
            .map_err(|_| AssistantError::Delivery("chat bridge is not running".to_owned()))?;
        match result.blocking_recv() {
            Ok(Ok(event_id)) => {
                tracing::debug!(room_id = %channel.room_id, %event_id, "chat reply delivered");
                Ok(())
            }
            Ok(Err(e)) => Err(AssistantError::Delivery(format!("{e:#}"))),
            Err(_) => Err(AssistantError::Delivery(
                "chat bridge stopped before delivery".to_owned(),
            )),
        }
    }
}

/// Moves events between a chat transport and the inbox.
pub struct ChatBridge<T> {
    transport: T,
    policy: AcceptancePolicy,
    room_id: String,
    inbox: InboxSender,
    early_cancel: Option<EarlyCancel>,
    max_audio_bytes: u64,
    sync_timeout_ms: u64,
}

/// The inbox is gone; the bridge has nothing left to feed.
#[derive(Debug)]
struct InboxGone;

impl<T: ChatTransport> ChatBridge<T> {
    /// Create a bridge over `transport`.
    pub fn new(
        transport: T,
        policy: AcceptancePolicy,
        config: &ChatConfig,
        inbox: InboxSender,
        early_cancel: Option<EarlyCancel>,
    ) -> Self {
        Self {
            transport,
            policy,
            room_id: config.room_id.clone(),
            inbox,
            early_cancel,
            max_audio_bytes: config.max_audio_bytes,
            sync_timeout_ms: config.sync_timeout_ms,
        }
    }

    /// Join the room, skip the backlog, then sync and send until cancelled
    /// or the inbox closes. Transport errors are logged and retried.
    pub async fn run(&self, outgoing: OutgoingQueue, cancel: CancellationToken) {
        match self.transport.join(&self.room_id).await {
            Ok(()) => tracing::info!(room_id = %self.room_id, "joined chat room"),
            Err(e) => tracing::error!(room_id = %self.room_id, "failed to join chat room: {e:#}"),
        }

        let since = match self.transport.sync(None, 0).await {
            Ok(batch) => {
                tracing::debug!(skipped = batch.events.len(), "initial sync complete");
                Some(batch.next_batch)
            }
            Err(e) => {
                tracing::error!("initial sync failed: {e:#}");
                None
            }
        };

        tokio::select! {
            () = cancel.cancelled() => tracing::info!("chat bridge stopping"),
            () = self.send_loop(outgoing) => {}
            () = self.sync_loop(since) => {}
        }
    }

    async fn send_loop(&self, mut outgoing: OutgoingQueue) {
        while let Some(message) = outgoing.recv().await {
            let result = self.transport.send_text(&message.room_id, &message.text).await;
            if let Err(e) = &result {
                tracing::error!(room_id = %message.room_id, "failed to send chat message: {e:#}");
            }
            let _ = message.done.send(result);
        }
        // Every outbox is gone; keep syncing.
        std::future::pending::<()>().await;
    }

    async fn sync_loop(&self, mut since: Option<String>) {
        let mut backoff_secs = 2u64;
        loop {
            match self.transport.sync(since.as_deref(), self.sync_timeout_ms).await {
                Ok(batch) => {
                    backoff_secs = 2;
                    since = Some(batch.next_batch);
                    for event in batch.events {
                        if self.handle_event(event).await.is_err() {
                            tracing::info!("inbox closed; chat bridge stopping");
                            return;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("chat sync failed: {e:#}; retrying in {backoff_secs}s");
                    tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                    backoff_secs = backoff_secs.saturating_mul(2).min(MAX_BACKOFF_SECS);
                }
            }
        }
    }

    /// Apply the acceptance policy to one event and enqueue it if accepted.
    async fn handle_event(&self, event: InboundEvent) -> std::result::Result<(), InboxGone> {
        let verdict = self.policy.check(&event);
        if verdict != Verdict::Accept {
            tracing::debug!(
                ?verdict,
                room_id = %event.room_id,
                sender = %event.sender,
                ts = event.origin_server_ts,
                "chat event ignored"
            );
            return Ok(());
        }

        let channel = ChannelRef {
            room_id: event.room_id.clone(),
            sender: event.sender.clone(),
            event_id: event.event_id.clone(),
        };
        let content = match event.body {
            InboundBody::Text(text) => {
                if text.trim().is_empty() {
                    return Ok(());
                }
                tracing::info!(sender = %event.sender, text = %preview(&text, 80), "chat message");
                if let Some(early) = &self.early_cancel {
                    early.inspect(&text);
                }
                MessageContent::Text(text)
            }
            InboundBody::Audio {
                file_name,
                url,
                size,
            } => match self.fetch_audio(&event.room_id, &url, size).await {
                Some(bytes) => {
                    tracing::info!(sender = %event.sender, bytes = bytes.len(), "chat voice note");
                    MessageContent::Audio(AudioPayload::encoded(bytes, file_name))
                }
                None => return Ok(()),
            },
            InboundBody::Other(msgtype) => {
                tracing::debug!(%msgtype, "unsupported chat message type ignored");
                return Ok(());
            }
        };
        self.inbox
            .send(AssistantMessage::chat(content, channel))
            .map_err(|_| InboxGone)
    }

    async fn fetch_audio(&self, room_id: &str, url: &str, size: Option<u64>) -> Option<Vec<u8>> {
        let limit_mb = self.max_audio_bytes / (1024 * 1024);
        if size.is_some_and(|size| size > self.max_audio_bytes) {
            tracing::warn!(size, "chat audio too large, rejected");
            self.notify(room_id, &format!("Audio file is too large (max. {limit_mb} MB)."))
                .await;
            return None;
        }
        match self.transport.download(url, self.max_audio_bytes).await {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            Ok(_) => {
                tracing::warn!(url, "chat audio download was empty");
                self.notify(room_id, "Could not download the audio file.").await;
                None
            }
            Err(e) => {
                tracing::error!(url, "chat audio download failed: {e:#}");
                self.notify(room_id, "Could not download the audio file.").await;
                None
            }
        }
    }

    async fn notify(&self, room_id: &str, text: &str) {
        if let Err(e) = self.transport.send_text(room_id, text).await {
            tracing::error!("failed to send chat notice: {e:#}");
        }
    }
}

/// Running bridge thread. Dropping it stops the bridge.
#[derive(Debug)]
pub struct BridgeHandle {
    cancel: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl BridgeHandle {
    /// Stop the bridge and wait for its thread.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start the Matrix bridge thread.
///
/// Messages older than the moment of this call are ignored.
///
/// # Errors
///
/// Returns [`AssistantError::Config`] when no credentials are configured and
/// [`AssistantError::Chat`] when the thread cannot be spawned.
pub fn start_bridge(
    config: ChatConfig,
    inbox: InboxSender,
    early_cancel: EarlyCancel,
) -> Result<(BridgeHandle, ChatOutbox)> {
    let credentials = config.credentials().ok_or_else(|| {
        AssistantError::Config("chat credentials missing (access token or password)".to_owned())
    })?;
    let start_ms = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default();
    let (outbox, outgoing) = ChatOutbox::channel();
    let cancel = CancellationToken::new();
    let thread_cancel = cancel.clone();

    let thread = std::thread::Builder::new()
        .name("jarvis-chat".to_owned())
        .spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build();
            let runtime = match runtime {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::error!("failed to create chat runtime: {e}");
                    return;
                }
            };
            runtime.block_on(async move {
                let Some(client) = connect_with_backoff(&config, credentials, &thread_cancel).await
                else {
                    return;
                };
                let policy = AcceptancePolicy::new(
                    config.room_id.clone(),
                    client.user_id().to_owned(),
                    config.allowed_users.clone(),
                    start_ms,
                );
                let bridge = ChatBridge::new(client, policy, &config, inbox, Some(early_cancel));
                bridge.run(outgoing, thread_cancel).await;
            });
        })
        .map_err(|e| AssistantError::Chat(format!("failed to spawn chat thread: {e}")))?;

    Ok((
        BridgeHandle {
            cancel,
            thread: Some(thread),
        },
        outbox,
    ))
}

async fn connect_with_backoff(
    config: &ChatConfig,
    credentials: crate::config::ChatCredentials,
    cancel: &CancellationToken,
) -> Option<MatrixClient> {
    let mut backoff_secs = 2u64;
    loop {
        let attempt = tokio::select! {
            () = cancel.cancelled() => return None,
            result = MatrixClient::connect(config, credentials.clone()) => result,
        };
        match attempt {
            Ok(client) => return Some(client),
            Err(e) => {
                tracing::warn!("chat login failed: {e:#}; retrying in {backoff_secs}s");
                tokio::select! {
                    () = cancel.cancelled() => return None,
                    () = tokio::time::sleep(Duration::from_secs(backoff_secs)) => {}
                }
                backoff_secs = backoff_secs.saturating_mul(2).min(MAX_BACKOFF_SECS);
            }
        }
    }
}
