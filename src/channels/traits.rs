use async_trait::async_trait;

/// A room message received from the chat service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    /// Room the event was posted in.
    pub room_id: String,
    /// Server-assigned event ID.
    pub event_id: String,
    /// Sender user ID.
    pub sender: String,
    /// Server timestamp in milliseconds since the epoch.
    pub origin_server_ts: u64,
    /// Parsed message body.
    pub body: InboundBody,
}

/// Message payloads the bridge understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundBody {
    /// Plain text.
    Text(String),
    /// Voice note or audio file stored on the media repository.
    Audio {
        /// File name hint (format detection).
        file_name: String,
        /// `mxc://` URI.
        url: String,
        /// Declared size in bytes, if the sender provided one.
        size: Option<u64>,
    },
    /// Anything else; carries the message type for logs.
    Other(String),
}

/// One `/sync` result.
#[derive(Debug, Clone, Default)]
pub struct SyncBatch {
    /// Token for the next sync.
    pub next_batch: String,
    /// Room messages in server timestamp order.
    pub events: Vec<InboundEvent>,
}

/// Chat service operations used by the bridge.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Join `room_id`. Joining a room twice is not an error.
    async fn join(&self, room_id: &str) -> anyhow::Result<()>;

    /// Fetch events after `since`, waiting up to `timeout_ms` for new ones.
    async fn sync(&self, since: Option<&str>, timeout_ms: u64) -> anyhow::Result<SyncBatch>;

    /// Post a text message; returns the new event ID.
    async fn send_text(&self, room_id: &str, text: &str) -> anyhow::Result<String>;

    /// Download a media file, failing if it exceeds `max_bytes`.
    async fn download(&self, mxc_url: &str, max_bytes: u64) -> anyhow::Result<Vec<u8>>;
}
