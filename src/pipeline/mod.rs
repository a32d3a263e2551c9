//! Message ingestion and the sequential worker.
//!
//! Producers push [`messages::AssistantMessage`]s into the [`inbox`]; one
//! [`worker::Worker`] drains it in order and hands replies to the
//! [`router::Router`].

pub mod inbox;
pub mod messages;
pub mod router;
pub mod thinking;
pub mod worker;

pub use inbox::{Inbox, InboxSender, ShutdownListener, ShutdownTrigger};
pub use messages::{AssistantMessage, ChannelRef, MessageSource};
pub use router::Router;
pub use worker::{Worker, WorkerExit};
