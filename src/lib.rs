//! Jarvis: voice and chat front-end for a command-line AI agent.
//!
//! Every input source feeds one queue that a single worker drains:
//! Microphone / Keyboard / Matrix → Inbox → Worker → Agent → Router
//!
//! # Architecture
//!
//! - **Input**: keyboard lines, wake-word captures from an external helper,
//!   and Matrix room messages each run on their own thread
//! - **Inbox**: unbounded FIFO shared by all producers
//! - **Worker**: transcribes audio, intercepts control commands, and calls
//!   the agent one message at a time
//! - **Agent**: external CLI process with per-process conversation memory
//! - **Router**: replies go to the terminal and back to where the message
//!   came from (speech, nothing, or the chat room)

pub mod agent;
pub mod audio;
pub mod channels;
pub mod command;
pub mod config;
pub mod error;
pub mod input;
pub mod logging;
pub mod pipeline;
pub mod restart;
pub mod stt;
pub mod tts;
pub mod ui;

pub use agent::{AgentClient, AgentSession, CancelHandle};
pub use command::{CommandKeywords, ControlIntent};
pub use config::AssistantConfig;
pub use error::{AgentError, AssistantError, Result};
pub use pipeline::{AssistantMessage, MessageSource, Router, Worker, WorkerExit};
