//! External agent client.
//!
//! Every user turn runs the agent CLI once as a child process. [`session`]
//! tracks conversation continuity between those calls; [`process`] runs one
//! child with a timeout and lets another thread kill it.

pub mod process;
pub mod session;

pub use session::{AgentClient, AgentSession, CancelHandle, Continuity, SessionState};
