//! Cross-process command channel to the request server.
//!
//! ```text
//! request server ──stdout──▶ BridgeEndpoint (pump thread, line framing)
//!                                  │ try_recv (non-blocking)
//!                                  ▼
//!                 ProcessBridge drain task ── reschedules itself ──▶ TaskScheduler
//!                                  │ Command / ServerExited
//!                                  ▼
//!                            CommandHandler
//! ```

pub mod drain;
pub mod endpoint;
pub mod message;

pub use drain::{CommandHandler, DrainOutcome, ProcessBridge, DRAIN_TASK};
pub use endpoint::{BridgeEndpoint, MAX_LINE};
pub use message::{BridgeError, BridgeMessage, Command, MAX_MODULE_NAME};
