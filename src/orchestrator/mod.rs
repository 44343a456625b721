//! Lifecycle owner and event wiring.
//!
//! # Subscriptions
//!
//! | Event | Reaction |
//! |-------|----------|
//! | `hotword_detected` | schedule `start_chat`: open the interaction surface |
//! | `recorder_callback` (text) | schedule `human_to_ai`: show the utterance, generate and show a reply |
//! | `recorder_callback` (empty) | schedule `close_interaction` |
//! | `recorder_callback` (cancelled) | log a warning |
//! | `timeout` | schedule `close_interaction` |
//! | `loading_message` | forward to the render surface |
//! | `interaction_finished` | re-arm the listening engine |
//!
//! # Shutdown order
//!
//! request server → listening engine → render surface → scheduler.

pub mod console;
pub mod runtime;
pub mod server;

pub use console::ConsoleSurface;
pub use runtime::{Components, Orchestrator};
pub use server::ChildProcessServer;

use crate::bridge::BridgeEndpoint;

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// The interaction surface the user sees.
///
/// Every method except [`RenderSurface::run`] must return promptly; they are
/// called from scheduled tasks and from the capture thread.
pub trait RenderSurface: Send + Sync {
    fn open_interaction(&self) -> anyhow::Result<()>;

    /// Dismiss the current interaction.  Implementations publish
    /// `interaction_finished` once the surface is ready for the next one.
    fn close_interaction(&self) -> anyhow::Result<()>;

    fn set_loading_message(&self, message: &str) -> anyhow::Result<()>;

    fn set_human_message(&self, text: &str) -> anyhow::Result<()>;

    /// Show the assistant's reply.  Finishing the interaction afterwards is
    /// up to the surface.
    fn set_response(&self, text: &str) -> anyhow::Result<()>;

    fn reload_module(&self, module: &str) -> anyhow::Result<()>;

    /// Block the calling thread until [`RenderSurface::stop`] is called.
    fn run(&self) -> anyhow::Result<()>;

    fn stop(&self);
}

/// The separate process that serves inbound requests.
pub trait RequestServer: Send + Sync {
    /// Launch the server and return the main-process end of its channel.
    fn start(&self) -> anyhow::Result<BridgeEndpoint>;

    fn stop(&self);
}
