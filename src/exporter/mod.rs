//! Driving the external chat exporter
//!
//! The [`Exporter`] trait is the seam between the export orchestrator and the
//! process that actually talks to the chat platform. [`CliExporter`] runs
//! DiscordChatExporter's CLI as a child process; tests substitute scripted
//! fakes.

mod cli;
mod traits;

pub use cli::CliExporter;
pub use traits::{ExportRequest, ExportStatus, Exporter};
