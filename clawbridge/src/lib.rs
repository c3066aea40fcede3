pub mod attachments;
pub mod bridge;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod editor;
pub mod loader;
pub mod log_buffer;
pub mod policy;
pub mod process;
pub mod workspace;

// Re-exports
pub use attachments::AttachedFileSet;
pub use bridge::Bridge;
pub use config::{
    ConfigError, ConfigOverrides, ConfigSource, FileConfigSource, GatewayConfig, StaticConfigSource,
};
pub use context::{ContextAssembler, ContextSources};
pub use dispatch::{DispatchOutcome, GatewayError, PromptDispatcher, extract_output_text};
pub use editor::{ActiveEditor, WorkspaceState};
pub use log_buffer::{LogBuffer, SharedLogBuffer};
pub use policy::TruncationPolicy;
pub use process::{ProcessController, ProcessError, ProcessState};

/// A message exchanged between the core and its display surface.
///
/// Serialized as `{"type":"send","text":...}` (surface to core) and
/// `{"type":"log","text":...}` (core to surface).
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum UiMessage {
    Send { text: String },
    Log { text: String },
}

impl UiMessage {
    pub fn log(text: impl Into<String>) -> Self {
        UiMessage::Log { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            UiMessage::Send { text } | UiMessage::Log { text } => text,
        }
    }
}

/// Sender half of the append-only display surface.
pub type DisplaySender = tokio::sync::mpsc::UnboundedSender<UiMessage>;

/// Post a line to the display surface. A closed surface is not an error.
pub(crate) fn post(display: &DisplaySender, text: impl Into<String>) {
    let _ = display.send(UiMessage::log(text));
}
