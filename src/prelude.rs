//! Convenience re-exports for common use.

pub use crate::config::MurmurConfig;
pub use crate::credential::{CredentialBroker, HttpCredentialBroker, SessionCredential};
pub use crate::error::{MurmurError, Result};
pub use crate::events::{CompletedToolCall, SessionEvent};
pub use crate::ingest::{IngestionConfig, IngestionScheduler, NoteSnapshot, NoteSource};
pub use crate::session::{
    SessionController, SessionHooks, SessionOptions, SessionState, SessionStatus, TurnOptions,
    TurnOutcome,
};
#[cfg(feature = "image-tool")]
pub use crate::tools::{GeneratedImage, ImageGenerationTool};
pub use crate::tools::{Tool, ToolArguments, ToolExecutor, ToolOutcome, ToolParameters};
pub use crate::transport::{HttpSdpExchange, MediaBackend, TransportState};
