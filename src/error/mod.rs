//! Error types for murmur.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

/// Primary error type for all session operations.
#[derive(Error, Debug)]
pub enum MurmurError {
    #[error("Credential request failed (status {status}): {body}")]
    Credential { status: u16, body: String },

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Realtime control channel not open")]
    ChannelNotReady,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Upstream error: {0}")]
    Upstream(serde_json::Value),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Session disconnected")]
    Disconnected,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl MurmurError {
    /// Create a credential error from an upstream status and body.
    pub fn credential(status: u16, body: impl Into<String>) -> Self {
        Self::Credential {
            status,
            body: body.into(),
        }
    }

    /// Create a tool execution error.
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Credential { .. } => ErrorCategory::Credential,
            Self::Handshake(_) => ErrorCategory::Handshake,
            Self::ChannelNotReady => ErrorCategory::ChannelNotReady,
            Self::Transport(_) => ErrorCategory::Network,
            Self::Playback(_) => ErrorCategory::Playback,
            Self::Protocol(_) => ErrorCategory::Protocol,
            Self::Upstream(_) => ErrorCategory::Upstream,
            Self::ToolExecution { .. } => ErrorCategory::ToolExecution,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Disconnected | Self::InvalidState(_) => ErrorCategory::Lifecycle,
            Self::Configuration(_) | Self::InvalidArgument(_) | Self::Toml(_) => {
                ErrorCategory::Configuration
            }
            Self::Network(_) | Self::Io(_) => ErrorCategory::Network,
            Self::Serialization(_) => ErrorCategory::Serialization,
        }
    }

    /// Whether a send may be attempted again after this error.
    ///
    /// Only channel readiness and timeouts are transient; credential and
    /// handshake failures are fatal to the attempt that produced them.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::ChannelNotReady | ErrorCategory::Timeout
        )
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Credential => RecoverySuggestion::CheckCredentials,
            ErrorCategory::Handshake | ErrorCategory::Network => RecoverySuggestion::Reconnect,
            ErrorCategory::ChannelNotReady => RecoverySuggestion::RetrySend,
            ErrorCategory::Timeout => RecoverySuggestion::IncreaseTimeout,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::ToolExecution => RecoverySuggestion::CheckToolImplementation,
            ErrorCategory::Lifecycle => RecoverySuggestion::Reconnect,
            ErrorCategory::Protocol
            | ErrorCategory::Upstream
            | ErrorCategory::Serialization
            | ErrorCategory::Playback => RecoverySuggestion::Ignore,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, MurmurError>;
