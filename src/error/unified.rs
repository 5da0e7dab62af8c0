//! Error classification and recovery hints.

use serde::{Deserialize, Serialize};

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The credential broker was unreachable or refused the request.
    Credential,
    /// The SDP offer/answer exchange failed.
    Handshake,
    /// The control channel was not open when a send was attempted.
    ChannelNotReady,
    /// The remote side broke the wire contract.
    Protocol,
    /// An in-band error event reported by the remote model.
    Upstream,
    ToolExecution,
    /// Local audio output failed for a reason other than autoplay policy.
    Playback,
    Timeout,
    /// The session was torn down or used out of order.
    Lifecycle,
    Configuration,
    Network,
    Serialization,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    RetrySend,
    Reconnect,
    CheckCredentials,
    CheckConfiguration,
    IncreaseTimeout,
    CheckToolImplementation,
    Ignore,
}
