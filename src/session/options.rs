//! Session options, per-turn overrides and observable state.

use std::collections::HashMap;

use bon::Builder;
use serde::Serialize;
use strum::Display;

use crate::config::{MurmurConfig, DEFAULT_MODEL, DEFAULT_VOICE};
use crate::tools::RealtimeToolSchema;
use crate::transport::{ChannelReadiness, TransportState};

/// Controller lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    Ready,
    /// A turn request was dispatched and its terminal event has not arrived.
    Sending,
    Disconnected,
    Failed,
}

impl SessionState {
    /// Whether a transport is expected to exist in this state.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Ready | Self::Sending)
    }
}

/// Snapshot handed to the state-change hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub transport: TransportState,
    pub channel: ChannelReadiness,
    pub speaking: bool,
}

impl SessionStatus {
    pub fn connected(&self) -> bool {
        self.channel == ChannelReadiness::Open
    }
}

pub fn default_modalities() -> Vec<String> {
    vec!["text".to_string(), "audio".to_string()]
}

/// Per-connection settings. Voice and microphone are fixed for the life of
/// a transport; model applies from the next connection; instructions travel
/// with every turn.
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct SessionOptions {
    #[builder(into, default = DEFAULT_MODEL.to_string())]
    pub model: String,
    #[builder(into, default = DEFAULT_VOICE.to_string())]
    pub voice: String,
    #[builder(into)]
    pub instructions: Option<String>,
    #[builder(default)]
    pub microphone: bool,
    /// Advertise registered tool schemas with each turn.
    #[builder(default = true)]
    pub advertise_tools: bool,
    /// Speech-to-text model for the user's microphone input.
    #[builder(into)]
    pub input_transcription: Option<String>,
    #[builder(default = default_modalities())]
    pub modalities: Vec<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl SessionOptions {
    pub fn from_config(config: &MurmurConfig) -> Self {
        Self::builder()
            .model(config.model.clone())
            .voice(config.voice.clone())
            .build()
    }
}

/// Overrides for a single turn.
#[derive(Debug, Clone, Default, PartialEq, Builder)]
pub struct TurnOptions {
    #[builder(into)]
    pub instructions: Option<String>,
    pub modalities: Option<Vec<String>>,
    pub tools: Option<Vec<RealtimeToolSchema>>,
    #[builder(default)]
    pub metadata: HashMap<String, String>,
}

/// How a turn ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Final assistant text of the last response in the turn.
    pub text: String,
    pub tool_round_trips: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_config_defaults() {
        let options = SessionOptions::default();
        assert_eq!(options, SessionOptions::from_config(&MurmurConfig::default()));
        assert_eq!(options.modalities, vec!["text", "audio"]);
        assert!(!options.microphone);
        assert!(options.advertise_tools);
    }

    #[test]
    fn state_names_are_snake_case() {
        assert_eq!(SessionState::Sending.to_string(), "sending");
        assert!(SessionState::Connecting.is_active());
        assert!(!SessionState::Failed.is_active());
    }
}
