//! Transport session: one peer connection carrying audio and a control channel.

pub mod peer;
pub mod playback;
pub mod session;
pub mod signaling;

pub use peer::{
    MediaDevices, MediaTrack, PeerConnection, PeerConnectionState, PeerEvent, PeerFactory,
    CONTROL_CHANNEL_LABEL,
};
pub use playback::{AudioOutput, AudioOutputFactory, PlaybackEvent, PlaybackOutcome};
pub use session::{MediaBackend, TransportEvent, TransportSession};
pub use signaling::{HttpSdpExchange, SdpExchange};

use serde::Serialize;
use strum::Display;

/// Media-layer lifecycle of one transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransportState {
    Disconnected,
    Negotiating,
    Connected,
    Failed,
}

/// Readiness of the control channel, tracked apart from [`TransportState`].
///
/// A transport can be `Connected` while its channel is still `Connecting`;
/// senders must wait for `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChannelReadiness {
    Connecting,
    Open,
    Closed,
}
