//! Host-provided peer connection and media capture capabilities.
//!
//! The transport drives these traits through one offer/answer handshake per
//! connection. Implementations report asynchronous activity (channel
//! readiness, inbound messages, remote tracks) as [`PeerEvent`]s on the sender
//! handed to [`PeerFactory::create`], in the order it happened.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::MurmurError;

/// Label of the ordered JSON control channel.
pub const CONTROL_CHANNEL_LABEL: &str = "oai-events";

/// Media-level connection state reported by the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Activity reported by a peer connection.
pub enum PeerEvent {
    ConnectionState(PeerConnectionState),
    ChannelOpen,
    ChannelClosed,
    ChannelMessage(String),
    ChannelError(String),
    /// A remote media track arrived (assistant speech).
    RemoteTrack(Arc<dyn MediaTrack>),
}

impl fmt::Debug for PeerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionState(state) => f.debug_tuple("ConnectionState").field(state).finish(),
            Self::ChannelOpen => f.write_str("ChannelOpen"),
            Self::ChannelClosed => f.write_str("ChannelClosed"),
            Self::ChannelMessage(text) => f.debug_tuple("ChannelMessage").field(text).finish(),
            Self::ChannelError(text) => f.debug_tuple("ChannelError").field(text).finish(),
            Self::RemoteTrack(track) => f.debug_tuple("RemoteTrack").field(&track.id()).finish(),
        }
    }
}

/// A local or remote audio track.
pub trait MediaTrack: Send + Sync {
    fn id(&self) -> &str;

    /// Stop the track and release the underlying device. Idempotent.
    fn stop(&self);

    fn is_live(&self) -> bool;
}

/// Microphone acquisition.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn open_microphone(&self) -> Result<Arc<dyn MediaTrack>, MurmurError>;
}

/// One peer-to-peer media + data connection.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Attach a local track as an outbound media source.
    fn add_local_track(&self, track: Arc<dyn MediaTrack>) -> Result<(), MurmurError>;

    /// Request one receive-only audio transceiver.
    fn add_receive_only_audio(&self) -> Result<(), MurmurError>;

    /// Create the ordered, reliable control channel.
    fn create_control_channel(&self, label: &str) -> Result<(), MurmurError>;

    /// Create the local offer and apply it; returns the offer SDP.
    async fn create_offer(&self) -> Result<String, MurmurError>;

    async fn apply_answer(&self, sdp: &str) -> Result<(), MurmurError>;

    /// Send one text frame on the control channel.
    fn send(&self, payload: &str) -> Result<(), MurmurError>;

    fn close_control_channel(&self);

    /// Close the connection. Idempotent.
    fn close(&self);
}

/// Creates fresh peer connections, one per connect attempt.
pub trait PeerFactory: Send + Sync {
    fn create(
        &self,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerConnection>, MurmurError>;
}
