//! Output playback capability.
//!
//! Starting playback may be refused by host policy (for example browser
//! autoplay rules). That outcome is reported as [`PlaybackOutcome::Blocked`]
//! and never as a transport error; how the host unblocks it (a user gesture,
//! a permission prompt) is up to the implementation.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::peer::MediaTrack;

/// Result of asking the sink to start playing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Started,
    Blocked { reason: String },
    Failed { reason: String },
}

/// Playback lifecycle reported by the sink itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    Playing,
    Paused,
    Ended,
}

/// A playback element bound to one inbound stream.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    fn attach(&self, track: Arc<dyn MediaTrack>);

    async fn play(&self) -> PlaybackOutcome;

    fn pause(&self);

    /// Stop playback and drop the attached stream.
    fn detach(&self);
}

/// Creates the playback element on first inbound media.
pub trait AudioOutputFactory: Send + Sync {
    fn create(&self, events: mpsc::UnboundedSender<PlaybackEvent>) -> Arc<dyn AudioOutput>;
}
