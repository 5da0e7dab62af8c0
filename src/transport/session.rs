//! One realtime connection: handshake, control channel, inbound audio.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::peer::{
    MediaDevices, MediaTrack, PeerConnection, PeerConnectionState, PeerEvent, PeerFactory,
    CONTROL_CHANNEL_LABEL,
};
use super::playback::{AudioOutput, AudioOutputFactory, PlaybackEvent, PlaybackOutcome};
use super::signaling::SdpExchange;
use super::{ChannelReadiness, TransportState};
use crate::credential::SessionCredential;
use crate::error::MurmurError;
use crate::util::timeout::with_timeout;

/// Host capabilities a transport is built from.
#[derive(Clone)]
pub struct MediaBackend {
    pub peers: Arc<dyn PeerFactory>,
    pub microphones: Arc<dyn MediaDevices>,
    pub speakers: Arc<dyn AudioOutputFactory>,
    pub signaling: Arc<dyn SdpExchange>,
}

/// Activity surfaced to the owner of a transport, in arrival order.
#[derive(Debug)]
pub enum TransportEvent {
    State(TransportState),
    Channel(ChannelReadiness),
    /// One raw control-channel message.
    Message(String),
    PlaybackStarted,
    PlaybackStopped,
    AutoplayBlocked(String),
    Error(MurmurError),
}

/// A single-use transport. Construct a fresh one for every connection.
#[derive(Clone)]
pub struct TransportSession {
    shared: Arc<Shared>,
}

struct Shared {
    backend: MediaBackend,
    state: watch::Sender<TransportState>,
    channel: watch::Sender<ChannelReadiness>,
    events: mpsc::UnboundedSender<TransportEvent>,
    shutdown: CancellationToken,
    speaking: AtomicBool,
    resources: Mutex<Resources>,
}

#[derive(Default)]
struct Resources {
    started: bool,
    peer: Option<Arc<dyn PeerConnection>>,
    local_tracks: Vec<Arc<dyn MediaTrack>>,
    remote_tracks: Vec<Arc<dyn MediaTrack>>,
    output: Option<Arc<dyn AudioOutput>>,
    pump: Option<JoinHandle<()>>,
}

impl TransportSession {
    pub fn new(backend: MediaBackend) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(TransportState::Disconnected);
        let (channel, _) = watch::channel(ChannelReadiness::Closed);
        let session = Self {
            shared: Arc::new(Shared {
                backend,
                state,
                channel,
                events,
                shutdown: CancellationToken::new(),
                speaking: AtomicBool::new(false),
                resources: Mutex::new(Resources::default()),
            }),
        };
        (session, events_rx)
    }

    pub fn state(&self) -> TransportState {
        *self.shared.state.borrow()
    }

    pub fn channel(&self) -> ChannelReadiness {
        *self.shared.channel.borrow()
    }

    pub fn is_speaking(&self) -> bool {
        self.shared.speaking.load(Ordering::SeqCst)
    }

    /// Watch transport state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<TransportState> {
        self.shared.state.subscribe()
    }

    /// Number of local and remote tracks still held and live.
    pub fn live_track_count(&self) -> usize {
        let resources = self.shared.lock();
        resources
            .local_tracks
            .iter()
            .chain(resources.remote_tracks.iter())
            .filter(|track| track.is_live())
            .count()
    }

    /// Negotiate the connection. Resolves once the offer/answer exchange has
    /// been applied; the control channel may still be opening.
    pub async fn connect(
        &self,
        credential: &SessionCredential,
        microphone: bool,
    ) -> Result<(), MurmurError> {
        {
            let mut resources = self.shared.lock();
            if resources.started {
                return Err(MurmurError::InvalidState(
                    "transport sessions are single use".into(),
                ));
            }
            resources.started = true;
        }
        if self.shared.shutdown.is_cancelled() {
            return Err(MurmurError::Disconnected);
        }

        self.shared.set_state(TransportState::Negotiating);
        match self.negotiate(credential, microphone).await {
            Ok(()) => {
                self.shared.set_state(TransportState::Connected);
                tracing::info!(model = %credential.model, voice = %credential.voice, "Realtime transport connected");
                Ok(())
            }
            Err(_) if self.shared.shutdown.is_cancelled() => Err(MurmurError::Disconnected),
            Err(error) => {
                tracing::warn!(%error, "Realtime transport negotiation failed");
                self.shared.release();
                self.shared.set_channel(ChannelReadiness::Closed);
                self.shared.set_state(TransportState::Failed);
                Err(error)
            }
        }
    }

    async fn negotiate(
        &self,
        credential: &SessionCredential,
        microphone: bool,
    ) -> Result<(), MurmurError> {
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let peer = self.shared.backend.peers.create(peer_tx)?;
        {
            let mut resources = self.shared.lock();
            resources.peer = Some(Arc::clone(&peer));
            resources.pump = Some(tokio::spawn(run_pump(Arc::downgrade(&self.shared), peer_rx)));
        }

        if microphone {
            match self
                .guarded(self.shared.backend.microphones.open_microphone())
                .await
            {
                Ok(track) => {
                    self.shared.adopt_local_track(Arc::clone(&track))?;
                    peer.add_local_track(track)?;
                }
                Err(MurmurError::Disconnected) => return Err(MurmurError::Disconnected),
                Err(error) => {
                    tracing::warn!(%error, "Failed to acquire microphone; continuing without it");
                }
            }
        }

        peer.add_receive_only_audio()?;
        peer.create_control_channel(CONTROL_CHANNEL_LABEL)?;
        self.shared.set_channel(ChannelReadiness::Connecting);

        let offer = self.guarded(peer.create_offer()).await?;
        let answer = self
            .guarded(self.shared.backend.signaling.exchange(credential, &offer))
            .await?;
        self.guarded(peer.apply_answer(&answer)).await
    }

    async fn guarded<T>(
        &self,
        future: impl std::future::Future<Output = Result<T, MurmurError>>,
    ) -> Result<T, MurmurError> {
        tokio::select! {
            biased;
            _ = self.shared.shutdown.cancelled() => Err(MurmurError::Disconnected),
            result = future => result,
        }
    }

    /// Wait until the control channel is open.
    ///
    /// Fails with [`MurmurError::Timeout`] when `timeout` elapses first and with
    /// [`MurmurError::Disconnected`] when the transport is torn down meanwhile.
    pub async fn wait_channel_open(&self, timeout: Duration) -> Result<(), MurmurError> {
        let mut channel = self.shared.channel.subscribe();
        let shutdown = self.shared.shutdown.clone();
        with_timeout(timeout, async move {
            loop {
                if *channel.borrow_and_update() == ChannelReadiness::Open {
                    return Ok(());
                }
                tokio::select! {
                    _ = shutdown.cancelled() => return Err(MurmurError::Disconnected),
                    changed = channel.changed() => {
                        if changed.is_err() {
                            return Err(MurmurError::Disconnected);
                        }
                    }
                }
            }
        })
        .await
    }

    /// Send one JSON event. Fails immediately unless the channel is open.
    pub fn send<T: Serialize>(&self, event: &T) -> Result<(), MurmurError> {
        if self.channel() != ChannelReadiness::Open {
            return Err(MurmurError::ChannelNotReady);
        }
        let peer = self
            .shared
            .lock()
            .peer
            .clone()
            .ok_or(MurmurError::ChannelNotReady)?;
        let payload = serde_json::to_string(event)?;
        peer.send(&payload)
    }

    /// Pause local playback without touching the remote model.
    pub fn pause_output(&self) {
        let output = self.shared.lock().output.clone();
        if let Some(output) = output {
            output.pause();
        }
    }

    /// Resume local playback; may be refused by autoplay policy again.
    pub async fn resume_output(&self) {
        let output = self.shared.lock().output.clone();
        if let Some(output) = output {
            let outcome = output.play().await;
            self.shared.report_playback_outcome(outcome);
        }
    }

    /// Release every resource and return to `Disconnected`. Idempotent and
    /// safe from any state, including mid-negotiation.
    pub fn disconnect(&self) {
        self.shared.shutdown.cancel();
        self.shared.release();
        self.shared.speaking.store(false, Ordering::SeqCst);
        self.shared.set_channel(ChannelReadiness::Closed);
        self.shared.set_state(TransportState::Disconnected);
    }

    /// Resolves once [`disconnect`](Self::disconnect) has been called.
    pub async fn closed(&self) {
        self.shared.shutdown.cancelled().await;
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let resources = self
            .resources
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for track in resources.local_tracks.drain(..).chain(resources.remote_tracks.drain(..)) {
            track.stop();
        }
        if let Some(peer) = resources.peer.take() {
            peer.close();
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Resources> {
        self.resources
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    fn set_state(&self, next: TransportState) {
        if self.state.send_replace(next) != next {
            tracing::debug!(state = %next, "Transport state changed");
            self.emit(TransportEvent::State(next));
        }
    }

    fn set_channel(&self, next: ChannelReadiness) {
        if self.channel.send_replace(next) != next {
            tracing::debug!(channel = %next, "Control channel readiness changed");
            self.emit(TransportEvent::Channel(next));
        }
    }

    fn adopt_local_track(&self, track: Arc<dyn MediaTrack>) -> Result<(), MurmurError> {
        let mut resources = self.lock();
        if self.shutdown.is_cancelled() {
            track.stop();
            return Err(MurmurError::Disconnected);
        }
        resources.local_tracks.push(track);
        Ok(())
    }

    fn release(&self) {
        let (peer, tracks, output, pump) = {
            let mut guard = self.lock();
            let resources = &mut *guard;
            let tracks: Vec<_> = resources
                .local_tracks
                .drain(..)
                .chain(resources.remote_tracks.drain(..))
                .collect();
            (
                resources.peer.take(),
                tracks,
                resources.output.take(),
                resources.pump.take(),
            )
        };

        if let Some(output) = output {
            output.pause();
            output.detach();
        }
        for track in tracks {
            track.stop();
        }
        if let Some(peer) = peer {
            peer.close_control_channel();
            peer.close();
        }
        if let Some(pump) = pump {
            pump.abort();
        }
    }

    fn handle_peer_event(
        self: &Arc<Self>,
        event: PeerEvent,
        playback_tx: &mpsc::UnboundedSender<PlaybackEvent>,
    ) {
        match event {
            PeerEvent::ChannelOpen => self.set_channel(ChannelReadiness::Open),
            PeerEvent::ChannelClosed => self.set_channel(ChannelReadiness::Closed),
            PeerEvent::ChannelMessage(text) => self.emit(TransportEvent::Message(text)),
            PeerEvent::ChannelError(message) => self.emit(TransportEvent::Error(
                MurmurError::Transport(format!("control channel error: {message}")),
            )),
            PeerEvent::ConnectionState(state) => self.handle_connection_state(state),
            PeerEvent::RemoteTrack(track) => self.handle_remote_track(track, playback_tx),
        }
    }

    fn handle_connection_state(&self, state: PeerConnectionState) {
        let current = *self.state.borrow();
        match state {
            PeerConnectionState::Connecting | PeerConnectionState::Connected => {}
            PeerConnectionState::Failed => {
                if current == TransportState::Connected {
                    self.set_channel(ChannelReadiness::Closed);
                    self.set_state(TransportState::Failed);
                    self.emit(TransportEvent::Error(MurmurError::Transport(
                        "peer connection failed".into(),
                    )));
                }
            }
            PeerConnectionState::Disconnected | PeerConnectionState::Closed => {
                if current == TransportState::Connected {
                    self.set_channel(ChannelReadiness::Closed);
                    self.set_state(TransportState::Disconnected);
                }
            }
        }
    }

    fn handle_remote_track(
        self: &Arc<Self>,
        track: Arc<dyn MediaTrack>,
        playback_tx: &mpsc::UnboundedSender<PlaybackEvent>,
    ) {
        let output = {
            let mut resources = self.lock();
            if self.shutdown.is_cancelled() {
                track.stop();
                return;
            }
            resources.remote_tracks.push(Arc::clone(&track));
            let output = resources
                .output
                .get_or_insert_with(|| self.backend.speakers.create(playback_tx.clone()));
            Arc::clone(output)
        };

        tracing::debug!(track = track.id(), "Attaching inbound audio");
        output.attach(track);
        // Host play() may wait on user interaction; control messages keep flowing.
        let shared = Arc::downgrade(self);
        tokio::spawn(async move {
            let outcome = output.play().await;
            if let Some(shared) = shared.upgrade().filter(|shared| !shared.shutdown.is_cancelled()) {
                shared.report_playback_outcome(outcome);
            }
        });
    }

    fn report_playback_outcome(&self, outcome: PlaybackOutcome) {
        match outcome {
            PlaybackOutcome::Started => {}
            PlaybackOutcome::Blocked { reason } => {
                tracing::warn!(%reason, "Autoplay prevented");
                self.emit(TransportEvent::AutoplayBlocked(reason));
            }
            PlaybackOutcome::Failed { reason } => {
                self.emit(TransportEvent::Error(MurmurError::Playback(reason)));
            }
        }
    }

    fn handle_playback_event(&self, event: PlaybackEvent) {
        match event {
            PlaybackEvent::Playing => {
                if !self.speaking.swap(true, Ordering::SeqCst) {
                    self.emit(TransportEvent::PlaybackStarted);
                }
            }
            PlaybackEvent::Paused | PlaybackEvent::Ended => {
                if self.speaking.swap(false, Ordering::SeqCst) {
                    self.emit(TransportEvent::PlaybackStopped);
                }
            }
        }
    }
}

async fn run_pump(shared: Weak<Shared>, mut peer_rx: mpsc::UnboundedReceiver<PeerEvent>) {
    let (playback_tx, mut playback_rx) = mpsc::unbounded_channel();
    let Some(shutdown) = shared.upgrade().map(|shared| shared.shutdown.clone()) else {
        return;
    };
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            event = peer_rx.recv() => match (event, shared.upgrade()) {
                (Some(event), Some(shared)) => shared.handle_peer_event(event, &playback_tx),
                _ => break,
            },
            Some(event) = playback_rx.recv() => match shared.upgrade() {
                Some(shared) => shared.handle_playback_event(event),
                None => break,
            },
        }
    }
}
