//! Shared test helpers: in-memory peer, media and broker fakes.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, Notify};

use murmur::config::MurmurConfig;
use murmur::credential::{CredentialBroker, SessionCredential};
use murmur::error::MurmurError;
use murmur::session::{SessionController, SessionHooks};
use murmur::tools::ToolExecutor;
use murmur::transport::{
    AudioOutput, AudioOutputFactory, MediaBackend, MediaDevices, MediaTrack, PeerConnection,
    PeerConnectionState, PeerEvent, PeerFactory, PlaybackEvent, PlaybackOutcome, SdpExchange,
};

// ---------------------------------------------------------------------------
// Tracks and devices
// ---------------------------------------------------------------------------

pub struct FakeTrack {
    id: String,
    live: AtomicBool,
}

impl FakeTrack {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            live: AtomicBool::new(true),
        })
    }
}

impl MediaTrack for FakeTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct FakeMicrophones {
    pub fail: AtomicBool,
    pub opened: Mutex<Vec<Arc<FakeTrack>>>,
}

impl FakeMicrophones {
    pub fn live_count(&self) -> usize {
        self.opened
            .lock()
            .unwrap()
            .iter()
            .filter(|track| track.is_live())
            .count()
    }
}

#[async_trait]
impl MediaDevices for FakeMicrophones {
    async fn open_microphone(&self) -> Result<Arc<dyn MediaTrack>, MurmurError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MurmurError::Transport("permission denied".into()));
        }
        let mut opened = self.opened.lock().unwrap();
        let track = FakeTrack::new(&format!("mic-{}", opened.len()));
        opened.push(Arc::clone(&track));
        Ok(track)
    }
}

// ---------------------------------------------------------------------------
// Playback
// ---------------------------------------------------------------------------

pub struct FakeOutput {
    events: mpsc::UnboundedSender<PlaybackEvent>,
    block: bool,
    hold: Option<Arc<Notify>>,
    pub attached: AtomicUsize,
    pub detached: AtomicBool,
}

#[async_trait]
impl AudioOutput for FakeOutput {
    fn attach(&self, _track: Arc<dyn MediaTrack>) {
        self.attached.fetch_add(1, Ordering::SeqCst);
    }

    async fn play(&self) -> PlaybackOutcome {
        if let Some(hold) = &self.hold {
            hold.notified().await;
        }
        if self.block {
            return PlaybackOutcome::Blocked {
                reason: "user gesture required".into(),
            };
        }
        let _ = self.events.send(PlaybackEvent::Playing);
        PlaybackOutcome::Started
    }

    fn pause(&self) {
        let _ = self.events.send(PlaybackEvent::Paused);
    }

    fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeSpeakers {
    pub block: AtomicBool,
    /// When set, `play()` waits for a notification before answering.
    pub hold: Mutex<Option<Arc<Notify>>>,
    pub outputs: Mutex<Vec<Arc<FakeOutput>>>,
}

impl FakeSpeakers {
    /// Report that the current output finished playing.
    pub fn end_playback(&self) {
        if let Some(output) = self.outputs.lock().unwrap().last() {
            let _ = output.events.send(PlaybackEvent::Ended);
        }
    }
}

impl AudioOutputFactory for FakeSpeakers {
    fn create(&self, events: mpsc::UnboundedSender<PlaybackEvent>) -> Arc<dyn AudioOutput> {
        let output = Arc::new(FakeOutput {
            events,
            block: self.block.load(Ordering::SeqCst),
            hold: self.hold.lock().unwrap().clone(),
            attached: AtomicUsize::new(0),
            detached: AtomicBool::new(false),
        });
        self.outputs.lock().unwrap().push(Arc::clone(&output));
        output
    }
}

// ---------------------------------------------------------------------------
// Peer connection
// ---------------------------------------------------------------------------

/// How a fake peer opens its control channel once the answer is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOpening {
    Immediate,
    After(Duration),
    Never,
}

pub struct FakePeer {
    events: mpsc::UnboundedSender<PeerEvent>,
    opening: ChannelOpening,
    sent: Mutex<Vec<Value>>,
    sent_notify: Notify,
    pub local_tracks: Mutex<Vec<Arc<dyn MediaTrack>>>,
    pub channel_label: Mutex<Option<String>>,
    pub closed: AtomicBool,
    pub channel_closed: AtomicBool,
}

impl FakePeer {
    pub fn open_channel(&self) {
        let _ = self.events.send(PeerEvent::ChannelOpen);
    }

    pub fn close_channel_remotely(&self) {
        let _ = self.events.send(PeerEvent::ChannelClosed);
    }

    pub fn set_connection_state(&self, state: PeerConnectionState) {
        let _ = self.events.send(PeerEvent::ConnectionState(state));
    }

    /// Deliver one server event on the control channel.
    pub fn push(&self, event: Value) {
        let _ = self.events.send(PeerEvent::ChannelMessage(event.to_string()));
    }

    pub fn push_all(&self, events: impl IntoIterator<Item = Value>) {
        for event in events {
            self.push(event);
        }
    }

    pub fn remote_track(&self, track: Arc<FakeTrack>) {
        let _ = self.events.send(PeerEvent::RemoteTrack(track));
    }

    pub fn sent(&self) -> Vec<Value> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_types(&self) -> Vec<String> {
        self.sent()
            .iter()
            .filter_map(|event| event["type"].as_str().map(str::to_string))
            .collect()
    }

    /// Wait until at least `count` frames of `kind` have been sent.
    pub async fn wait_for_sent(&self, kind: &str, count: usize) -> Vec<Value> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let notified = self.sent_notify.notified();
                let matching: Vec<Value> = self
                    .sent()
                    .into_iter()
                    .filter(|event| event["type"] == kind)
                    .collect();
                if matching.len() >= count {
                    return matching;
                }
                notified.await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {count} {kind} frame(s)"))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerConnection for FakePeer {
    fn add_local_track(&self, track: Arc<dyn MediaTrack>) -> Result<(), MurmurError> {
        self.local_tracks.lock().unwrap().push(track);
        Ok(())
    }

    fn add_receive_only_audio(&self) -> Result<(), MurmurError> {
        Ok(())
    }

    fn create_control_channel(&self, label: &str) -> Result<(), MurmurError> {
        *self.channel_label.lock().unwrap() = Some(label.to_string());
        Ok(())
    }

    async fn create_offer(&self) -> Result<String, MurmurError> {
        Ok("v=0 offer".into())
    }

    async fn apply_answer(&self, _sdp: &str) -> Result<(), MurmurError> {
        match self.opening {
            ChannelOpening::Immediate => self.open_channel(),
            ChannelOpening::After(delay) => {
                let events = self.events.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = events.send(PeerEvent::ChannelOpen);
                });
            }
            ChannelOpening::Never => {}
        }
        Ok(())
    }

    fn send(&self, payload: &str) -> Result<(), MurmurError> {
        if self.channel_closed.load(Ordering::SeqCst) {
            return Err(MurmurError::Transport("channel closed".into()));
        }
        let value = serde_json::from_str(payload)?;
        self.sent.lock().unwrap().push(value);
        self.sent_notify.notify_waiters();
        Ok(())
    }

    fn close_control_channel(&self) {
        self.channel_closed.store(true, Ordering::SeqCst);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub struct FakePeerFactory {
    opening: Mutex<ChannelOpening>,
    pub peers: Mutex<Vec<Arc<FakePeer>>>,
}

impl FakePeerFactory {
    pub fn new(opening: ChannelOpening) -> Self {
        Self {
            opening: Mutex::new(opening),
            peers: Mutex::new(Vec::new()),
        }
    }

    pub fn set_opening(&self, opening: ChannelOpening) {
        *self.opening.lock().unwrap() = opening;
    }

    pub fn latest(&self) -> Arc<FakePeer> {
        self.peers
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no peer connection created")
    }

    pub fn count(&self) -> usize {
        self.peers.lock().unwrap().len()
    }
}

impl PeerFactory for FakePeerFactory {
    fn create(
        &self,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerConnection>, MurmurError> {
        let peer = Arc::new(FakePeer {
            events,
            opening: *self.opening.lock().unwrap(),
            sent: Mutex::new(Vec::new()),
            sent_notify: Notify::new(),
            local_tracks: Mutex::new(Vec::new()),
            channel_label: Mutex::new(None),
            closed: AtomicBool::new(false),
            channel_closed: AtomicBool::new(false),
        });
        self.peers.lock().unwrap().push(Arc::clone(&peer));
        Ok(peer)
    }
}

// ---------------------------------------------------------------------------
// Signaling and credentials
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeSdp {
    /// When set, every exchange waits for a notification before answering.
    pub gate: Option<Arc<Notify>>,
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl SdpExchange for FakeSdp {
    async fn exchange(
        &self,
        _credential: &SessionCredential,
        _offer_sdp: &str,
    ) -> Result<String, MurmurError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(MurmurError::Handshake("status 500: offer rejected".into()));
        }
        Ok("v=0 answer".into())
    }
}

#[derive(Default)]
pub struct StaticBroker {
    pub fail: AtomicBool,
    pub minted: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl CredentialBroker for StaticBroker {
    async fn mint(&self, model: &str, voice: &str) -> Result<SessionCredential, MurmurError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MurmurError::credential(401, "{\"error\":\"missing key\"}"));
        }
        self.minted
            .lock()
            .unwrap()
            .push((model.to_string(), voice.to_string()));
        Ok(SessionCredential {
            token: "ek_test".into(),
            expires_at: None,
            model: model.to_string(),
            voice: voice.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub peers: Arc<FakePeerFactory>,
    pub microphones: Arc<FakeMicrophones>,
    pub speakers: Arc<FakeSpeakers>,
    pub sdp: Arc<FakeSdp>,
    pub broker: Arc<StaticBroker>,
    pub config: MurmurConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_opening(ChannelOpening::Immediate)
    }

    pub fn with_opening(opening: ChannelOpening) -> Self {
        Self::with_sdp(opening, FakeSdp::default())
    }

    pub fn with_sdp(opening: ChannelOpening, sdp: FakeSdp) -> Self {
        Self {
            peers: Arc::new(FakePeerFactory::new(opening)),
            microphones: Arc::new(FakeMicrophones::default()),
            speakers: Arc::new(FakeSpeakers::default()),
            sdp: Arc::new(sdp),
            broker: Arc::new(StaticBroker::default()),
            config: MurmurConfig::default(),
        }
    }

    pub fn backend(&self) -> MediaBackend {
        MediaBackend {
            peers: self.peers.clone(),
            microphones: self.microphones.clone(),
            speakers: self.speakers.clone(),
            signaling: self.sdp.clone(),
        }
    }

    pub fn controller(&self, tools: ToolExecutor, hooks: SessionHooks) -> SessionController {
        SessionController::builder()
            .backend(self.backend())
            .broker(self.broker.clone())
            .config(self.config.clone())
            .tools(tools)
            .hooks(hooks)
            .build()
    }

    pub fn peer(&self) -> Arc<FakePeer> {
        self.peers.latest()
    }
}

// ---------------------------------------------------------------------------
// Hook recording
// ---------------------------------------------------------------------------

/// Records every hook invocation as a short string.
#[derive(Clone, Default)]
pub struct HookLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl HookLog {
    pub fn hooks(&self) -> SessionHooks {
        let record = |entries: &Arc<Mutex<Vec<String>>>| {
            let entries = Arc::clone(entries);
            move |entry: String| entries.lock().unwrap().push(entry)
        };
        let text_delta = record(&self.entries);
        let text_done = record(&self.entries);
        let user_text_done = record(&self.entries);
        let audio_start = record(&self.entries);
        let audio_end = record(&self.entries);
        let tool_call = record(&self.entries);
        let tool_result = record(&self.entries);
        let autoplay = record(&self.entries);
        let error = record(&self.entries);
        let state = record(&self.entries);

        SessionHooks::new()
            .on_text_delta(move |delta, _| text_delta(format!("text_delta:{delta}")))
            .on_text_done(move |text| text_done(format!("text_done:{text}")))
            .on_user_text_done(move |text| user_text_done(format!("user_text_done:{text}")))
            .on_audio_start(move || audio_start("audio_start".into()))
            .on_audio_end(move || audio_end("audio_end".into()))
            .on_tool_call(move |call| tool_call(format!("tool_call:{}", call.name)))
            .on_tool_result(move |call, outcome| {
                tool_result(format!("tool_result:{}:{}", call.name, outcome.is_ok()))
            })
            .on_autoplay_blocked(move |reason| autoplay(format!("autoplay_blocked:{reason}")))
            .on_error(move |err| error(format!("error:{err}")))
            .on_state_change(move |status| state(format!("state:{}", status.state)))
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    pub fn with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.starts_with(prefix))
            .collect()
    }

    /// Session states seen by the state hook, repeats collapsed.
    pub fn states(&self) -> Vec<String> {
        let mut states = self.with_prefix("state:");
        states.dedup();
        states
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.entries().iter().any(|seen| seen == entry)
    }
}

/// Let spawned tasks run until they block.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
