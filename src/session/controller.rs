//! Session controller: connect, turns, tool round trips, teardown.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use bon::bon;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::hooks::{HookEvent, SessionHooks};
use super::options::{SessionOptions, SessionState, SessionStatus, TurnOptions, TurnOutcome};
use crate::config::MurmurConfig;
use crate::credential::CredentialBroker;
use crate::error::{MurmurError, Result};
use crate::events::{ClientEvent, CompletedToolCall, Demultiplexer, ResponseRequest, SessionEvent};
use crate::tools::{ToolExecutor, ToolOutcome, UNKNOWN_TOOL};
use crate::transport::{
    ChannelReadiness, MediaBackend, TransportEvent, TransportSession, TransportState,
};

/// Marks injected note snapshots so the model treats them as background.
pub const CONTEXT_PREAMBLE: &str =
    "[Background context from the user's notes. Do not reply to this message.]";

/// Public entry point for one realtime conversation.
///
/// Cheap to clone; clones share the same session. Every transport event is
/// processed by one pump task in arrival order, and hooks are always fired
/// with no internal lock held, so hooks may call back into the controller.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

struct Inner {
    config: MurmurConfig,
    backend: MediaBackend,
    broker: Arc<dyn CredentialBroker>,
    tools: ToolExecutor,
    hooks: SessionHooks,
    state_tx: watch::Sender<SessionState>,
    core: Mutex<Core>,
}

struct Core {
    state: SessionState,
    options: SessionOptions,
    transport: Option<TransportSession>,
    /// Bumped whenever the transport is replaced or torn down. Events and
    /// tool results tagged with an older generation are dropped.
    generation: u64,
    pump: Option<JoinHandle<()>>,
    demux: Demultiplexer,
    turn: Option<ActiveTurn>,
    next_turn_id: u64,
}

struct ActiveTurn {
    id: u64,
    /// The request left the process.
    sent: bool,
    /// A response event arrived after the request was sent.
    started: bool,
    modalities: Vec<String>,
    text: String,
    pending_tools: usize,
    tool_round_trips: u32,
    waiter: oneshot::Sender<Result<TurnOutcome>>,
}

impl ActiveTurn {
    fn resolve(self, result: Result<TurnOutcome>) {
        let _ = self.waiter.send(result);
    }
}

impl Core {
    fn status(&self) -> SessionStatus {
        match &self.transport {
            Some(transport) => SessionStatus {
                state: self.state,
                transport: transport.state(),
                channel: transport.channel(),
                speaking: transport.is_speaking(),
            },
            None => SessionStatus {
                state: self.state,
                transport: TransportState::Disconnected,
                channel: ChannelReadiness::Closed,
                speaking: false,
            },
        }
    }

    fn channel_open(&self) -> bool {
        self.transport
            .as_ref()
            .is_some_and(|transport| transport.channel() == ChannelReadiness::Open)
    }

    fn owns_turn(&self, turn_id: u64) -> bool {
        self.turn.as_ref().is_some_and(|turn| turn.id == turn_id)
    }

    fn mark_started(&mut self) {
        if let Some(turn) = self.turn.as_mut().filter(|turn| turn.sent) {
            turn.started = true;
        }
    }
}

#[bon]
impl SessionController {
    #[builder]
    pub fn new(
        backend: MediaBackend,
        broker: Arc<dyn CredentialBroker>,
        #[builder(default)] config: MurmurConfig,
        options: Option<SessionOptions>,
        #[builder(default)] tools: ToolExecutor,
        #[builder(default)] hooks: SessionHooks,
    ) -> Self {
        let options = options.unwrap_or_else(|| SessionOptions::from_config(&config));
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            inner: Arc::new(Inner {
                config,
                backend,
                broker,
                tools,
                hooks,
                state_tx,
                core: Mutex::new(Core {
                    state: SessionState::Idle,
                    options,
                    transport: None,
                    generation: 0,
                    pump: None,
                    demux: Demultiplexer::new(),
                    turn: None,
                    next_turn_id: 0,
                }),
            }),
        }
    }
}

impl SessionController {
    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.lock().status()
    }

    pub fn options(&self) -> SessionOptions {
        self.inner.lock().options.clone()
    }

    /// Watch controller state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    /// Whether a `send_turn` call is still waiting for its turn to end.
    pub fn turn_in_flight(&self) -> bool {
        self.inner.lock().turn.is_some()
    }

    /// The current transport, if any.
    pub fn transport(&self) -> Option<TransportSession> {
        self.inner.lock().transport.clone()
    }

    /// Connect with the stored options. No-op when already connected; joins
    /// an attempt already in progress.
    pub async fn connect(&self) -> Result<()> {
        self.connect_inner(None).await
    }

    /// Replace the stored options, then connect.
    pub async fn connect_with(&self, options: SessionOptions) -> Result<()> {
        self.connect_inner(Some(options)).await
    }

    async fn connect_inner(&self, options: Option<SessionOptions>) -> Result<()> {
        let mut out = Vec::new();
        let attempt = {
            let mut core = self.inner.lock();
            let state = core.state;
            match state {
                SessionState::Ready | SessionState::Sending => return Ok(()),
                SessionState::Connecting => {
                    if options.is_some() {
                        tracing::debug!("Connect already in progress; new options ignored");
                    }
                    None
                }
                _ => Some(self.inner.begin_connect(&mut core, options, &mut out)),
            }
        };
        self.inner.hooks.emit_all(out);

        match attempt {
            None => self.join_connect().await,
            Some((generation, transport, options)) => {
                let result = self.inner.establish(&transport, &options).await;
                self.inner.finish_connect(generation, result)
            }
        }
    }

    async fn join_connect(&self) -> Result<()> {
        let mut states = self.inner.state_tx.subscribe();
        let state = states
            .wait_for(|state| *state != SessionState::Connecting)
            .await
            .map(|state| *state)
            .map_err(|_| MurmurError::Disconnected)?;
        match state {
            SessionState::Ready | SessionState::Sending => Ok(()),
            SessionState::Disconnected => Err(MurmurError::Disconnected),
            other => Err(MurmurError::InvalidState(format!(
                "connect attempt ended in state {other}"
            ))),
        }
    }

    /// Request one model turn and wait for it to end.
    ///
    /// Waits (bounded) for the control channel when it is still opening.
    /// Transient send failures are retried by the configured policy. Only one
    /// turn may be in flight at a time.
    pub async fn send_turn(&self, text: &str, options: TurnOptions) -> Result<TurnOutcome> {
        let (turn_id, receiver, event) = self.inner.reserve_turn(text, options)?;

        let sent = self
            .inner
            .config
            .send_retry
            .execute(|attempt| self.inner.attempt_send(turn_id, attempt, &event))
            .await;
        if let Err(error) = sent {
            let mut out = Vec::new();
            {
                let mut core = self.inner.lock();
                if core.owns_turn(turn_id) {
                    core.turn = None;
                }
                if !matches!(error, MurmurError::Disconnected) {
                    self.inner.settle_failure(&mut core, &mut out);
                }
            }
            self.inner.hooks.emit_all(out);
            if !matches!(error, MurmurError::Disconnected) {
                tracing::warn!(%error, "Turn request failed");
                self.inner.hooks.report(&error);
            }
            return Err(error);
        }

        let turn_timeout = self.inner.config.turn_timeout;
        let result = match tokio::time::timeout(turn_timeout, receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(MurmurError::Disconnected),
            Err(_) => Err(MurmurError::Timeout(turn_timeout.as_millis() as u64)),
        };

        let mut out = Vec::new();
        {
            let mut core = self.inner.lock();
            if core.owns_turn(turn_id) {
                core.turn = None;
            }
            if core.state == SessionState::Sending {
                match &result {
                    Ok(_) => self.inner.set_state(&mut core, SessionState::Ready, &mut out),
                    Err(_) => self.inner.settle_failure(&mut core, &mut out),
                }
            }
        }
        self.inner.hooks.emit_all(out);

        match &result {
            Ok(outcome) => tracing::debug!(
                tool_round_trips = outcome.tool_round_trips,
                "Turn completed"
            ),
            Err(error @ MurmurError::Timeout(_)) => {
                tracing::warn!(%error, "Turn timed out");
                self.inner.hooks.report(error);
            }
            Err(error) => tracing::debug!(%error, "Turn failed"),
        }
        result
    }

    /// Add a note snapshot as background context.
    ///
    /// Returns `false` without side effects when the channel is not open.
    /// Never connects and never fails; send errors go to the error hook.
    pub fn inject_context(&self, snapshot: &str) -> bool {
        let Some(transport) = self.transport() else {
            return false;
        };
        if transport.channel() != ChannelReadiness::Open {
            return false;
        }
        let message = format!("{CONTEXT_PREAMBLE}\n\n{snapshot}");
        match transport.send(&ClientEvent::context(&message)) {
            Ok(()) => {
                tracing::debug!(chars = snapshot.len(), "Injected note context");
                true
            }
            Err(error) => {
                tracing::warn!(%error, "Context injection failed");
                self.inner.hooks.report(&error);
                false
            }
        }
    }

    /// Ask the model to stop the current response and silence local playback.
    /// Does nothing when no response is in flight.
    pub fn cancel(&self) {
        let (transport, turn_active) = {
            let core = self.inner.lock();
            let active = core.turn.as_ref().is_some_and(|turn| turn.sent);
            (core.transport.clone(), active)
        };
        let Some(transport) = transport else {
            return;
        };
        if !turn_active && !transport.is_speaking() {
            return;
        }
        if let Err(error) = transport.send(&ClientEvent::cancel()) {
            tracing::debug!(%error, "Cancel not delivered");
        }
        transport.pause_output();
    }

    /// Pause local playback only.
    pub fn pause(&self) {
        if let Some(transport) = self.transport() {
            transport.pause_output();
        }
    }

    /// Resume local playback; autoplay policy may refuse again.
    pub async fn resume(&self) {
        if let Some(transport) = self.transport() {
            transport.resume_output().await;
        }
    }

    /// Tear everything down. Idempotent; an awaiting turn fails with
    /// [`MurmurError::Disconnected`].
    pub fn disconnect(&self) {
        let mut out = Vec::new();
        {
            let mut core = self.inner.lock();
            let transport = core.transport.take();
            if transport.is_none() && core.turn.is_none() && !core.state.is_active() {
                return;
            }
            core.generation += 1;
            if let Some(pump) = core.pump.take() {
                pump.abort();
            }
            core.demux.reset();
            if let Some(turn) = core.turn.take() {
                turn.resolve(Err(MurmurError::Disconnected));
            }
            if let Some(transport) = transport {
                if transport.is_speaking() {
                    out.push(HookEvent::AudioEnd);
                }
                transport.disconnect();
            }
            self.inner
                .set_state(&mut core, SessionState::Disconnected, &mut out);
        }
        tracing::info!("Realtime session disconnected");
        self.inner.hooks.emit_all(out);
    }

    /// Full teardown followed by a fresh connection.
    pub async fn reconnect(&self) -> Result<()> {
        self.disconnect();
        self.connect().await
    }

    /// Toggle microphone capture. Reconnects when a session is active.
    pub async fn set_microphone(&self, enabled: bool) -> Result<()> {
        let reconnect = {
            let mut core = self.inner.lock();
            if core.options.microphone == enabled {
                return Ok(());
            }
            core.options.microphone = enabled;
            core.state.is_active()
        };
        if reconnect {
            self.reconnect().await
        } else {
            Ok(())
        }
    }

    /// Change the voice. Reconnects when a session is active.
    pub async fn set_voice(&self, voice: impl Into<String>) -> Result<()> {
        let voice = voice.into();
        let reconnect = {
            let mut core = self.inner.lock();
            if core.options.voice == voice {
                return Ok(());
            }
            core.options.voice = voice;
            core.state.is_active()
        };
        if reconnect {
            self.reconnect().await
        } else {
            Ok(())
        }
    }

    /// Takes effect with the next turn.
    pub fn set_instructions(&self, instructions: Option<String>) {
        self.inner.lock().options.instructions = instructions;
    }

    /// Takes effect with the next connection.
    pub fn set_model(&self, model: impl Into<String>) {
        self.inner.lock().options.model = model.into();
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("status", &self.status())
            .field("tools", &self.inner.tools)
            .finish()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, core: &mut Core, next: SessionState, out: &mut Vec<HookEvent>) {
        if core.state == next {
            return;
        }
        tracing::debug!(from = %core.state, state = %next, "Session state changed");
        core.state = next;
        self.state_tx.send_replace(next);
        out.push(HookEvent::Status(core.status()));
    }

    /// Failed, then Ready when the channel is still usable, else Idle.
    fn settle_failure(&self, core: &mut Core, out: &mut Vec<HookEvent>) {
        if !matches!(core.state, SessionState::Ready | SessionState::Sending) {
            return;
        }
        self.set_state(core, SessionState::Failed, out);
        let next = if core.channel_open() {
            SessionState::Ready
        } else {
            SessionState::Idle
        };
        self.set_state(core, next, out);
    }

    fn begin_connect(
        self: &Arc<Self>,
        core: &mut Core,
        options: Option<SessionOptions>,
        out: &mut Vec<HookEvent>,
    ) -> (u64, TransportSession, SessionOptions) {
        if let Some(options) = options {
            core.options = options;
        }
        if let Some(stale) = core.transport.take() {
            stale.disconnect();
        }
        if let Some(pump) = core.pump.take() {
            pump.abort();
        }
        core.generation += 1;
        core.demux.reset();

        let (transport, events) = TransportSession::new(self.backend.clone());
        core.transport = Some(transport.clone());
        core.pump = Some(tokio::spawn(run_pump(
            Arc::downgrade(self),
            core.generation,
            events,
        )));
        self.set_state(core, SessionState::Connecting, out);
        (core.generation, transport, core.options.clone())
    }

    async fn establish(&self, transport: &TransportSession, options: &SessionOptions) -> Result<()> {
        let credential = tokio::select! {
            biased;
            _ = transport.closed() => return Err(MurmurError::Disconnected),
            minted = self.broker.mint(&options.model, &options.voice) => minted?,
        };
        transport.connect(&credential, options.microphone).await?;
        transport
            .wait_channel_open(self.config.channel_open_timeout)
            .await?;

        if let Some(model) = &options.input_transcription {
            if let Err(error) = transport.send(&ClientEvent::enable_transcription(model.clone())) {
                tracing::warn!(%error, "Failed to enable input transcription");
                self.hooks.report(&error);
            }
        }
        Ok(())
    }

    fn finish_connect(&self, generation: u64, result: Result<()>) -> Result<()> {
        let mut out = Vec::new();
        let result = {
            let mut core = self.lock();
            let current = core.generation == generation;
            match result {
                Ok(()) if current && core.state == SessionState::Connecting => {
                    self.set_state(&mut core, SessionState::Ready, &mut out);
                    tracing::info!(model = %core.options.model, "Realtime session ready");
                    Ok(())
                }
                // A turn that was waiting on the channel went out first.
                Ok(()) if current && core.state == SessionState::Sending => Ok(()),
                Ok(()) => Err(MurmurError::Disconnected),
                Err(error) if !current => {
                    tracing::debug!(%error, "Superseded connect attempt ended");
                    return Err(MurmurError::Disconnected);
                }
                Err(error) => {
                    if let Some(transport) = core.transport.take() {
                        transport.disconnect();
                    }
                    if let Some(pump) = core.pump.take() {
                        pump.abort();
                    }
                    core.generation += 1;
                    core.demux.reset();
                    if core.turn.as_ref().is_some_and(|turn| turn.sent) {
                        if let Some(turn) = core.turn.take() {
                            turn.resolve(Err(MurmurError::Transport(
                                "connect failed after the turn was sent".into(),
                            )));
                        }
                    }
                    self.set_state(&mut core, SessionState::Failed, &mut out);
                    self.set_state(&mut core, SessionState::Idle, &mut out);
                    Err(error)
                }
            }
        };
        self.hooks.emit_all(out);
        if let Err(error) = &result {
            if !matches!(error, MurmurError::Disconnected) {
                tracing::warn!(%error, "Realtime connect failed");
                self.hooks.report(error);
            }
        }
        result
    }

    fn reserve_turn(
        &self,
        text: &str,
        options: TurnOptions,
    ) -> Result<(u64, oneshot::Receiver<Result<TurnOutcome>>, ClientEvent)> {
        let mut core = self.lock();
        if core.turn.is_some() {
            return Err(MurmurError::InvalidState("a turn is already in flight".into()));
        }

        let modalities = options
            .modalities
            .unwrap_or_else(|| core.options.modalities.clone());
        let tools = options.tools.or_else(|| {
            (core.options.advertise_tools && !self.tools.is_empty()).then(|| self.tools.schemas())
        });
        let request = ResponseRequest {
            modalities: modalities.clone(),
            instructions: options
                .instructions
                .or_else(|| core.options.instructions.clone()),
            tools,
            metadata: options.metadata,
            input: Vec::new(),
        };

        core.next_turn_id += 1;
        let id = core.next_turn_id;
        let (waiter, receiver) = oneshot::channel();
        core.turn = Some(ActiveTurn {
            id,
            sent: false,
            started: false,
            modalities,
            text: String::new(),
            pending_tools: 0,
            tool_round_trips: 0,
            waiter,
        });
        Ok((id, receiver, ClientEvent::user_turn(text, request)))
    }

    async fn attempt_send(&self, turn_id: u64, attempt: u32, event: &ClientEvent) -> Result<()> {
        let transport = {
            let core = self.lock();
            if !core.owns_turn(turn_id) {
                return Err(MurmurError::Disconnected);
            }
            core.transport.clone()
        };
        let transport = transport.ok_or(MurmurError::ChannelNotReady)?;
        transport
            .wait_channel_open(self.config.channel_open_timeout)
            .await?;

        let mut out = Vec::new();
        {
            let mut core = self.lock();
            if !core.owns_turn(turn_id) {
                return Err(MurmurError::Disconnected);
            }
            transport.send(event)?;
            if let Some(turn) = core.turn.as_mut() {
                turn.sent = true;
                turn.started = false;
            }
            self.set_state(&mut core, SessionState::Sending, &mut out);
        }
        tracing::debug!(attempt, "Turn request sent");
        self.hooks.emit_all(out);
        Ok(())
    }

    fn handle_transport_event(self: &Arc<Self>, generation: u64, event: TransportEvent) {
        let mut out = Vec::new();
        let mut calls = Vec::new();
        {
            let mut core = self.lock();
            if core.generation != generation {
                tracing::trace!("Dropping event from a retired transport");
                return;
            }
            match event {
                TransportEvent::Message(raw) => {
                    for event in core.demux.handle_raw(&raw) {
                        self.apply(&mut core, event, &mut out, &mut calls);
                    }
                }
                TransportEvent::State(state) => {
                    let lost = matches!(state, TransportState::Failed | TransportState::Disconnected);
                    if lost && matches!(core.state, SessionState::Ready | SessionState::Sending) {
                        // Failed transports report their own error event.
                        let report = state != TransportState::Failed;
                        self.lose_connection(&mut core, "realtime transport lost", report, &mut out);
                    }
                    out.push(HookEvent::Status(core.status()));
                }
                TransportEvent::Channel(readiness) => {
                    if readiness == ChannelReadiness::Closed
                        && matches!(core.state, SessionState::Ready | SessionState::Sending)
                    {
                        self.lose_connection(&mut core, "control channel closed", true, &mut out);
                    }
                    out.push(HookEvent::Status(core.status()));
                }
                TransportEvent::PlaybackStarted => {
                    out.push(HookEvent::AudioStart);
                    out.push(HookEvent::Status(core.status()));
                }
                TransportEvent::PlaybackStopped => {
                    out.push(HookEvent::AudioEnd);
                    out.push(HookEvent::Status(core.status()));
                }
                TransportEvent::AutoplayBlocked(reason) => {
                    out.push(HookEvent::AutoplayBlocked(reason));
                }
                TransportEvent::Error(error) => out.push(HookEvent::Error(error)),
            }
        }
        self.hooks.emit_all(out);
        for call in calls {
            self.spawn_tool(generation, call);
        }
    }

    fn apply(
        &self,
        core: &mut Core,
        event: SessionEvent,
        out: &mut Vec<HookEvent>,
        calls: &mut Vec<CompletedToolCall>,
    ) {
        match event {
            SessionEvent::ResponseStarted { response_id } => {
                tracing::trace!(?response_id, "Response started");
                core.mark_started();
            }
            SessionEvent::TextDelta { delta, text } => {
                core.mark_started();
                out.push(HookEvent::TextDelta { delta, text });
            }
            SessionEvent::TextDone { text } => {
                if let Some(turn) = core.turn.as_mut() {
                    turn.text = text.clone();
                }
                out.push(HookEvent::TextDone(text));
            }
            SessionEvent::UserTextDelta { delta, text } => {
                out.push(HookEvent::UserTextDelta { delta, text });
            }
            SessionEvent::UserTextDone { text } => out.push(HookEvent::UserTextDone(text)),
            SessionEvent::TurnEnded { had_tool_calls } => {
                let complete = core.turn.as_ref().is_some_and(|turn| {
                    turn.sent && turn.started && !had_tool_calls && turn.pending_tools == 0
                });
                if complete {
                    if let Some(turn) = core.turn.take() {
                        let outcome = TurnOutcome {
                            text: turn.text.clone(),
                            tool_round_trips: turn.tool_round_trips,
                        };
                        turn.resolve(Ok(outcome));
                    }
                }
            }
            SessionEvent::ToolCall(call) => {
                core.mark_started();
                if let Some(turn) = core.turn.as_mut() {
                    turn.pending_tools += 1;
                }
                tracing::info!(tool = %call.name, call_id = %call.call_id, "Tool call received");
                if !self.tools.contains(&call.name) {
                    out.push(HookEvent::UnhandledToolCall(call.clone()));
                }
                calls.push(call);
            }
            SessionEvent::Error(payload) => {
                tracing::warn!(error = %payload, "Upstream error event");
                if core.turn.as_ref().is_some_and(|turn| turn.sent) {
                    if let Some(turn) = core.turn.take() {
                        turn.resolve(Err(MurmurError::Upstream(payload.clone())));
                    }
                }
                out.push(HookEvent::Error(MurmurError::Upstream(payload)));
            }
        }
    }

    fn lose_connection(
        &self,
        core: &mut Core,
        reason: &str,
        report: bool,
        out: &mut Vec<HookEvent>,
    ) {
        tracing::warn!(reason, "Realtime connection lost");
        if let Some(turn) = core.turn.take() {
            turn.resolve(Err(MurmurError::Transport(reason.to_string())));
        }
        // The microphone and playback sink must not outlive the connection.
        if let Some(transport) = core.transport.take() {
            if transport.is_speaking() {
                out.push(HookEvent::AudioEnd);
            }
            transport.disconnect();
        }
        if let Some(pump) = core.pump.take() {
            pump.abort();
        }
        core.generation += 1;
        core.demux.reset();
        if report {
            out.push(HookEvent::Error(MurmurError::Transport(reason.to_string())));
        }
        self.set_state(core, SessionState::Failed, out);
        self.set_state(core, SessionState::Idle, out);
    }

    fn spawn_tool(self: &Arc<Self>, generation: u64, call: CompletedToolCall) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = if inner.tools.contains(&call.name) {
                inner.tools.execute(&call.name, call.arguments.clone()).await
            } else {
                ToolOutcome::err(UNKNOWN_TOOL)
            };
            inner.relay_tool_outcome(generation, call, outcome);
        });
    }

    /// Send a tool result back and ask the model to continue.
    fn relay_tool_outcome(&self, generation: u64, call: CompletedToolCall, outcome: ToolOutcome) {
        let (transport, modalities) = {
            let mut core = self.lock();
            if core.generation != generation {
                tracing::debug!(call_id = %call.call_id, "Dropping tool result for a retired transport");
                return;
            }
            let modalities = core
                .turn
                .as_ref()
                .map(|turn| turn.modalities.clone())
                .unwrap_or_else(|| core.options.modalities.clone());
            if let Some(turn) = core.turn.as_mut() {
                turn.pending_tools = turn.pending_tools.saturating_sub(1);
                turn.tool_round_trips += 1;
            }
            (core.transport.clone(), modalities)
        };

        let relayed = transport
            .ok_or(MurmurError::ChannelNotReady)
            .and_then(|transport| {
                transport.send(&ClientEvent::tool_output(&call.call_id, &outcome.to_value()))?;
                transport.send(&ClientEvent::continuation(modalities))
            });
        tracing::info!(
            tool = %call.name,
            call_id = %call.call_id,
            ok = outcome.is_ok(),
            relayed = relayed.is_ok(),
            "Tool result relayed"
        );

        if let Err(error) = relayed {
            self.hooks.report(&error);
            let failed = {
                let mut core = self.lock();
                if core.turn.as_ref().is_some_and(|turn| turn.sent) {
                    core.turn.take()
                } else {
                    None
                }
            };
            if let Some(turn) = failed {
                turn.resolve(Err(error));
            }
        }
        self.hooks.emit(HookEvent::ToolResult(call, outcome));
    }
}

async fn run_pump(
    inner: Weak<Inner>,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.handle_transport_event(generation, event);
    }
}
