//! Periodic note ingestion into an open session.
//!
//! Every tick samples the note through a [`NoteSource`] and injects it as
//! background context when it changed. Optionally, a tick may also ask the
//! model for spoken commentary. Ticks never queue: a tick that finds a turn
//! in flight, or a previous tick still running, is skipped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::{MurmurError, Result};
use crate::session::{SessionController, TurnOptions};
use crate::util::retry::rand_factor;

pub const DEFAULT_COMMENTARY_PROMPT: &str =
    "Offer one short, encouraging remark about what I have written so far.";

/// Timing and gating of the ingestion loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub enabled: bool,
    #[serde(with = "crate::config::duration_ms")]
    pub watch_interval: Duration,
    /// Minimum spacing between commentary requests.
    #[serde(with = "crate::config::duration_ms")]
    pub comment_interval: Duration,
    /// Edits more recent than this mean the user is still typing.
    #[serde(with = "crate::config::duration_ms")]
    pub quiet_period: Duration,
    /// Chance that an eligible tick asks for commentary.
    pub comment_probability: f64,
    pub commentary: bool,
    pub commentary_prompt: String,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            watch_interval: Duration::from_secs(5),
            comment_interval: Duration::from_secs(10),
            quiet_period: Duration::from_millis(1200),
            comment_probability: 0.3,
            commentary: false,
            commentary_prompt: DEFAULT_COMMENTARY_PROMPT.to_string(),
        }
    }
}

impl IngestionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.watch_interval.is_zero() {
            return Err(MurmurError::Configuration(
                "ingestion.watch_interval must be greater than zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.comment_probability) {
            return Err(MurmurError::Configuration(
                "ingestion.comment_probability must be between 0 and 1".into(),
            ));
        }
        Ok(())
    }
}

/// The current content of the note being edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteSnapshot {
    pub note_id: Option<String>,
    pub text: String,
    pub edited_at: Instant,
}

/// Supplies note snapshots; the host decides which note is current.
pub trait NoteSource: Send + Sync {
    fn snapshot(&self) -> Option<NoteSnapshot>;
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Disabled,
    /// A turn or an earlier tick is still running.
    Busy,
    Empty,
    /// The note was edited within the quiet period.
    Typing,
    Unchanged,
    /// The session channel is not open.
    NotConnected,
    Injected { commented: bool },
}

#[derive(Default)]
struct Memory {
    fingerprint: Option<[u8; 32]>,
    last_comment_at: Option<Instant>,
}

pub struct IngestionScheduler {
    controller: SessionController,
    source: Arc<dyn NoteSource>,
    config: IngestionConfig,
    running: AtomicBool,
    memory: Mutex<Memory>,
}

impl IngestionScheduler {
    pub fn new(
        controller: SessionController,
        source: Arc<dyn NoteSource>,
        config: IngestionConfig,
    ) -> Self {
        Self {
            controller,
            source,
            config,
            running: AtomicBool::new(false),
            memory: Mutex::new(Memory::default()),
        }
    }

    /// Run one ingestion pass.
    pub async fn tick(&self) -> TickOutcome {
        if !self.config.enabled {
            return TickOutcome::Disabled;
        }
        let Some(_running) = RunningGuard::acquire(&self.running) else {
            return TickOutcome::Busy;
        };
        if self.controller.turn_in_flight() {
            tracing::trace!("Skipping ingestion tick while a turn is in flight");
            return TickOutcome::Busy;
        }

        let Some(snapshot) = self.source.snapshot() else {
            return TickOutcome::Empty;
        };
        let text = snapshot.text.trim();
        if text.is_empty() {
            return TickOutcome::Empty;
        }
        let now = Instant::now();
        if now.saturating_duration_since(snapshot.edited_at) < self.config.quiet_period {
            return TickOutcome::Typing;
        }

        let fingerprint = fingerprint(snapshot.note_id.as_deref(), text);
        if self.memory().fingerprint == Some(fingerprint) {
            return TickOutcome::Unchanged;
        }
        if !self.controller.inject_context(text) {
            return TickOutcome::NotConnected;
        }
        self.memory().fingerprint = Some(fingerprint);
        tracing::debug!(note_id = ?snapshot.note_id, "Note snapshot ingested");

        let commented = self.should_comment(now) && self.comment().await;
        TickOutcome::Injected { commented }
    }

    fn should_comment(&self, now: Instant) -> bool {
        if !self.config.commentary {
            return false;
        }
        let mut memory = self.memory();
        let due = memory
            .last_comment_at
            .map_or(true, |at| now.saturating_duration_since(at) >= self.config.comment_interval);
        if !due || rand_factor() >= self.config.comment_probability {
            return false;
        }
        memory.last_comment_at = Some(now);
        true
    }

    async fn comment(&self) -> bool {
        match self
            .controller
            .send_turn(&self.config.commentary_prompt, TurnOptions::default())
            .await
        {
            Ok(_) => true,
            Err(error) => {
                // Already reported through the session's error hook.
                tracing::debug!(%error, "Commentary turn failed");
                false
            }
        }
    }

    fn memory(&self) -> std::sync::MutexGuard<'_, Memory> {
        self.memory
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Tick every `watch_interval` until the handle is stopped or dropped.
    pub fn spawn(self: Arc<Self>) -> IngestionHandle {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.watch_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let outcome = self.tick().await;
                        tracing::trace!(?outcome, "Ingestion tick");
                    }
                }
            }
        });
        IngestionHandle { shutdown, task }
    }
}

/// Stops the ingestion loop.
pub struct IngestionHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl IngestionHandle {
    pub async fn stop(mut self) {
        self.shutdown.cancel();
        let _ = (&mut self.task).await;
    }
}

impl Drop for IngestionHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        (!flag.swap(true, Ordering::SeqCst)).then_some(Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn fingerprint(note_id: Option<&str>, text: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(note_id.unwrap_or_default().as_bytes());
    hasher.update([0]);
    hasher.update(text.as_bytes());
    hasher.finalize().into()
}
