//! Application callbacks. The only way the session reports to its host.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use super::options::SessionStatus;
use crate::error::MurmurError;
use crate::events::CompletedToolCall;
use crate::tools::ToolOutcome;

pub type TextHook = Arc<dyn Fn(&str) + Send + Sync>;
/// Receives `(fragment, cumulative_text)`.
pub type DeltaHook = Arc<dyn Fn(&str, &str) + Send + Sync>;
pub type SignalHook = Arc<dyn Fn() + Send + Sync>;
pub type ToolCallHook = Arc<dyn Fn(&CompletedToolCall) + Send + Sync>;
pub type ToolResultHook = Arc<dyn Fn(&CompletedToolCall, &ToolOutcome) + Send + Sync>;
pub type ErrorHook = Arc<dyn Fn(&MurmurError) + Send + Sync>;
pub type StatusHook = Arc<dyn Fn(&SessionStatus) + Send + Sync>;

/// Named callbacks. Unset hooks are skipped; a panicking hook is logged and
/// does not disturb the session.
#[derive(Clone, Default)]
pub struct SessionHooks {
    text_delta: Option<DeltaHook>,
    text_done: Option<TextHook>,
    user_text_delta: Option<DeltaHook>,
    user_text_done: Option<TextHook>,
    audio_start: Option<SignalHook>,
    audio_end: Option<SignalHook>,
    /// Calls naming tools the executor does not know.
    tool_call: Option<ToolCallHook>,
    tool_result: Option<ToolResultHook>,
    autoplay_blocked: Option<TextHook>,
    error: Option<ErrorHook>,
    state_change: Option<StatusHook>,
}

impl SessionHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_text_delta(mut self, hook: impl Fn(&str, &str) + Send + Sync + 'static) -> Self {
        self.text_delta = Some(Arc::new(hook));
        self
    }

    pub fn on_text_done(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.text_done = Some(Arc::new(hook));
        self
    }

    pub fn on_user_text_delta(mut self, hook: impl Fn(&str, &str) + Send + Sync + 'static) -> Self {
        self.user_text_delta = Some(Arc::new(hook));
        self
    }

    pub fn on_user_text_done(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.user_text_done = Some(Arc::new(hook));
        self
    }

    pub fn on_audio_start(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.audio_start = Some(Arc::new(hook));
        self
    }

    pub fn on_audio_end(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.audio_end = Some(Arc::new(hook));
        self
    }

    pub fn on_tool_call(
        mut self,
        hook: impl Fn(&CompletedToolCall) + Send + Sync + 'static,
    ) -> Self {
        self.tool_call = Some(Arc::new(hook));
        self
    }

    pub fn on_tool_result(
        mut self,
        hook: impl Fn(&CompletedToolCall, &ToolOutcome) + Send + Sync + 'static,
    ) -> Self {
        self.tool_result = Some(Arc::new(hook));
        self
    }

    pub fn on_autoplay_blocked(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.autoplay_blocked = Some(Arc::new(hook));
        self
    }

    pub fn on_error(mut self, hook: impl Fn(&MurmurError) + Send + Sync + 'static) -> Self {
        self.error = Some(Arc::new(hook));
        self
    }

    pub fn on_state_change(mut self, hook: impl Fn(&SessionStatus) + Send + Sync + 'static) -> Self {
        self.state_change = Some(Arc::new(hook));
        self
    }

    pub(crate) fn emit(&self, event: HookEvent) {
        let name = event.name();
        let outcome = catch_unwind(AssertUnwindSafe(|| self.dispatch(event)));
        if outcome.is_err() {
            tracing::error!(hook = name, "Session hook panicked");
        }
    }

    /// Fire the error hook for an error the caller keeps ownership of.
    pub(crate) fn report(&self, error: &MurmurError) {
        if let Some(hook) = &self.error {
            if catch_unwind(AssertUnwindSafe(|| hook(error))).is_err() {
                tracing::error!(hook = "error", "Session hook panicked");
            }
        }
    }

    pub(crate) fn emit_all(&self, events: Vec<HookEvent>) {
        for event in events {
            self.emit(event);
        }
    }

    fn dispatch(&self, event: HookEvent) {
        match event {
            HookEvent::TextDelta { delta, text } => {
                if let Some(hook) = &self.text_delta {
                    hook(&delta, &text);
                }
            }
            HookEvent::TextDone(text) => {
                if let Some(hook) = &self.text_done {
                    hook(&text);
                }
            }
            HookEvent::UserTextDelta { delta, text } => {
                if let Some(hook) = &self.user_text_delta {
                    hook(&delta, &text);
                }
            }
            HookEvent::UserTextDone(text) => {
                if let Some(hook) = &self.user_text_done {
                    hook(&text);
                }
            }
            HookEvent::AudioStart => {
                if let Some(hook) = &self.audio_start {
                    hook();
                }
            }
            HookEvent::AudioEnd => {
                if let Some(hook) = &self.audio_end {
                    hook();
                }
            }
            HookEvent::UnhandledToolCall(call) => match &self.tool_call {
                Some(hook) => hook(&call),
                None => tracing::warn!(tool = %call.name, call_id = %call.call_id, "Unhandled tool call"),
            },
            HookEvent::ToolResult(call, outcome) => {
                if let Some(hook) = &self.tool_result {
                    hook(&call, &outcome);
                }
            }
            HookEvent::AutoplayBlocked(reason) => {
                if let Some(hook) = &self.autoplay_blocked {
                    hook(&reason);
                }
            }
            HookEvent::Error(error) => {
                if let Some(hook) = &self.error {
                    hook(&error);
                }
            }
            HookEvent::Status(status) => {
                if let Some(hook) = &self.state_change {
                    hook(&status);
                }
            }
        }
    }
}

impl std::fmt::Debug for SessionHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHooks").finish_non_exhaustive()
    }
}

/// A hook invocation collected while controller state is locked and fired
/// after the lock is released.
#[derive(Debug)]
pub(crate) enum HookEvent {
    TextDelta { delta: String, text: String },
    TextDone(String),
    UserTextDelta { delta: String, text: String },
    UserTextDone(String),
    AudioStart,
    AudioEnd,
    UnhandledToolCall(CompletedToolCall),
    ToolResult(CompletedToolCall, ToolOutcome),
    AutoplayBlocked(String),
    Error(MurmurError),
    Status(SessionStatus),
}

impl HookEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::TextDelta { .. } => "text_delta",
            Self::TextDone(_) => "text_done",
            Self::UserTextDelta { .. } => "user_text_delta",
            Self::UserTextDone(_) => "user_text_done",
            Self::AudioStart => "audio_start",
            Self::AudioEnd => "audio_end",
            Self::UnhandledToolCall(_) => "tool_call",
            Self::ToolResult(..) => "tool_result",
            Self::AutoplayBlocked(_) => "autoplay_blocked",
            Self::Error(_) => "error",
            Self::Status(_) => "state_change",
        }
    }
}
