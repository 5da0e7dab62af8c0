//! Control-channel demultiplexer: turns raw messages into session events.

use std::collections::{HashMap, HashSet};

use serde_json::{json, Value};

use super::wire::{classify_message, string_at, string_field, WireKind};

/// Aggregated, application-level events produced from the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A new model response began.
    ResponseStarted { response_id: Option<String> },
    TextDelta { delta: String, text: String },
    TextDone { text: String },
    UserTextDelta { delta: String, text: String },
    UserTextDone { text: String },
    /// A terminal signal for the current response.
    TurnEnded { had_tool_calls: bool },
    ToolCall(CompletedToolCall),
    /// In-band error, forwarded verbatim.
    Error(Value),
}

/// A tool invocation whose arguments have fully arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedToolCall {
    pub call_id: String,
    pub name: String,
    pub arguments: Value,
    /// Set when the concatenated arguments were not valid JSON.
    pub parse_error: Option<String>,
}

/// Append-only accumulator for one direction of one turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnBuffer {
    text: String,
    open: bool,
}

impl TurnBuffer {
    pub fn append(&mut self, fragment: &str) -> &str {
        self.open = true;
        self.text.push_str(fragment);
        &self.text
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Flush the buffer, returning its content when a turn was open.
    pub fn take(&mut self) -> Option<String> {
        if !self.open {
            return None;
        }
        self.open = false;
        Some(std::mem::take(&mut self.text))
    }

    pub fn clear(&mut self) {
        self.open = false;
        self.text.clear();
    }
}

/// A tool call whose arguments are still streaming.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingToolCall {
    pub name: Option<String>,
    pub arguments: String,
}

/// Classifies inbound messages and keeps per-direction turn state.
///
/// Messages must be fed in arrival order.
#[derive(Debug, Default)]
pub struct Demultiplexer {
    assistant: TurnBuffer,
    user: TurnBuffer,
    pending_calls: HashMap<String, PendingToolCall>,
    finished_calls: HashSet<String>,
    response_tool_calls: usize,
}

impl Demultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assistant_buffer(&self) -> &TurnBuffer {
        &self.assistant
    }

    pub fn user_buffer(&self) -> &TurnBuffer {
        &self.user
    }

    pub fn pending_call(&self, call_id: &str) -> Option<&PendingToolCall> {
        self.pending_calls.get(call_id)
    }

    /// Drop every in-flight buffer and pending call.
    pub fn reset(&mut self) {
        self.assistant.clear();
        self.user.clear();
        self.pending_calls.clear();
        self.finished_calls.clear();
        self.response_tool_calls = 0;
    }

    /// Parse one raw message. Non-JSON and unrecognized messages yield nothing.
    pub fn handle_raw(&mut self, raw: &str) -> Vec<SessionEvent> {
        match serde_json::from_str::<Value>(raw) {
            Ok(message) => self.handle(&message),
            Err(error) => {
                tracing::trace!(%error, "Ignoring non-JSON control message");
                Vec::new()
            }
        }
    }

    pub fn handle(&mut self, message: &Value) -> Vec<SessionEvent> {
        let Some((kind, payload)) = classify_message(message) else {
            if let Some(event_type) = message.get("type").and_then(Value::as_str) {
                tracing::trace!(event_type, "Ignoring unrecognized realtime event");
            }
            return Vec::new();
        };

        let mut out = Vec::new();
        match kind {
            WireKind::ResponseStarted => {
                if let Some(text) = self.assistant.take() {
                    tracing::debug!("New response started with unflushed assistant text");
                    out.push(SessionEvent::TextDone { text });
                }
                self.response_tool_calls = 0;
                out.push(SessionEvent::ResponseStarted {
                    response_id: string_at(payload, &["response", "id"]),
                });
            }
            WireKind::AssistantTextDelta => {
                if let Some(delta) = string_field(payload, "delta") {
                    let text = self.assistant.append(&delta).to_string();
                    out.push(SessionEvent::TextDelta { delta, text });
                }
            }
            WireKind::TextDone => {
                if let Some(text) = self.assistant.take() {
                    out.push(SessionEvent::TextDone { text });
                }
            }
            WireKind::TurnDone => {
                if let Some(text) = self.assistant.take() {
                    out.push(SessionEvent::TextDone { text });
                }
                out.push(SessionEvent::TurnEnded {
                    had_tool_calls: self.response_tool_calls > 0,
                });
                self.response_tool_calls = 0;
            }
            WireKind::UserSpeechStarted => {
                if let Some(text) = self.user.take() {
                    tracing::debug!("User speech started with unflushed transcript");
                    out.push(SessionEvent::UserTextDone { text });
                }
            }
            WireKind::UserTextDelta => {
                if let Some(delta) = string_field(payload, "delta") {
                    let text = self.user.append(&delta).to_string();
                    out.push(SessionEvent::UserTextDelta { delta, text });
                }
            }
            WireKind::UserTextDone => {
                let buffered = self.user.take().filter(|text| !text.is_empty());
                let text = buffered
                    .or_else(|| string_field(payload, "transcript"))
                    .unwrap_or_default();
                out.push(SessionEvent::UserTextDone { text });
            }
            WireKind::AudioStarted | WireKind::AudioStopped => {
                // Local playback events are authoritative for audio state.
                tracing::trace!(?kind, "Advisory audio marker");
            }
            WireKind::OutputItemAdded => self.register_function_call_item(payload),
            WireKind::ToolArgumentsDelta => self.append_tool_arguments(payload),
            WireKind::ToolArgumentsDone => {
                if let Some(call) = self.finish_tool_call(payload) {
                    out.push(SessionEvent::ToolCall(call));
                }
            }
            WireKind::Error => {
                let error = payload
                    .get("error")
                    .filter(|error| !error.is_null())
                    .cloned()
                    .unwrap_or_else(|| payload.clone());
                out.push(SessionEvent::Error(error));
            }
            WireKind::Wrapped => {}
        }
        out
    }

    fn register_function_call_item(&mut self, payload: &Value) {
        let Some(item) = payload.get("item") else {
            return;
        };
        if item.get("type").and_then(Value::as_str) != Some("function_call") {
            return;
        }
        let Some(call_id) = string_field(item, "call_id") else {
            return;
        };
        if self.finished_calls.contains(&call_id) {
            return;
        }
        let pending = self.pending_calls.entry(call_id).or_default();
        if let Some(name) = string_field(item, "name") {
            pending.name = Some(name);
        }
    }

    fn append_tool_arguments(&mut self, payload: &Value) {
        let Some(call_id) = call_id_of(payload) else {
            tracing::debug!("Tool argument delta without call id");
            return;
        };
        if self.finished_calls.contains(&call_id) {
            tracing::debug!(call_id, "Ignoring argument delta for finished tool call");
            return;
        }
        let pending = self.pending_calls.entry(call_id).or_default();
        if let Some(name) = string_field(payload, "name") {
            pending.name = Some(name);
        }
        if let Some(delta) = string_field(payload, "delta") {
            pending.arguments.push_str(&delta);
        }
    }

    fn finish_tool_call(&mut self, payload: &Value) -> Option<CompletedToolCall> {
        let call_id = call_id_of(payload)?;
        if !self.finished_calls.insert(call_id.clone()) {
            tracing::warn!(call_id, "Duplicate tool call completion ignored");
            return None;
        }
        let pending = self.pending_calls.remove(&call_id).unwrap_or_default();

        let raw = if pending.arguments.is_empty() {
            string_field(payload, "arguments").unwrap_or_default()
        } else {
            pending.arguments
        };
        let name = string_field(payload, "name")
            .or(pending.name)
            .unwrap_or_default();
        let (arguments, parse_error) = parse_arguments(&raw);
        if let Some(error) = &parse_error {
            tracing::warn!(call_id, tool = %name, %error, "Malformed tool arguments; using {{}}");
        }

        self.response_tool_calls += 1;
        Some(CompletedToolCall {
            call_id,
            name,
            arguments,
            parse_error,
        })
    }
}

fn call_id_of(payload: &Value) -> Option<String> {
    string_field(payload, "call_id").or_else(|| string_field(payload, "item_id"))
}

fn parse_arguments(raw: &str) -> (Value, Option<String>) {
    if raw.trim().is_empty() {
        return (json!({}), None);
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => (value, None),
        Err(error) => (json!({}), Some(error.to_string())),
    }
}
