//! Normalization of inbound wire spellings into logical event kinds.
//!
//! Every known `type` string maps to exactly one [`WireKind`] through
//! [`WIRE_EVENT_TABLE`]. New spellings are added there and nowhere else.

use serde_json::Value;

/// Logical category of an inbound control-channel message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireKind {
    ResponseStarted,
    AssistantTextDelta,
    /// A text or transcript content part finished; the response may continue.
    TextDone,
    /// The whole response finished.
    TurnDone,
    UserSpeechStarted,
    UserTextDelta,
    UserTextDone,
    AudioStarted,
    AudioStopped,
    OutputItemAdded,
    ToolArgumentsDelta,
    ToolArgumentsDone,
    Error,
    /// Envelope whose `delta` object carries its own `type`.
    Wrapped,
}

/// Wire spelling to logical kind.
pub const WIRE_EVENT_TABLE: &[(&str, WireKind)] = &[
    ("response.created", WireKind::ResponseStarted),
    ("response.output_text.delta", WireKind::AssistantTextDelta),
    ("response.text.delta", WireKind::AssistantTextDelta),
    ("response.audio_transcript.delta", WireKind::AssistantTextDelta),
    ("response.output_audio_transcript.delta", WireKind::AssistantTextDelta),
    ("response.output_text.done", WireKind::TextDone),
    ("response.text.done", WireKind::TextDone),
    ("response.audio_transcript.done", WireKind::TextDone),
    ("response.output_audio_transcript.done", WireKind::TextDone),
    ("response.completed", WireKind::TurnDone),
    ("response.done", WireKind::TurnDone),
    ("input_audio_buffer.speech_started", WireKind::UserSpeechStarted),
    ("conversation.item.input_audio_transcription.delta", WireKind::UserTextDelta),
    ("conversation.item.input_audio_transcription.completed", WireKind::UserTextDone),
    ("response.output_audio.started", WireKind::AudioStarted),
    ("output_audio_buffer.started", WireKind::AudioStarted),
    ("response.output_audio.completed", WireKind::AudioStopped),
    ("output_audio_buffer.stopped", WireKind::AudioStopped),
    ("response.output_item.added", WireKind::OutputItemAdded),
    ("response.function_call_arguments.delta", WireKind::ToolArgumentsDelta),
    ("response.function_call_arguments.done", WireKind::ToolArgumentsDone),
    ("error", WireKind::Error),
    ("response.delta", WireKind::Wrapped),
];

/// Look up the logical kind of a wire `type`.
pub fn classify(event_type: &str) -> Option<WireKind> {
    WIRE_EVENT_TABLE
        .iter()
        .find(|(spelling, _)| *spelling == event_type)
        .map(|(_, kind)| *kind)
}

/// Classify a parsed message, unwrapping envelopes.
///
/// Returns the kind together with the object that carries the payload
/// (the inner object for wrapped messages). A message with an embedded
/// `error` field is an error whatever its `type`.
pub fn classify_message(message: &Value) -> Option<(WireKind, &Value)> {
    if message.get("error").is_some_and(|error| !error.is_null()) {
        return Some((WireKind::Error, message));
    }
    let event_type = message.get("type")?.as_str()?;
    match classify(event_type)? {
        WireKind::Wrapped => {
            let inner = message.get("delta").filter(|inner| inner.is_object())?;
            match classify_message(inner)? {
                (WireKind::Wrapped, _) => None,
                found => Some(found),
            }
        }
        kind => Some((kind, message)),
    }
}

pub(crate) fn string_field(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

pub(crate) fn string_at(value: &Value, path: &[&str]) -> Option<String> {
    let mut current = value;
    for key in path {
        current = current.get(*key)?;
    }
    current.as_str().map(ToString::to_string)
}
