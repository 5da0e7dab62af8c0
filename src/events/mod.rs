//! Realtime protocol events: inbound classification and outbound messages.

pub mod demux;
pub mod outbound;
pub mod wire;

pub use demux::{CompletedToolCall, Demultiplexer, PendingToolCall, SessionEvent, TurnBuffer};
pub use outbound::{ClientEvent, ClientEventBody, ConversationItem, ResponseRequest};
pub use wire::{classify, classify_message, WireKind, WIRE_EVENT_TABLE};
