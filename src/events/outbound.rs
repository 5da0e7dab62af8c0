//! Client events written to the control channel.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::tools::RealtimeToolSchema;

/// One outbound control message. Every message carries a fresh `event_id`.
#[derive(Debug, Clone, Serialize)]
pub struct ClientEvent {
    pub event_id: String,
    #[serde(flatten)]
    pub body: ClientEventBody,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientEventBody {
    #[serde(rename = "response.create")]
    ResponseCreate { response: ResponseRequest },
    #[serde(rename = "response.cancel")]
    ResponseCancel,
    #[serde(rename = "conversation.item.create")]
    ItemCreate { item: ConversationItem },
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionUpdate },
}

/// Payload of `response.create`.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ResponseRequest {
    pub modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<RealtimeToolSchema>>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    /// Empty for continuations after a tool result.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub input: Vec<ConversationItem>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationItem {
    Message {
        role: String,
        content: Vec<ContentPart>,
    },
    FunctionCallOutput {
        call_id: String,
        /// JSON-encoded tool outcome.
        output: String,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    InputText { text: String },
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SessionUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<TranscriptionSettings>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TranscriptionSettings {
    pub model: String,
}

impl ClientEvent {
    pub fn new(body: ClientEventBody) -> Self {
        Self {
            event_id: format!("evt_{}", uuid::Uuid::new_v4().simple()),
            body,
        }
    }

    /// Ask for a response to a new user text.
    pub fn user_turn(text: &str, response: ResponseRequest) -> Self {
        let response = ResponseRequest {
            input: vec![ConversationItem::user_text(text)],
            ..response
        };
        Self::new(ClientEventBody::ResponseCreate { response })
    }

    /// Ask the model to continue after tool results.
    pub fn continuation(modalities: Vec<String>) -> Self {
        Self::new(ClientEventBody::ResponseCreate {
            response: ResponseRequest {
                modalities,
                ..ResponseRequest::default()
            },
        })
    }

    /// Add a user message to the conversation without requesting a response.
    pub fn context(text: &str) -> Self {
        Self::new(ClientEventBody::ItemCreate {
            item: ConversationItem::user_text(text),
        })
    }

    pub fn tool_output(call_id: impl Into<String>, output: &Value) -> Self {
        Self::new(ClientEventBody::ItemCreate {
            item: ConversationItem::FunctionCallOutput {
                call_id: call_id.into(),
                output: output.to_string(),
            },
        })
    }

    pub fn cancel() -> Self {
        Self::new(ClientEventBody::ResponseCancel)
    }

    pub fn enable_transcription(model: impl Into<String>) -> Self {
        Self::new(ClientEventBody::SessionUpdate {
            session: SessionUpdate {
                input_audio_transcription: Some(TranscriptionSettings {
                    model: model.into(),
                }),
            },
        })
    }
}

impl ConversationItem {
    pub fn user_text(text: &str) -> Self {
        Self::Message {
            role: "user".into(),
            content: vec![ContentPart::InputText {
                text: text.to_string(),
            }],
        }
    }
}
