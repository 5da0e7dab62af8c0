//! Ephemeral session credentials.

mod http;

pub use http::HttpCredentialBroker;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::MurmurError;

/// Short-lived bearer credential scoped to one realtime session.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredential {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub model: String,
    pub voice: String,
}

impl SessionCredential {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| exp <= now).unwrap_or(false)
    }
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("model", &self.model)
            .field("voice", &self.voice)
            .finish()
    }
}

/// Exchanges a server-held key for a per-session credential.
#[async_trait]
pub trait CredentialBroker: Send + Sync {
    async fn mint(&self, model: &str, voice: &str) -> Result<SessionCredential, MurmurError>;
}
