//! Credential broker client for the `/api/realtime-session` proxy.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::json;

use super::{CredentialBroker, SessionCredential};
use crate::config::MurmurConfig;
use crate::error::MurmurError;
use crate::http::shared_client;
use crate::util::timeout::with_timeout;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Mints credentials by POSTing `{model, voice}` to a broker endpoint.
#[derive(Debug, Clone)]
pub struct HttpCredentialBroker {
    endpoint: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    client_secret: Option<ClientSecret>,
}

#[derive(Debug, Deserialize)]
struct ClientSecret {
    value: Option<String>,
    expires_at: Option<i64>,
}

impl HttpCredentialBroker {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_config(config: &MurmurConfig) -> Self {
        Self::new(config.credential_endpoint.clone())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl CredentialBroker for HttpCredentialBroker {
    async fn mint(&self, model: &str, voice: &str) -> Result<SessionCredential, MurmurError> {
        let body = with_timeout(self.timeout, async {
            let response = shared_client()
                .post(&self.endpoint)
                .json(&json!({ "model": model, "voice": voice }))
                .send()
                .await?;

            let status = response.status();
            let text = response.text().await?;
            if !status.is_success() {
                return Err(MurmurError::credential(status.as_u16(), text));
            }
            Ok(text)
        })
        .await?;

        let credential = parse_session_response(&body, model, voice)?;
        tracing::debug!(
            model,
            voice,
            expires_at = ?credential.expires_at,
            "Minted realtime session credential"
        );
        Ok(credential)
    }
}

fn parse_session_response(
    body: &str,
    model: &str,
    voice: &str,
) -> Result<SessionCredential, MurmurError> {
    let parsed: SessionResponse = serde_json::from_str(body).map_err(|error| {
        MurmurError::Protocol(format!("Invalid realtime session response: {error}"))
    })?;
    let secret = parsed.client_secret.ok_or_else(|| {
        MurmurError::Protocol("Invalid realtime session: missing client_secret".into())
    })?;
    let token = secret
        .value
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| {
            MurmurError::Protocol("Invalid realtime session: missing client_secret.value".into())
        })?;

    Ok(SessionCredential {
        token,
        expires_at: secret.expires_at.and_then(timestamp_to_utc),
        model: model.to_string(),
        voice: voice.to_string(),
    })
}

fn timestamp_to_utc(seconds: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(seconds, 0).single()
}
