//! SDP offer/answer exchange with the realtime endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderValue;

use crate::config::MurmurConfig;
use crate::credential::SessionCredential;
use crate::error::MurmurError;
use crate::http::{bearer_headers, shared_client};
use crate::util::timeout::with_timeout;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Trades a local offer for the remote answer, authenticated by a credential.
#[async_trait]
pub trait SdpExchange: Send + Sync {
    async fn exchange(
        &self,
        credential: &SessionCredential,
        offer_sdp: &str,
    ) -> Result<String, MurmurError>;
}

/// Posts the offer as `application/sdp` to `<endpoint>?model=<model>`.
#[derive(Debug, Clone)]
pub struct HttpSdpExchange {
    endpoint: String,
    timeout: Duration,
}

impl HttpSdpExchange {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_config(config: &MurmurConfig) -> Self {
        Self::new(config.realtime_endpoint.clone())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl SdpExchange for HttpSdpExchange {
    async fn exchange(
        &self,
        credential: &SessionCredential,
        offer_sdp: &str,
    ) -> Result<String, MurmurError> {
        let mut headers = bearer_headers(&credential.token, "application/sdp");
        headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        with_timeout(self.timeout, async {
            let response = shared_client()
                .post(self.endpoint.trim())
                .query(&[("model", credential.model.as_str())])
                .headers(headers)
                .body(offer_sdp.to_string())
                .send()
                .await
                .map_err(|error| MurmurError::Handshake(format!("SDP request failed: {error}")))?;

            let status = response.status();
            let text = response.text().await.map_err(|error| {
                MurmurError::Handshake(format!("SDP answer could not be read: {error}"))
            })?;
            if !status.is_success() {
                return Err(MurmurError::Handshake(format!(
                    "Realtime SDP exchange failed: {} {text}",
                    status.as_u16()
                )));
            }
            if text.trim().is_empty() {
                return Err(MurmurError::Handshake("Realtime SDP answer was empty".into()));
            }
            Ok(text)
        })
        .await
    }
}
