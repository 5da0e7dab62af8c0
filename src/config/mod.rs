//! Configuration system (layered: defaults < config file < environment).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MurmurError, Result};
use crate::ingest::IngestionConfig;
use crate::util::retry::RetryPolicy;

pub const DEFAULT_REALTIME_ENDPOINT: &str = "https://api.openai.com/v1/realtime";
pub const DEFAULT_CREDENTIAL_ENDPOINT: &str = "http://localhost:3000/api/realtime-session";
pub const DEFAULT_IMAGE_ENDPOINT: &str = "http://localhost:3000/api/generate-image";
pub const DEFAULT_MODEL: &str = "gpt-4o-realtime-preview";
pub const DEFAULT_VOICE: &str = "alloy";
pub const DEFAULT_IMAGE_SIZE: &str = "1024x1024";

/// Layered configuration for a realtime session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MurmurConfig {
    /// Endpoint that mints ephemeral session credentials.
    pub credential_endpoint: String,
    /// Realtime SDP endpoint; the model is appended as a query parameter.
    pub realtime_endpoint: String,
    /// Image-generation proxy endpoint.
    pub image_endpoint: String,
    pub model: String,
    pub voice: String,
    /// Default size requested from the image tool when the model omits one.
    pub image_default_size: String,
    #[serde(with = "duration_ms")]
    pub channel_open_timeout: Duration,
    #[serde(with = "duration_ms")]
    pub turn_timeout: Duration,
    pub send_retry: RetryPolicy,
    pub ingestion: IngestionConfig,
}

impl Default for MurmurConfig {
    fn default() -> Self {
        Self {
            credential_endpoint: DEFAULT_CREDENTIAL_ENDPOINT.to_string(),
            realtime_endpoint: DEFAULT_REALTIME_ENDPOINT.to_string(),
            image_endpoint: DEFAULT_IMAGE_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            image_default_size: DEFAULT_IMAGE_SIZE.to_string(),
            channel_open_timeout: Duration::from_secs(10),
            turn_timeout: Duration::from_secs(60),
            send_retry: RetryPolicy::default(),
            ingestion: IngestionConfig::default(),
        }
    }
}

impl MurmurConfig {
    /// Load defaults, then the user config file (if any), then environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match default_config_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file. Missing keys fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply environment overrides using `lookup` to resolve variables.
    ///
    /// `MURMUR_*` variables win over the deployment-level fallbacks.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |keys: &[&str]| {
            keys.iter()
                .filter_map(|key| lookup(key))
                .find(|value| !value.trim().is_empty())
        };

        if let Some(url) = first(&["MURMUR_CREDENTIAL_ENDPOINT"]) {
            self.credential_endpoint = url;
        }
        if let Some(url) = first(&["MURMUR_REALTIME_ENDPOINT"]) {
            self.realtime_endpoint = url;
        }
        if let Some(url) = first(&["MURMUR_IMAGE_ENDPOINT"]) {
            self.image_endpoint = url;
        }
        if let Some(model) = first(&["MURMUR_REALTIME_MODEL", "OPENAI_REALTIME_MODEL"]) {
            self.model = model;
        }
        if let Some(voice) = first(&["MURMUR_REALTIME_VOICE", "OPENAI_REALTIME_VOICE"]) {
            self.voice = voice;
        }
        if let Some(size) = first(&["MURMUR_IMAGE_SIZE", "IMAGE_SIZE"]) {
            self.image_default_size = size;
        }
        if let Some(ms) = first(&["MURMUR_CHANNEL_OPEN_TIMEOUT_MS"]).and_then(|v| v.parse().ok()) {
            self.channel_open_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = first(&["MURMUR_TURN_TIMEOUT_MS"]).and_then(|v| v.parse().ok()) {
            self.turn_timeout = Duration::from_millis(ms);
        }
    }

    /// Reject configurations that cannot produce a working session.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("credential_endpoint", &self.credential_endpoint),
            ("realtime_endpoint", &self.realtime_endpoint),
            ("model", &self.model),
            ("voice", &self.voice),
        ] {
            if value.trim().is_empty() {
                return Err(MurmurError::Configuration(format!("{name} cannot be empty")));
            }
        }
        if self.channel_open_timeout.is_zero() || self.turn_timeout.is_zero() {
            return Err(MurmurError::Configuration(
                "timeouts must be greater than zero".into(),
            ));
        }
        self.ingestion.validate()
    }
}

/// `<config dir>/murmur/config.toml`, when a home directory is known.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "murmur")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Serialize a [`Duration`] as integer milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
