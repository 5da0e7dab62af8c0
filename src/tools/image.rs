//! `generate_image`: image generation through a server-side proxy.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::arguments::ToolArguments;
use super::tool::Tool;
use super::types::ToolParameters;
use crate::config::MurmurConfig;
use crate::error::MurmurError;
use crate::http::shared_client;
use crate::util::timeout::with_timeout;

pub const IMAGE_TOOL_NAME: &str = "generate_image";

/// Sizes the model may request.
pub const IMAGE_SIZES: &[&str] = &["512x512", "1024x1024", "2048x2048"];

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// An image returned by the proxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImage {
    /// `data:image/png;base64,...` URI (or bare base64).
    pub image_base64: String,
    pub prompt: String,
    pub size: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revised_prompt: Option<String>,
}

impl GeneratedImage {
    /// Decode the image bytes from the data URI payload.
    pub fn decode_png(&self) -> Result<Vec<u8>, MurmurError> {
        let payload = match self.image_base64.split_once(";base64,") {
            Some((_, data)) => data,
            None => self.image_base64.as_str(),
        };
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| MurmurError::InvalidArgument(format!("Invalid image payload: {e}")))
    }
}

/// Receives every successfully generated image.
pub type ImageSink = Arc<dyn Fn(&GeneratedImage) + Send + Sync>;

#[derive(Debug, Deserialize)]
struct ProxyResponse {
    image_base64: Option<String>,
    revised_prompt: Option<String>,
}

pub struct ImageGenerationTool {
    endpoint: String,
    default_size: String,
    timeout: Duration,
    parameters: ToolParameters,
    sink: Option<ImageSink>,
}

impl ImageGenerationTool {
    pub fn new(endpoint: impl Into<String>, default_size: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            default_size: default_size.into(),
            timeout: DEFAULT_TIMEOUT,
            parameters: ToolParameters::object()
                .string("prompt", "Detailed image prompt", true)
                .string_enum("size", "Image size", IMAGE_SIZES, false)
                .build(),
            sink: None,
        }
    }

    pub fn from_config(config: &MurmurConfig) -> Self {
        Self::new(config.image_endpoint.clone(), config.image_default_size.clone())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_sink(mut self, sink: impl Fn(&GeneratedImage) + Send + Sync + 'static) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    async fn request(&self, prompt: &str, size: &str) -> Result<ProxyResponse, MurmurError> {
        with_timeout(self.timeout, async {
            let response = shared_client()
                .post(&self.endpoint)
                .json(&json!({ "prompt": prompt, "size": size }))
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let detail = response.text().await.unwrap_or_default();
                return Err(MurmurError::tool(
                    IMAGE_TOOL_NAME,
                    format!("image_generation_failed (status {}): {detail}", status.as_u16()),
                ));
            }
            Ok(response.json::<ProxyResponse>().await?)
        })
        .await
    }
}

#[async_trait]
impl Tool for ImageGenerationTool {
    fn name(&self) -> &str {
        IMAGE_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Generate an image with the given prompt and optional size."
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    async fn execute(&self, args: &ToolArguments) -> Result<Value, MurmurError> {
        let Some(prompt) = args.get_trimmed("prompt") else {
            return Err(MurmurError::tool(IMAGE_TOOL_NAME, "missing_prompt"));
        };
        let size = args.get_trimmed("size").unwrap_or(&self.default_size);

        let response = self.request(prompt, size).await?;
        let image_base64 = response
            .image_base64
            .filter(|data| !data.is_empty())
            .ok_or_else(|| MurmurError::tool(IMAGE_TOOL_NAME, "image_generation_failed: empty image"))?;

        let image = GeneratedImage {
            image_base64,
            prompt: prompt.to_string(),
            size: size.to_string(),
            revised_prompt: response.revised_prompt,
        };
        tracing::info!(size = %image.size, "Generated image");
        if let Some(sink) = &self.sink {
            sink(&image);
        }
        Ok(serde_json::to_value(&image)?)
    }
}

impl std::fmt::Debug for ImageGenerationTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageGenerationTool")
            .field("endpoint", &self.endpoint)
            .field("default_size", &self.default_size)
            .finish()
    }
}
