//! Tools the model can call during a realtime session.

pub mod arguments;
pub mod executor;
#[cfg(feature = "image-tool")]
pub mod image;
pub mod tool;
pub mod types;
pub mod validation;

pub use arguments::ToolArguments;
pub use executor::{ToolExecutor, ToolOutcome, UNKNOWN_TOOL};
#[cfg(feature = "image-tool")]
pub use image::{GeneratedImage, ImageGenerationTool, ImageSink, IMAGE_TOOL_NAME};
pub use tool::{FnTool, Tool};
pub use types::{ParameterBuilder, RealtimeToolSchema, ToolParameters};
