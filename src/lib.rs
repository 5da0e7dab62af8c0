//! Murmur: realtime conversational session core.
//!
//! Connects to a realtime speech model over a peer connection, demultiplexes
//! its event stream into assistant text, user transcripts and tool calls,
//! runs tools on the model's behalf, and feeds background note context into
//! the open session.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use murmur::prelude::*;
//!
//! # async fn example(backend: MediaBackend) -> murmur::error::Result<()> {
//! let config = MurmurConfig::load()?;
//! let session = SessionController::builder()
//!     .backend(backend)
//!     .broker(Arc::new(HttpCredentialBroker::from_config(&config)))
//!     .tools(ToolExecutor::new().with_tool(Arc::new(ImageGenerationTool::from_config(&config))))
//!     .hooks(SessionHooks::new().on_text_done(|text| println!("{text}")))
//!     .config(config)
//!     .build();
//!
//! session.connect().await?;
//! let outcome = session.send_turn("Hello!", TurnOptions::default()).await?;
//! println!("{}", outcome.text);
//! session.disconnect();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod credential;
pub mod error;
pub mod events;
pub mod http;
pub mod ingest;
pub mod prelude;
pub mod session;
pub mod tools;
pub mod transport;
pub mod util;
