//! Tool registry that turns every outcome, panics included, into a result
//! the model can read.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::{json, Value};

use super::arguments::ToolArguments;
use super::tool::Tool;
use super::types::RealtimeToolSchema;
use super::validation::validate_arguments;
use crate::error::MurmurError;

/// Error code relayed for calls naming no registered tool.
pub const UNKNOWN_TOOL: &str = "unknown_tool";

/// Result shape relayed back into the session:
/// `{ok: true, result}` or `{ok: false, error}`.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Ok(Value),
    Err(String),
}

impl ToolOutcome {
    pub fn err(error: impl Into<String>) -> Self {
        Self::Err(error.into())
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Ok(_) => None,
            Self::Err(error) => Some(error),
        }
    }

    /// The wire shape relayed as the tool call's output.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Ok(result) => json!({ "ok": true, "result": result }),
            Self::Err(error) => json!({ "ok": false, "error": error }),
        }
    }
}

/// Name-keyed set of tools available to a session.
#[derive(Clone, Default)]
pub struct ToolExecutor {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        self.tools.insert(tool.name().to_string(), tool);
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Schemas of every registered tool, sorted by name.
    pub fn schemas(&self) -> Vec<RealtimeToolSchema> {
        let mut schemas: Vec<_> = self.tools.values().map(|tool| tool.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Run a tool. Never fails: every error becomes an error outcome.
    pub async fn execute(&self, name: &str, arguments: Value) -> ToolOutcome {
        let Some(tool) = self.tools.get(name) else {
            return ToolOutcome::err(UNKNOWN_TOOL);
        };

        if let Err(message) = validate_arguments(&arguments, &tool.parameters().schema) {
            tracing::debug!(tool = name, %message, "Rejected tool arguments");
            return ToolOutcome::err(format!("invalid_arguments: {message}"));
        }

        let args = ToolArguments::new(arguments);
        let run = AssertUnwindSafe(tool.execute(&args)).catch_unwind().await;
        match run {
            Ok(Ok(result)) => ToolOutcome::Ok(result),
            Ok(Err(error)) => {
                tracing::warn!(tool = name, %error, "Tool execution failed");
                ToolOutcome::err(error_message(error))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(tool = name, %message, "Tool panicked");
                ToolOutcome::err(format!("tool_panicked: {message}"))
            }
        }
    }
}

impl std::fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.tools.keys().collect();
        names.sort();
        f.debug_struct("ToolExecutor").field("tools", &names).finish()
    }
}

fn error_message(error: MurmurError) -> String {
    match error {
        MurmurError::ToolExecution { message, .. } => message,
        other => other.to_string(),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
