//! Typed access to tool call arguments.

use serde_json::Value;

use crate::error::MurmurError;

/// Parsed arguments of one tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolArguments {
    value: Value,
}

impl ToolArguments {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    /// Get the raw JSON value.
    pub fn raw(&self) -> &Value {
        &self.value
    }

    /// Get a string argument by key.
    pub fn get_str(&self, key: &str) -> Result<&str, MurmurError> {
        self.get_str_opt(key)
            .ok_or_else(|| MurmurError::InvalidArgument(format!("Missing string argument: {key}")))
    }

    /// Get an optional string argument.
    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(Value::as_str)
    }

    /// Get an optional string argument with surrounding whitespace removed.
    /// Blank strings count as absent.
    pub fn get_trimmed(&self, key: &str) -> Option<&str> {
        self.get_str_opt(key)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, MurmurError> {
        self.value
            .get(key)
            .and_then(Value::as_bool)
            .ok_or_else(|| MurmurError::InvalidArgument(format!("Missing boolean argument: {key}")))
    }

    pub fn get_f64(&self, key: &str) -> Result<f64, MurmurError> {
        self.value
            .get(key)
            .and_then(Value::as_f64)
            .ok_or_else(|| MurmurError::InvalidArgument(format!("Missing number argument: {key}")))
    }

    /// Deserialize the entire arguments into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, MurmurError> {
        serde_json::from_value(self.value.clone()).map_err(|e| {
            MurmurError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
        })
    }
}

impl From<Value> for ToolArguments {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}
