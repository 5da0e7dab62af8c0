//! Realtime session orchestration.

pub mod controller;
pub mod hooks;
pub mod options;

pub use controller::{SessionController, CONTEXT_PREAMBLE};
pub use hooks::SessionHooks;
pub use options::{
    default_modalities, SessionOptions, SessionState, SessionStatus, TurnOptions, TurnOutcome,
};
