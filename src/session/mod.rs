//! Live voice session management
//!
//! This module provides the `SessionController` abstraction that manages:
//! - Concurrent acquisition of microphone and voice channel
//! - The frame pump (capture out, synthesized audio in)
//! - Loudness updates for the visualizer
//! - Deterministic teardown on stop, remote close, and faults
//! - Session statistics and state observation

mod config;
mod controller;
mod state;
mod stats;

pub use config::SessionConfig;
pub use controller::SessionController;
pub use state::{ErrorReason, SessionError, SessionHandle, SessionState};
pub use stats::SessionStats;
