use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::audio::DeviceError;
use crate::transport::TransportError;

/// Lifecycle of a voice session
///
/// Single source of truth for whether the microphone and the voice channel
/// are held. `Failed` is passed through on the way back to `Idle` once the
/// fault has been cleaned up; the machine never rests there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No resources held
    Idle,
    /// Acquiring microphone and voice channel
    Starting,
    /// Frames flowing in both directions
    Active,
    /// Releasing resources after a stop or remote close
    Stopping,
    /// A fault ended the session; resources are already released
    Failed(ErrorReason),
}

impl SessionState {
    /// True while holding hardware or network resources is legitimate
    pub fn holds_resources(&self) -> bool {
        matches!(
            self,
            SessionState::Starting | SessionState::Active | SessionState::Stopping
        )
    }
}

/// Why a session ended abnormally
///
/// Terminal for the session in question; the controller never retries on
/// its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    PermissionDenied,
    DeviceUnavailable,
    TransportConnectFailed,
    TransportDropped,
    InternalError,
}

impl ErrorReason {
    /// Compact label used in logs
    pub fn label(&self) -> &'static str {
        match self {
            ErrorReason::PermissionDenied => "permission_denied",
            ErrorReason::DeviceUnavailable => "device_unavailable",
            ErrorReason::TransportConnectFailed => "transport_connect_failed",
            ErrorReason::TransportDropped => "transport_dropped",
            ErrorReason::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Identity of one start-to-stop session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionHandle {
    id: Uuid,
    started_at: DateTime<Utc>,
}

impl SessionHandle {
    pub(crate) fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// Errors surfaced by the session controller
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// start() while a session is already starting or active
    #[error("a session is already running ({0:?})")]
    AlreadyRunning(SessionState),
    /// start() interrupted by stop() before activation
    #[error("session start cancelled")]
    Cancelled,
    /// Terminal session failure
    #[error("session failed ({reason}): {message}")]
    Failed {
        reason: ErrorReason,
        message: String,
    },
}

impl SessionError {
    /// The terminal failure reason, if this is one
    pub fn reason(&self) -> Option<ErrorReason> {
        match self {
            SessionError::Failed { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

impl From<DeviceError> for SessionError {
    fn from(err: DeviceError) -> Self {
        let reason = match &err {
            DeviceError::PermissionDenied(_) => ErrorReason::PermissionDenied,
            DeviceError::Unavailable(_) => ErrorReason::DeviceUnavailable,
        };
        SessionError::Failed {
            reason,
            message: err.to_string(),
        }
    }
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        let reason = match &err {
            TransportError::ConnectFailed(_) => ErrorReason::TransportConnectFailed,
            TransportError::Dropped(_) => ErrorReason::TransportDropped,
        };
        SessionError::Failed {
            reason,
            message: err.to_string(),
        }
    }
}
