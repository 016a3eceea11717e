use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::state::SessionState;

/// Point-in-time statistics for a session controller
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    /// Current lifecycle state
    pub state: SessionState,

    /// Identity of the current (or most recent) session
    pub session_id: Option<Uuid>,

    /// When that session started
    pub started_at: Option<DateTime<Utc>>,

    /// Seconds since started_at (0 when no session has run)
    pub duration_secs: f64,

    /// Frames received from capture this session
    pub frames_captured: u64,

    /// Frames handed to the transport this session
    pub frames_forwarded: u64,

    /// Frames discarded by the bounded outbound queue
    pub frames_dropped: u64,

    /// Synthesized chunks received from the service
    pub chunks_received: u64,
}
