use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{SessionId, TaskId};

/// Why the engine decided to schedule another attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryReason {
    EmptyResponse,
    Undecodable,
    StillProcessing,
    ServerError,
}

/// Structured lifecycle events broadcast by a poll engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PollEvent {
    /// A transport was attached for the session
    Connected {
        session_id: SessionId,
        restored: bool,
        at: DateTime<Utc>,
    },

    /// An upload was handed to the transport
    UploadStarted {
        session_id: SessionId,
        task_id: TaskId,
        at: DateTime<Utc>,
    },

    /// A retry was claimed and is waiting out the delay
    RetryScheduled {
        session_id: SessionId,
        attempts_remaining: i64,
        reason: RetryReason,
        at: DateTime<Utc>,
    },

    /// Poll finished with a result
    Completed {
        session_id: SessionId,
        at: DateTime<Utc>,
    },

    /// Poll finished without a result
    Failed {
        session_id: SessionId,
        at: DateTime<Utc>,
    },

    /// The restore continuation ran after the transport flushed its events
    ContinuationInvoked {
        session_id: SessionId,
        at: DateTime<Utc>,
    },
}

impl PollEvent {
    /// Get event type name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::UploadStarted { .. } => "upload_started",
            Self::RetryScheduled { .. } => "retry_scheduled",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::ContinuationInvoked { .. } => "continuation_invoked",
        }
    }

    /// Get the session ID from any event
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::Connected { session_id, .. }
            | Self::UploadStarted { session_id, .. }
            | Self::RetryScheduled { session_id, .. }
            | Self::Completed { session_id, .. }
            | Self::Failed { session_id, .. }
            | Self::ContinuationInvoked { session_id, .. } => session_id,
        }
    }

    /// Get the timestamp from any event
    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::Connected { at, .. }
            | Self::UploadStarted { at, .. }
            | Self::RetryScheduled { at, .. }
            | Self::Completed { at, .. }
            | Self::Failed { at, .. }
            | Self::ContinuationInvoked { at, .. } => at,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}
