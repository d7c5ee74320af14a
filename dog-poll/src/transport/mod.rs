pub mod memory;

#[cfg(feature = "http")]
pub mod http;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::{staging::StagedPayload, PollRequest, PollResult, SessionId, TaskId};

/// Callbacks a transport delivers for its session, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Response bytes for an upload task (may be empty)
    Data { task_id: TaskId, bytes: Bytes },

    /// An upload task ended, with an error if the transfer failed
    TaskCompleted {
        task_id: TaskId,
        error: Option<String>,
    },

    /// Every event buffered while the process was away has been redelivered
    EventsFlushed,
}

/// Where a transport sends its events
pub type EventSink = mpsc::UnboundedSender<TransportEvent>;

/// Background-capable upload session bound to one engine
#[async_trait]
pub trait Transport: Send + Sync {
    /// Begin uploading a staged payload against `request`.
    ///
    /// Returns once the transfer is handed off; the response arrives later
    /// as [`TransportEvent`]s on the session's sink.
    async fn start_upload(&self, request: &PollRequest, payload: StagedPayload) -> PollResult<TaskId>;

    /// Cancel outstanding work and stop delivering events
    fn invalidate(&self);

    fn session_id(&self) -> &SessionId;
}

/// Opens (or re-opens) the named session and wires it to an event sink.
///
/// Connecting to a session that already has work in flight must redeliver
/// whatever it buffered, then send [`TransportEvent::EventsFlushed`].
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn connect(&self, session_id: &SessionId, sink: EventSink) -> PollResult<Arc<dyn Transport>>;
}
