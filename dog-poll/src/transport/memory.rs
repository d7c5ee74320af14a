use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::{
    staging::StagedPayload,
    transport::{EventSink, Transport, TransportEvent, TransportFactory},
    PollError, PollRequest, PollResult, SessionId, TaskId,
};

/// What the fake server answers to the next upload of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedResponse {
    /// Deliver these bytes, then a clean task completion
    Body(Bytes),
    /// Deliver an empty payload, then a clean task completion
    Empty,
    /// Deliver no bytes, only a task completion carrying this error
    Failure(String),
    /// Deliver nothing; the test injects events itself
    Silent,
}

impl ScriptedResponse {
    /// JSON body of the form `{"status": token}`
    pub fn status(token: &str) -> Self {
        Self::json(serde_json::json!({ "status": token }))
    }

    pub fn json(value: serde_json::Value) -> Self {
        Self::Body(Bytes::from(value.to_string()))
    }
}

/// An upload the fake server received
#[derive(Debug, Clone)]
pub struct UploadRecord {
    pub task_id: TaskId,
    pub method: String,
    pub url: String,
    pub body: Vec<u8>,
    /// Which connection of the session issued the upload
    pub generation: u64,
}

#[derive(Default)]
struct SessionState {
    sink: Option<EventSink>,
    generation: u64,
    connects: u32,
    invalidated: bool,
    buffered: Vec<TransportEvent>,
    script: VecDeque<ScriptedResponse>,
    uploads: Vec<UploadRecord>,
}

impl SessionState {
    /// Send to the attached engine, or buffer until the next connect
    fn emit(&mut self, event: TransportEvent) {
        if self.invalidated {
            return;
        }

        let event = match &self.sink {
            Some(sink) => match sink.send(event) {
                Ok(()) => return,
                Err(returned) => returned.0,
            },
            None => event,
        };

        // nobody attached: keep it for redelivery
        self.sink = None;
        self.buffered.push(event);
    }
}

/// In-memory background session hub for testing and development.
///
/// Sessions are keyed by [`SessionId`] and outlive any single engine, the
/// way an OS-managed background session outlives the process that created
/// it. Events emitted while no engine is attached are buffered and
/// redelivered, followed by [`TransportEvent::EventsFlushed`], on the next
/// connect.
#[derive(Clone, Default)]
pub struct MemorySessions {
    sessions: Arc<Mutex<HashMap<SessionId, SessionState>>>,
}

impl MemorySessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue server answers for upcoming uploads; unscripted uploads get
    /// [`ScriptedResponse::Empty`]
    pub fn script<I>(&self, session_id: &SessionId, responses: I)
    where
        I: IntoIterator<Item = ScriptedResponse>,
    {
        let mut sessions = self.sessions.lock();
        let state = sessions.entry(session_id.clone()).or_default();
        state.script.extend(responses);
    }

    /// Inject an arbitrary event, as if the OS delivered it
    pub fn deliver(&self, session_id: &SessionId, event: TransportEvent) {
        let mut sessions = self.sessions.lock();
        sessions.entry(session_id.clone()).or_default().emit(event);
    }

    /// Simulate the hosting process going away: the session keeps running
    /// but buffers its events until somebody reconnects
    pub fn suspend(&self, session_id: &SessionId) {
        if let Some(state) = self.sessions.lock().get_mut(session_id) {
            state.sink = None;
        }
    }

    pub fn upload_count(&self, session_id: &SessionId) -> usize {
        self.sessions
            .lock()
            .get(session_id)
            .map(|state| state.uploads.len())
            .unwrap_or(0)
    }

    pub fn uploads(&self, session_id: &SessionId) -> Vec<UploadRecord> {
        self.sessions
            .lock()
            .get(session_id)
            .map(|state| state.uploads.clone())
            .unwrap_or_default()
    }

    pub fn connect_count(&self, session_id: &SessionId) -> u32 {
        self.sessions
            .lock()
            .get(session_id)
            .map(|state| state.connects)
            .unwrap_or(0)
    }

    pub fn buffered_count(&self, session_id: &SessionId) -> usize {
        self.sessions
            .lock()
            .get(session_id)
            .map(|state| state.buffered.len())
            .unwrap_or(0)
    }

    pub fn is_invalidated(&self, session_id: &SessionId) -> bool {
        self.sessions
            .lock()
            .get(session_id)
            .map(|state| state.invalidated)
            .unwrap_or(false)
    }
}

#[async_trait]
impl TransportFactory for MemorySessions {
    async fn connect(&self, session_id: &SessionId, sink: EventSink) -> PollResult<Arc<dyn Transport>> {
        let mut sessions = self.sessions.lock();
        let state = sessions.entry(session_id.clone()).or_default();

        state.generation += 1;
        state.connects += 1;
        state.invalidated = false;

        for event in state.buffered.drain(..) {
            sink.send(event)
                .map_err(|_| PollError::transport("event sink closed during redelivery"))?;
        }
        sink.send(TransportEvent::EventsFlushed)
            .map_err(|_| PollError::transport("event sink closed during redelivery"))?;
        state.sink = Some(sink);

        tracing::debug!("Memory session {} connected (generation {})", session_id, state.generation);

        Ok(Arc::new(MemoryTransport {
            session_id: session_id.clone(),
            generation: state.generation,
            sessions: self.sessions.clone(),
        }))
    }
}

/// Handle to one connection of a [`MemorySessions`] session
pub struct MemoryTransport {
    session_id: SessionId,
    generation: u64,
    sessions: Arc<Mutex<HashMap<SessionId, SessionState>>>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn start_upload(&self, request: &PollRequest, payload: StagedPayload) -> PollResult<TaskId> {
        let body = payload.consume().await?;

        let mut sessions = self.sessions.lock();
        let state = sessions
            .get_mut(&self.session_id)
            .ok_or_else(|| PollError::SessionNotFound(self.session_id.to_string()))?;

        if state.invalidated || state.generation != self.generation {
            return Err(PollError::transport(format!(
                "session {} handle is no longer current",
                self.session_id
            )));
        }

        let task_id = TaskId::new();
        state.uploads.push(UploadRecord {
            task_id: task_id.clone(),
            method: request.method.clone(),
            url: request.url.clone(),
            body,
            generation: self.generation,
        });

        match state.script.pop_front().unwrap_or(ScriptedResponse::Empty) {
            ScriptedResponse::Body(bytes) => {
                state.emit(TransportEvent::Data { task_id: task_id.clone(), bytes });
                state.emit(TransportEvent::TaskCompleted { task_id: task_id.clone(), error: None });
            }
            ScriptedResponse::Empty => {
                state.emit(TransportEvent::Data { task_id: task_id.clone(), bytes: Bytes::new() });
                state.emit(TransportEvent::TaskCompleted { task_id: task_id.clone(), error: None });
            }
            ScriptedResponse::Failure(error) => {
                state.emit(TransportEvent::TaskCompleted {
                    task_id: task_id.clone(),
                    error: Some(error),
                });
            }
            ScriptedResponse::Silent => {}
        }

        Ok(task_id)
    }

    fn invalidate(&self) {
        let mut sessions = self.sessions.lock();
        if let Some(state) = sessions.get_mut(&self.session_id) {
            if state.generation == self.generation {
                state.invalidated = true;
                state.sink = None;
                state.buffered.clear();
                state.script.clear();
            }
        }
    }

    fn session_id(&self) -> &SessionId {
        &self.session_id
    }
}
