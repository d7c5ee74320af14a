use bytes::Bytes;
use futures_core::Stream;
use parking_lot::Mutex;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    codec::Decoder,
    delegate::PollDelegate,
    staging::{discard_staged, PayloadStager, TempFileStager},
    transport::{Transport, TransportEvent, TransportFactory},
    PollConfig, PollError, PollEvent, PollRequest, PollResult, RetryReason, SessionId, Status,
    TaskId,
};

/// Type alias for boxed streams (stable Rust compatible)
pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

type Continuation = Box<dyn FnOnce() + Send + 'static>;

/// Builder for [`PollEngine`]
pub struct PollEngineBuilder<R> {
    request: PollRequest,
    payload: Bytes,
    decoder: Decoder<R>,
    delegate: Weak<dyn PollDelegate<R>>,
    transport: Arc<dyn TransportFactory>,
    session_id: Option<SessionId>,
    config: PollConfig,
    stager: Arc<dyn PayloadStager>,
}

impl<R: Send + 'static> PollEngineBuilder<R> {
    /// Start building an engine.
    ///
    /// Only a weak reference to `delegate` is kept.
    pub fn new<D>(
        request: PollRequest,
        payload: impl Into<Bytes>,
        decoder: Decoder<R>,
        delegate: &Arc<D>,
        transport: Arc<dyn TransportFactory>,
    ) -> Self
    where
        D: PollDelegate<R> + 'static,
    {
        let delegate = Arc::downgrade(delegate);
        let delegate: Weak<dyn PollDelegate<R>> = delegate;

        Self {
            request,
            payload: payload.into(),
            decoder,
            delegate,
            transport,
            session_id: None,
            config: PollConfig::default(),
            stager: Arc::new(TempFileStager::new()),
        }
    }

    /// Use a known session id instead of generating one
    pub fn with_session_id<S: Into<SessionId>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_config(mut self, config: PollConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default temp-file stager
    pub fn with_stager(mut self, stager: Arc<dyn PayloadStager>) -> Self {
        self.stager = stager;
        self
    }

    /// Build an engine for a new poll
    pub fn build(self) -> PollEngine<R> {
        let session_id = self.session_id.clone().unwrap_or_else(SessionId::generate);
        self.into_engine(session_id)
    }

    /// Build an engine and re-attach it to a session that already has work
    /// in flight, typically after the hosting process was relaunched.
    ///
    /// Requires the session id used by the original engine.
    pub async fn attach<F>(self, continuation: F) -> PollResult<PollEngine<R>>
    where
        F: FnOnce() + Send + 'static,
    {
        let session_id = self.session_id.clone().ok_or(PollError::MissingSession)?;
        let engine = self.into_engine(session_id);
        engine.restore(continuation).await?;
        Ok(engine)
    }

    fn into_engine(self, session_id: SessionId) -> PollEngine<R> {
        let (events, _) = broadcast::channel(256);

        PollEngine {
            inner: Arc::new(EngineInner {
                session_id,
                request: self.request,
                payload: self.payload,
                attempts_remaining: AtomicI64::new(i64::from(self.config.attempts)),
                config: self.config,
                decoder: self.decoder,
                delegate: self.delegate,
                factory: self.transport,
                stager: self.stager,
                finished: AtomicBool::new(false),
                transport: Mutex::new(None),
                pending_continuation: Mutex::new(None),
                runtime: Mutex::new(Handle::try_current().ok()),
                events,
            }),
        }
    }
}

/// Submit-then-poll engine.
///
/// Uploads the payload, interprets every response the transport delivers
/// and keeps re-uploading after a fixed delay until the server reports a
/// terminal status or the retry budget runs out. The delegate hears about
/// the outcome exactly once.
pub struct PollEngine<R> {
    inner: Arc<EngineInner<R>>,
}

impl<R> Clone for PollEngine<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R: Send + 'static> PollEngine<R> {
    /// Trigger the first upload attempt. No-op once the poll has finished.
    #[instrument(skip(self), fields(session_id = %self.inner.session_id))]
    pub async fn start(&self) -> PollResult<()> {
        if self.inner.is_finished() {
            debug!("Poll already finished, ignoring start");
            return Ok(());
        }

        if self.inner.current_transport().is_none() {
            self.inner.connect(false).await?;
        }

        self.inner.upload().await;
        Ok(())
    }

    /// Re-create the transport handle for this engine's session and run
    /// `continuation` once the transport has flushed its pending events.
    ///
    /// Any previous handle is replaced, not invalidated.
    #[instrument(skip(self, continuation), fields(session_id = %self.inner.session_id))]
    pub async fn restore<F>(&self, continuation: F) -> PollResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.inner.is_finished() {
            debug!("Poll already finished, running continuation without reconnecting");
            continuation();
            return Ok(());
        }

        *self.inner.pending_continuation.lock() = Some(Box::new(continuation));
        self.inner.connect(true).await
    }

    /// Feed a transport callback into the state machine.
    ///
    /// Connected transports are pumped automatically; this is for hosts that
    /// receive session callbacks through their own plumbing. It may be called
    /// from any thread: retries run on the runtime the engine was built or
    /// last connected on.
    pub fn handle_event(&self, event: TransportEvent) {
        self.inner.handle_event(event);
    }

    pub fn session_id(&self) -> &SessionId {
        &self.inner.session_id
    }

    pub fn request(&self) -> &PollRequest {
        &self.inner.request
    }

    pub fn config(&self) -> &PollConfig {
        &self.inner.config
    }

    /// Retries left; negative once the budget is exhausted
    pub fn attempts_remaining(&self) -> i64 {
        self.inner.attempts_remaining.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<PollEvent> {
        self.inner.events.subscribe()
    }

    /// Lifecycle events as a stream; lagged events are skipped
    pub fn event_stream(&self) -> BoxStream<PollEvent> {
        Box::pin(BroadcastStream::new(self.subscribe()).filter_map(|event| event.ok()))
    }
}

struct EngineInner<R> {
    session_id: SessionId,
    request: PollRequest,
    payload: Bytes,
    config: PollConfig,
    decoder: Decoder<R>,
    delegate: Weak<dyn PollDelegate<R>>,
    factory: Arc<dyn TransportFactory>,
    stager: Arc<dyn PayloadStager>,
    attempts_remaining: AtomicI64,
    finished: AtomicBool,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    pending_continuation: Mutex<Option<Continuation>>,
    /// Runtime retries are spawned on when a callback arrives from a
    /// thread outside any Tokio context
    runtime: Mutex<Option<Handle>>,
    events: broadcast::Sender<PollEvent>,
}

impl<R: Send + 'static> EngineInner<R> {
    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    fn current_transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.lock().clone()
    }

    fn emit(&self, event: PollEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    /// Open the session and start pumping its events into this engine
    async fn connect(self: &Arc<Self>, restored: bool) -> PollResult<()> {
        *self.runtime.lock() = Some(Handle::current());

        let (sink, mut receiver) = mpsc::unbounded_channel();
        let transport = self.factory.connect(&self.session_id, sink).await?;

        let previous = self.transport.lock().replace(transport);
        if previous.is_some() {
            debug!("Replaced transport handle for session {}", self.session_id);
        }

        // completion raced the connect; nobody else will invalidate this one
        if self.is_finished() {
            let orphan = self.transport.lock().take();
            if let Some(orphan) = orphan {
                orphan.invalidate();
            }
        }

        let engine = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                engine.handle_event(event);
            }
        });

        info!("Connected to session {} (restored: {})", self.session_id, restored);
        self.emit(PollEvent::Connected {
            session_id: self.session_id.clone(),
            restored,
            at: chrono::Utc::now(),
        });
        Ok(())
    }

    fn handle_event(self: &Arc<Self>, event: TransportEvent) {
        match event {
            TransportEvent::Data { task_id, bytes } => self.did_receive(task_id, bytes),
            TransportEvent::TaskCompleted {
                task_id,
                error: Some(error),
            } => {
                // termination is driven by response content only
                warn!("Upload task {} completed with error: {}", task_id, error);
            }
            TransportEvent::TaskCompleted { task_id, error: None } => {
                debug!("Upload task {} completed", task_id);
            }
            TransportEvent::EventsFlushed => self.events_flushed(),
        }
    }

    fn did_receive(self: &Arc<Self>, task_id: TaskId, bytes: Bytes) {
        if self.is_finished() {
            debug!("Ignoring late response for task {}", task_id);
            return;
        }

        if bytes.is_empty() {
            warn!("Empty response for task {}", task_id);
            self.schedule_retry(RetryReason::EmptyResponse);
            return;
        }

        match self.decoder.decode(&bytes) {
            None => {
                warn!("Could not decode {} byte response for task {}", bytes.len(), task_id);
                self.schedule_retry(RetryReason::Undecodable);
            }
            Some((Status::Processing, _)) => {
                debug!("Task {} still processing", task_id);
                self.schedule_retry(RetryReason::StillProcessing);
            }
            Some((Status::Finished, result)) => {
                info!("Task {} finished", task_id);
                self.complete(Some(result));
            }
            Some((Status::Error, _)) => {
                warn!("Server reported an error for task {}, dropping remaining attempts", task_id);
                self.attempts_remaining.store(0, Ordering::SeqCst);
                self.schedule_retry(RetryReason::ServerError);
            }
        }
    }

    fn schedule_retry(self: &Arc<Self>, reason: RetryReason) {
        let runtime = Handle::try_current()
            .ok()
            .or_else(|| self.runtime.lock().clone());

        let Some(runtime) = runtime else {
            error!(
                "No Tokio runtime to schedule retry for session {} ({:?})",
                self.session_id, reason
            );
            return;
        };

        let engine = self.clone();
        runtime.spawn(async move { engine.retry(reason).await });
    }

    async fn retry(self: Arc<Self>, reason: RetryReason) {
        if self.is_finished() {
            return;
        }

        let remaining = self.attempts_remaining.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining < 0 {
            warn!("Retry budget exhausted for session {} ({:?})", self.session_id, reason);
            self.complete(None);
            return;
        }

        debug!(
            "Retrying session {} in {:?} ({:?}, {} attempts left)",
            self.session_id, self.config.retry_delay, reason, remaining
        );
        self.emit(PollEvent::RetryScheduled {
            session_id: self.session_id.clone(),
            attempts_remaining: remaining,
            reason,
            at: chrono::Utc::now(),
        });

        tokio::time::sleep(self.config.retry_delay).await;

        if self.is_finished() {
            debug!("Session {} finished while waiting to retry", self.session_id);
            return;
        }

        self.upload().await;
    }

    async fn upload(&self) {
        if self.is_finished() {
            return;
        }

        let Some(transport) = self.current_transport() else {
            warn!("No transport attached to session {}, skipping upload", self.session_id);
            return;
        };

        // staging failures abort this attempt without touching the budget
        let staged = match self.stager.stage(&self.payload).await {
            Ok(staged) => staged,
            Err(e) => {
                error!("Could not stage payload for session {}: {}", self.session_id, e);
                return;
            }
        };

        let staged_path = staged.path.clone();
        match transport.start_upload(&self.request, staged).await {
            Ok(task_id) => {
                info!("Started upload task {} for session {}", task_id, self.session_id);
                self.emit(PollEvent::UploadStarted {
                    session_id: self.session_id.clone(),
                    task_id,
                    at: chrono::Utc::now(),
                });
            }
            Err(e) => {
                warn!("Transport rejected upload for session {}: {}", self.session_id, e);
                discard_staged(&staged_path).await;
            }
        }
    }

    /// Latch, notify, invalidate; in that order, at most once
    fn complete(&self, result: Option<R>) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }

        let succeeded = result.is_some();
        match self.delegate.upgrade() {
            Some(delegate) => delegate.polling_did_finish(result),
            None => debug!("Delegate for session {} is gone", self.session_id),
        }

        let transport = self.transport.lock().take();
        if let Some(transport) = transport {
            transport.invalidate();
        }

        let at = chrono::Utc::now();
        let session_id = self.session_id.clone();
        if succeeded {
            info!("Poll for session {} completed", self.session_id);
            self.emit(PollEvent::Completed { session_id, at });
        } else {
            warn!("Poll for session {} failed", self.session_id);
            self.emit(PollEvent::Failed { session_id, at });
        }
    }

    fn events_flushed(&self) {
        let continuation = self.pending_continuation.lock().take();
        match continuation {
            Some(continuation) => {
                info!("Session {} flushed pending events", self.session_id);
                continuation();
                self.emit(PollEvent::ContinuationInvoked {
                    session_id: self.session_id.clone(),
                    at: chrono::Utc::now(),
                });
            }
            None => debug!("Session {} flushed with no pending continuation", self.session_id),
        }
    }
}
