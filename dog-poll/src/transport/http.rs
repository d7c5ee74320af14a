use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::{Client, Method};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::{
    staging::StagedPayload,
    transport::{EventSink, Transport, TransportEvent, TransportFactory},
    PollError, PollRequest, PollResult, SessionId, TaskId,
};

/// In-process HTTP transport backed by reqwest.
///
/// Sessions do not outlive the process, so connecting never has anything
/// to redeliver and reports [`TransportEvent::EventsFlushed`] right away.
/// A failed request is reported as an empty payload followed by the error,
/// which lets the engine fall back to its normal retry path.
#[derive(Debug, Clone, Default)]
pub struct HttpTransportFactory {
    client: Client,
}

impl HttpTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TransportFactory for HttpTransportFactory {
    async fn connect(&self, session_id: &SessionId, sink: EventSink) -> PollResult<Arc<dyn Transport>> {
        sink.send(TransportEvent::EventsFlushed)
            .map_err(|_| PollError::transport("event sink closed"))?;

        Ok(Arc::new(HttpTransport {
            session_id: session_id.clone(),
            client: self.client.clone(),
            sink: Arc::new(Mutex::new(Some(sink))),
            tasks: Mutex::new(Vec::new()),
        }))
    }
}

pub struct HttpTransport {
    session_id: SessionId,
    client: Client,
    sink: Arc<Mutex<Option<EventSink>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

#[async_trait]
impl Transport for HttpTransport {
    async fn start_upload(&self, request: &PollRequest, payload: StagedPayload) -> PollResult<TaskId> {
        // the staged file is ours from here on, whether or not we send it
        let body = payload.consume().await?;

        if self.sink.lock().is_none() {
            return Err(PollError::transport(format!("session {} was invalidated", self.session_id)));
        }

        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| PollError::transport(format!("invalid method {}", request.method)))?;

        let mut builder = self.client.request(method, request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let builder = builder.body(body);

        let task_id = TaskId::new();
        let sink = self.sink.clone();
        let task = task_id.clone();

        let handle = tokio::spawn(async move {
            let outcome = match builder.send().await {
                Ok(response) => response.bytes().await,
                Err(e) => Err(e),
            };

            let Some(sink) = sink.lock().clone() else {
                return;
            };

            let (bytes, error) = match outcome {
                Ok(bytes) => (bytes, None),
                Err(e) => {
                    tracing::warn!("HTTP upload {} failed: {}", task, e);
                    (Bytes::new(), Some(e.to_string()))
                }
            };

            let _ = sink.send(TransportEvent::Data { task_id: task.clone(), bytes });
            let _ = sink.send(TransportEvent::TaskCompleted { task_id: task, error });
        });

        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);

        Ok(task_id)
    }

    fn invalidate(&self) {
        self.sink.lock().take();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    fn session_id(&self) -> &SessionId {
        &self.session_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::{PayloadStager, TempFileStager};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_connect_reports_flushed_immediately() {
        let (sink, mut receiver) = mpsc::unbounded_channel();
        let transport = HttpTransportFactory::new()
            .connect(&SessionId::from("http-1"), sink)
            .await
            .unwrap();

        assert_eq!(receiver.recv().await, Some(TransportEvent::EventsFlushed));
        assert_eq!(transport.session_id().as_str(), "http-1");
    }

    #[tokio::test]
    async fn test_invalid_method_is_rejected_and_body_removed() {
        let (sink, _receiver) = mpsc::unbounded_channel();
        let transport = HttpTransportFactory::new()
            .connect(&SessionId::from("http-2"), sink)
            .await
            .unwrap();
        let staged = TempFileStager::new().stage(b"{}").await.unwrap();

        let result = transport
            .start_upload(&PollRequest::new("NOT A METHOD", "http://127.0.0.1:9/"), staged.clone())
            .await;
        assert!(matches!(result, Err(PollError::Transport(_))));
        assert!(!staged.path.exists());
    }

    #[tokio::test]
    async fn test_invalidated_transport_refuses_uploads_and_removes_body() {
        let (sink, _receiver) = mpsc::unbounded_channel();
        let transport = HttpTransportFactory::new()
            .connect(&SessionId::from("http-3"), sink)
            .await
            .unwrap();
        transport.invalidate();

        let staged = TempFileStager::new().stage(b"{}").await.unwrap();
        let result = transport
            .start_upload(&PollRequest::post("http://127.0.0.1:9/"), staged.clone())
            .await;
        assert!(matches!(result, Err(PollError::Transport(_))));
        assert!(!staged.path.exists(), "rejected upload left its staged body behind");
    }
}
