use async_trait::async_trait;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::{PollError, PollResult};

/// A request body written to disk for the transport to consume.
///
/// The transport owns the file once it receives it and is expected to
/// delete it after reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedPayload {
    pub path: PathBuf,
    pub len: u64,
}

impl StagedPayload {
    /// Read the staged body and remove the file
    pub async fn consume(self) -> PollResult<Vec<u8>> {
        let body = tokio::fs::read(&self.path).await.map_err(PollError::staging)?;
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            tracing::debug!("Could not remove staged payload {}: {}", self.path.display(), e);
        }
        Ok(body)
    }
}

/// Remove a staged file the transport never consumed
pub(crate) async fn discard_staged(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!("Discarded unconsumed payload {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Could not discard staged payload {}: {}", path.display(), e),
    }
}

/// Stages payload bytes somewhere the transport can stream them from
#[async_trait]
pub trait PayloadStager: Send + Sync {
    async fn stage(&self, payload: &[u8]) -> PollResult<StagedPayload>;
}

/// Writes each attempt to a fresh file so transports that delete their input
/// never race a later attempt.
#[derive(Debug, Clone)]
pub struct TempFileStager {
    dir: PathBuf,
}

impl TempFileStager {
    /// Stage into the system temp directory
    pub fn new() -> Self {
        Self::in_dir(std::env::temp_dir())
    }

    /// Stage into a specific directory
    pub fn in_dir<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Default for TempFileStager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PayloadStager for TempFileStager {
    async fn stage(&self, payload: &[u8]) -> PollResult<StagedPayload> {
        let path = self.dir.join(format!("dog-poll-{}.body", Uuid::new_v4()));
        tokio::fs::write(&path, payload)
            .await
            .map_err(PollError::staging)?;

        Ok(StagedPayload {
            path,
            len: payload.len() as u64,
        })
    }
}
