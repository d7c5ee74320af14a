//! # dog-poll: submit-then-poll over background sessions
//!
//! `dog-poll` uploads a payload and keeps polling until the server reports a
//! terminal result, surviving process relaunches by re-attaching to a
//! transfer session that outlived the process.
//!
//! ## Guarantees
//!
//! - **Single-fire completion**: the delegate is told about the outcome once,
//!   no matter how many duplicate or late callbacks the transport delivers
//! - **Bounded retries**: at most `attempts + 1` uploads, a fixed delay apart
//! - **Fail-safe status vocabulary**: unknown server states end the poll
//!   instead of spinning forever
//! - **Relaunch-friendly**: a fresh engine attaches to a live session and
//!   receives whatever the session buffered while the process was away
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dog_poll::prelude::*;
//! use dog_poll::transport::memory::MemorySessions;
//! use serde_json::Value;
//!
//! struct Printer;
//!
//! impl PollDelegate<Value> for Printer {
//!     fn polling_did_finish(&self, result: Option<Value>) {
//!         println!("finished: {result:?}");
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> PollResult<()> {
//! let delegate = Arc::new(Printer);
//! let engine = PollEngineBuilder::new(
//!     PollRequest::post("https://api.example.test/transcribe"),
//!     b"{\"audio\":\"...\"}".to_vec(),
//!     Decoder::json_value(),
//!     &delegate,
//!     Arc::new(MemorySessions::new()),
//! )
//! .with_config(PollConfig::from_default_env()?)
//! .build();
//!
//! engine.start().await?;
//! # Ok(())
//! # }
//! ```
//!
//! After a relaunch, rebuild the engine with the persisted session id and
//! call `attach` instead of `build` + `start`.

pub mod codec;
mod config;
mod delegate;
pub mod engine;
mod error;
pub mod staging;
pub mod transport;
pub mod types;

pub use codec::{Decoder, Pollable};
pub use config::{PollConfig, DEFAULT_ENV_PREFIX};
pub use delegate::PollDelegate;
pub use engine::{BoxStream, PollEngine, PollEngineBuilder};
pub use error::{PollError, PollResult};
pub use staging::{PayloadStager, StagedPayload, TempFileStager};
pub use transport::{EventSink, Transport, TransportEvent, TransportFactory};
pub use types::{PollEvent, PollRequest, RetryReason, SessionId, Status, TaskId};

#[cfg(feature = "http")]
pub use transport::http::HttpTransportFactory;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Decoder, PollConfig, PollDelegate, PollEngine, PollEngineBuilder, PollError, PollRequest,
        PollResult, Pollable, SessionId, Status,
    };
}
