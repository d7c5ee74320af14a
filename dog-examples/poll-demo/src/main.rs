use std::sync::Arc;

use anyhow::{Context, Result};
use dog_poll::{prelude::*, HttpTransportFactory};
use serde_json::Value;
use tokio::sync::Notify;

/// Prints the outcome and wakes `main`
struct Reporter {
    done: Notify,
}

impl PollDelegate<Value> for Reporter {
    fn polling_did_finish(&self, result: Option<Value>) {
        match result {
            Some(value) => println!("[poll] finished: {value}"),
            None => println!("[poll] gave up without a result"),
        }
        self.done.notify_one();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let url = args
        .next()
        .context("usage: poll-demo <url> [json-payload] [session-id]")?;
    let payload = args.next().unwrap_or_else(|| "{}".to_string());
    let session_id = args.next();

    let config = PollConfig::from_default_env()?;
    println!(
        "[poll] {} attempts, {:?} apart, against {url}",
        config.attempts, config.retry_delay
    );

    // every attempt plus one delay of slack for the last response
    let deadline = config
        .retry_delay
        .saturating_mul(config.attempts.saturating_add(2));

    let reporter = Arc::new(Reporter { done: Notify::new() });
    let mut builder = PollEngineBuilder::new(
        PollRequest::post(url).with_content_type("application/json"),
        payload.into_bytes(),
        Decoder::json_value(),
        &reporter,
        Arc::new(HttpTransportFactory::new()),
    )
    .with_config(config);
    if let Some(session_id) = session_id {
        builder = builder.with_session_id(session_id);
    }

    let engine = builder.build();
    engine.start().await?;

    println!("[poll] session {}", engine.session_id());
    if tokio::time::timeout(deadline, reporter.done.notified()).await.is_err() {
        anyhow::bail!("no outcome after {deadline:?}; the upload was probably never accepted");
    }

    Ok(())
}
