//! Token streaming from a blocking caption generator.
//!
//! The generator runs on tokio's blocking pool and pushes tokens into a
//! [`TokenSink`]. The consumer drains them in arrival order until the sink is
//! dropped, which happens when the generator returns.

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{EvalError, Result};

#[derive(Debug, Clone)]
pub struct TokenSink {
    tx: mpsc::UnboundedSender<String>,
}

impl TokenSink {
    /// Returns `false` once the consumer has gone away.
    pub fn send(&self, token: impl Into<String>) -> bool {
        self.tx.send(token.into()).is_ok()
    }
}

/// Run `generate` on a producer thread and collect everything it sends.
///
/// The caller waits until the stream is exhausted; there is no cancellation.
/// A producer that returns an error or panics surfaces as
/// [`EvalError::Producer`], discarding any partial text.
pub async fn collect_stream<F>(generate: F) -> Result<String>
where
    F: FnOnce(TokenSink) -> Result<()> + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel();
    let producer = tokio::task::spawn_blocking(move || generate(TokenSink { tx }));

    let mut text = String::new();
    let mut tokens = 0usize;
    while let Some(token) = rx.recv().await {
        text.push_str(&token);
        tokens += 1;
    }

    match producer.await {
        Ok(Ok(())) => {}
        Ok(Err(e @ EvalError::Producer(_))) => return Err(e),
        Ok(Err(e)) => return Err(EvalError::Producer(e.to_string())),
        Err(e) => return Err(EvalError::Producer(format!("producer thread failed: {}", e))),
    }

    debug!(tokens, "Token stream finished");
    Ok(text.trim().to_string())
}
