//! Per-connection handling time budget.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::warn;

use crate::constants::DEFAULT_HANDLER_TIMEOUT;
use crate::local_vars::TaskContext;
use crate::worker::ConnectionHandler;

/// Wraps a handler with a fixed time budget.
///
/// A connection whose handling exceeds the budget is abandoned at its
/// next await point and the event logged; the slot frees as usual. This
/// keeps a stuck handler from pinning a pool slot indefinitely.
pub struct TimeoutHandler {
    inner: Arc<dyn ConnectionHandler>,
    budget: Duration,
}

impl TimeoutHandler {
    /// Wrap `inner` with the given budget.
    pub fn new(inner: Arc<dyn ConnectionHandler>, budget: Duration) -> Self {
        Self { inner, budget }
    }

    /// Wrap `inner` with the default budget.
    pub fn with_default_budget(inner: Arc<dyn ConnectionHandler>) -> Self {
        Self::new(inner, DEFAULT_HANDLER_TIMEOUT)
    }
}

#[async_trait]
impl ConnectionHandler for TimeoutHandler {
    async fn handle(&self, stream: TcpStream, ctx: &TaskContext) -> anyhow::Result<()> {
        match tokio::time::timeout(self.budget, self.inner.handle(stream, ctx)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(budget_ms = self.budget.as_millis() as u64, "connection handling timed out");
                anyhow::bail!("connection handling exceeded {}ms budget", self.budget.as_millis())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    struct StallingHandler;

    #[async_trait]
    impl ConnectionHandler for StallingHandler {
        async fn handle(&self, _stream: TcpStream, _ctx: &TaskContext) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    struct PromptHandler;

    #[async_trait]
    impl ConnectionHandler for PromptHandler {
        async fn handle(&self, mut stream: TcpStream, _ctx: &TaskContext) -> anyhow::Result<()> {
            stream.write_all(b"ok").await?;
            Ok(())
        }
    }

    async fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn test_stalled_handler_is_cut_off() {
        let handler =
            TimeoutHandler::new(Arc::new(StallingHandler), Duration::from_millis(50));
        let (_client, server) = connected_pair().await;
        let ctx = TaskContext::new();

        let outcome = handler.handle(server, &ctx).await;
        assert!(outcome.is_err());
    }

    #[tokio::test]
    async fn test_prompt_handler_unaffected() {
        let handler = TimeoutHandler::new(Arc::new(PromptHandler), Duration::from_secs(5));
        let (_client, server) = connected_pair().await;
        let ctx = TaskContext::new();

        assert!(handler.handle(server, &ctx).await.is_ok());
    }
}
