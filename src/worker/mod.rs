//! Adaptive connection worker.
//!
//! A [`ConnectionWorker`] accepts TCP connections and dispatches each to
//! a [`ConnectionHandler`] task drawn from a bounded slot pool. The pool
//! starts small and grows one slot at a time, gated by a cooldown, only
//! when a connection arrives while every slot is occupied. Before each
//! accept the loop waits out the cooldown remainder (floored at a
//! configurable minimum) for a slot to free, preferring reuse of existing
//! capacity over growth. Capacity never shrinks and never exceeds the
//! configured ceiling.
//!
//! Each handler task runs with a [`TaskContext`] checked out from a
//! [`ContextRecycler`], so context-local resources built lazily during
//! one connection survive into later ones.
//!
//! Shutdown is graceful: cancelling stops the accept loop, closes the
//! listener, and drains every in-flight handler before the worker task
//! returns.

pub mod pure;
pub mod recycler;
pub mod timeout;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::sync::OwnedSemaphorePermit;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::WorkerConfig;
use crate::local_vars::TaskContext;
use crate::worker::pure::AcceptGate;
use crate::worker::pure::accept_gate;
use crate::worker::pure::accept_wait_ms;
use crate::worker::pure::should_expand;
use crate::worker::recycler::ContextRecycler;

pub use timeout::TimeoutHandler;

/// Handles one accepted connection.
///
/// The context is owned by this task for the duration of the call and may
/// carry cached resources from earlier connections.
#[async_trait]
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Process the connection to completion.
    async fn handle(&self, stream: TcpStream, ctx: &TaskContext) -> anyhow::Result<()>;
}

/// Handle to a running connection worker.
pub struct ConnectionWorker {
    cancel_token: CancellationToken,
    join_handle: JoinHandle<()>,
}

impl ConnectionWorker {
    /// Bind a listener per the configuration and start the accept loop.
    ///
    /// Returns the handle and the actual bound address (useful when the
    /// configured port is 0).
    pub async fn bind(
        config: WorkerConfig,
        handler: Arc<dyn ConnectionHandler>,
    ) -> std::io::Result<(Self, SocketAddr)> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        let addr = listener.local_addr()?;
        Ok((Self::spawn(listener, config, handler), addr))
    }

    /// Start the accept loop on an already-bound listener.
    pub fn spawn(
        listener: TcpListener,
        config: WorkerConfig,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Self {
        let cancel_token = CancellationToken::new();
        let cancel = cancel_token.clone();
        let join_handle = tokio::spawn(async move {
            run_accept_loop(listener, config, handler, cancel).await;
        });
        Self {
            cancel_token,
            join_handle,
        }
    }

    /// Stop accepting, drain in-flight connections, and return.
    ///
    /// A stop is a completion, not an error; this never fails because of
    /// handler outcomes.
    pub async fn shutdown(self) {
        self.cancel_token.cancel();
        if let Err(error) = self.join_handle.await {
            warn!(%error, "worker task terminated abnormally");
        }
    }
}

/// The accept loop. Runs as a single task and is the sole mutator of pool
/// capacity; slot accounting goes through the semaphore, which completing
/// handler tasks release into.
async fn run_accept_loop(
    listener: TcpListener,
    config: WorkerConfig,
    handler: Arc<dyn ConnectionHandler>,
    cancel: CancellationToken,
) {
    let max_size = config.max_pool_size.max(config.initial_pool_size);
    let min_wait_ms = config.expansion_min_wait().as_millis() as u64;
    let cooldown_ms = config.expansion_cooldown().as_millis() as u64;

    let slots = Arc::new(Semaphore::new(config.initial_pool_size));
    let recycler = Arc::new(ContextRecycler::new());
    let tracker = TaskTracker::new();
    let mut pool_size = config.initial_pool_size;
    // A fresh worker observes a full cooldown before its first expansion
    let mut last_expansion = Instant::now();

    info!(pool_size, max_size, "connection worker started");

    loop {
        let since_ms = last_expansion.elapsed().as_millis() as u64;
        let wait_ms = accept_wait_ms(min_wait_ms, cooldown_ms, since_ms);

        // A permit reserved while gated; its slot hosts the next
        // connection, so the expansion check below counts it as free.
        let mut reserved: Option<OwnedSemaphorePermit> = None;

        match accept_gate(pool_size, max_size, wait_ms) {
            AcceptGate::Proceed => {}
            AcceptGate::WaitForSlot { timeout_ms: None } => {
                // At the ceiling: only a freed slot lets work in
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    permit = slots.clone().acquire_owned() => match permit {
                        Ok(permit) => reserved = Some(permit),
                        Err(_) => break,
                    },
                }
            }
            AcceptGate::WaitForSlot { timeout_ms: Some(ms) } => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    outcome = tokio::time::timeout(
                        Duration::from_millis(ms),
                        slots.clone().acquire_owned(),
                    ) => {
                        // Timeout elapsing just means proceed to accept
                        if let Ok(Ok(permit)) = outcome {
                            reserved = Some(permit);
                        }
                    }
                }
            }
        }

        let (stream, peer_addr) = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(error) => {
                    warn!(%error, "accept failed");
                    continue;
                }
            },
        };

        let free_slots = slots.available_permits() + usize::from(reserved.is_some());
        if should_expand(pool_size, max_size, free_slots) {
            pool_size += 1;
            slots.add_permits(1);
            last_expansion = Instant::now();
            info!(pool_size, "expanded connection pool");
        }

        let permit = match reserved.take() {
            Some(permit) => permit,
            None => match slots.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let ctx = recycler.checkout();
        debug!(%peer_addr, recycled = !ctx.is_empty(), "dispatching connection");

        let handler = Arc::clone(&handler);
        let task_recycler = Arc::clone(&recycler);
        tracker.spawn(async move {
            if let Err(error) = handler.handle(stream, &ctx).await {
                warn!(%error, %peer_addr, "connection handler failed");
            }
            // Check-in happens on success and failure alike; dropping the
            // permit is the slot-release hook for the accept loop
            task_recycler.checkin(ctx);
            drop(permit);
        });
    }

    // Close the listening socket, then drain in-flight handlers
    drop(listener);
    tracker.close();
    tracker.wait().await;
    info!(pool_size, "connection worker stopped");
}
