//! Graceful shutdown coordination
//!
//! Shutdown handlers are registered during startup and run in reverse
//! registration order when the daemon stops, each awaited individually. A
//! handler error is logged and does not abort the remaining handlers. The
//! whole run is bounded by one global hard timeout; if it elapses the caller
//! is expected to force-exit the process.

use futures::future::BoxFuture;
use std::time::Duration;

use crate::error::ShutdownError;

type Handler = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// Collects shutdown handlers and runs them in reverse registration order
pub struct ShutdownCoordinator {
    handlers: Vec<(String, Handler)>,
}

impl ShutdownCoordinator {
    /// Create an empty coordinator
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Register a named shutdown handler.
    ///
    /// Handlers run in reverse registration order: register foundational
    /// resources first so they are torn down last.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, handler: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.handlers
            .push((name.into(), Box::new(move || Box::pin(handler()))));
    }

    /// Number of registered handlers
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run all handlers in reverse registration order under one global hard
    /// timeout.
    ///
    /// Handler errors are logged and skipped. Returns
    /// `ShutdownError::Timeout` if the timeout elapses with handlers still
    /// pending; the caller should force-exit.
    pub async fn run(mut self, hard_timeout: Duration) -> Result<(), ShutdownError> {
        let timeout_ms = hard_timeout.as_millis() as u64;

        let work = async {
            while let Some((name, handler)) = self.handlers.pop() {
                tracing::debug!("Running shutdown handler '{}'", name);
                if let Err(e) = handler().await {
                    tracing::warn!("Shutdown handler '{}' failed: {:#}", name, e);
                }
            }
        };

        tokio::time::timeout(hard_timeout, work)
            .await
            .map_err(|_| ShutdownError::Timeout { timeout_ms })
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
