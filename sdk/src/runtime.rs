//! Runtime plumbing for the blocking and callback adapters.
//!
//! Every network-touching operation is written once as an `async fn`. The
//! [`Dispatcher`] runs those futures for callers that do not live in an
//! async context: `block_on` for the blocking adapters, `spawn` for the
//! callback adapters.
//!
//! A client either borrows a runtime through a caller-supplied
//! [`Handle`] or owns a small multi-threaded runtime of its own.

use std::future::Future;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::debug;

const WORKER_THREADS: usize = 2;

/// Runs SDK futures on behalf of synchronous callers.
pub struct Dispatcher {
    handle: Handle,
    owned: Option<Runtime>,
}

impl Dispatcher {
    /// Uses `handle` if given, otherwise starts an owned runtime.
    pub fn new(handle: Option<Handle>) -> std::io::Result<Self> {
        match handle {
            Some(handle) => Ok(Self {
                handle,
                owned: None,
            }),
            None => {
                let runtime = Builder::new_multi_thread()
                    .worker_threads(WORKER_THREADS)
                    .thread_name("kin-sdk")
                    .enable_all()
                    .build()?;
                debug!(workers = WORKER_THREADS, "started owned runtime");
                Ok(Self {
                    handle: runtime.handle().clone(),
                    owned: Some(runtime),
                })
            }
        }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Drives `future` to completion on the calling thread.
    ///
    /// # Panics
    ///
    /// Panics when called from inside an async context, like any tokio
    /// `block_on`. Async callers should await the operation instead.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.handle.block_on(future)
    }

    /// Runs `future` in the background.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // The last reference may go away on a worker thread or inside
        // another runtime; a plain drop would block there and panic.
        if let Some(runtime) = self.owned.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("owned", &self.owned.is_some())
            .finish()
    }
}
