//! Task bookkeeping shared by the upload and download engines.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::TransferError;
use crate::window::WindowSemaphore;

/// Chunk tasks of one session, gated by a [`WindowSemaphore`].
///
/// The first error recorded wins and aborts the session: no new chunks are
/// dispatched and the outstanding ones are cancelled.
pub(crate) struct Pipeline {
    window: Arc<WindowSemaphore>,
    tasks: JoinSet<()>,
    failure: Arc<Mutex<Option<TransferError>>>,
    abort: CancellationToken,
}

impl Pipeline {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            window: Arc::new(WindowSemaphore::new(capacity)),
            tasks: JoinSet::new(),
            failure: Arc::new(Mutex::new(None)),
            abort: CancellationToken::new(),
        }
    }

    pub(crate) fn window(&self) -> Arc<WindowSemaphore> {
        self.window.clone()
    }

    /// Waits for a window permit. Returns `false` once the session has
    /// failed.
    pub(crate) async fn acquire(&self) -> bool {
        tokio::select! {
            biased;
            _ = self.abort.cancelled() => false,
            _ = self.window.acquire() => true,
        }
    }

    /// Records `error` unless an earlier one is already recorded.
    pub(crate) fn fail(&self, error: TransferError) {
        record(&self.failure, &self.abort, error);
    }

    /// Spawns a chunk task. Its error, if first, aborts the session.
    pub(crate) fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = Result<(), TransferError>> + Send + 'static,
    {
        let failure = self.failure.clone();
        let abort = self.abort.clone();
        self.tasks.spawn(async move {
            if let Err(e) = task.await {
                record(&failure, &abort, e);
            }
        });
    }

    /// Waits for every task and returns the first error, if any.
    pub(crate) async fn finish(mut self) -> Result<(), TransferError> {
        loop {
            let joined = tokio::select! {
                biased;
                _ = self.abort.cancelled(), if !self.tasks.is_empty() => {
                    debug!(outstanding = self.tasks.len(), "aborting outstanding chunks");
                    self.tasks.abort_all();
                    while self.tasks.join_next().await.is_some() {}
                    break;
                }
                joined = self.tasks.join_next() => joined,
            };

            match joined {
                None => break,
                Some(Err(e)) if e.is_panic() => {
                    self.fail(TransferError::Task(e.to_string()));
                }
                Some(_) => {}
            }
        }

        let failure = self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn record(failure: &Mutex<Option<TransferError>>, abort: &CancellationToken, error: TransferError) {
    let mut slot = failure.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.is_none() {
        debug!(error = %error, "session failed");
        *slot = Some(error);
        abort.cancel();
    }
}
