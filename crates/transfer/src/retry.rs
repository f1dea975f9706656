use std::future::Future;

use tracing::{debug, warn};

use crate::config::TransferConfig;
use crate::error::{ChunkError, TransferError};
use crate::window::WindowSemaphore;

/// Runs one chunk exchange, making at most `config.max_attempts` attempts
/// (never fewer than one).
///
/// With a window, a first-attempt success calls
/// [`success`](WindowSemaphore::success); a first-attempt failure calls
/// [`fail`](WindowSemaphore::fail) and, once the retries are settled either
/// way, [`recover`](WindowSemaphore::recover).
pub(crate) async fn with_retries<F, Fut, T>(
    window: Option<&WindowSemaphore>,
    config: &TransferConfig,
    offset: u64,
    mut attempt: F,
) -> Result<T, TransferError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ChunkError>>,
{
    let mut last = match attempt().await {
        Ok(value) => {
            if let Some(window) = window {
                window.success();
            }
            return Ok(value);
        }
        Err(e) => e,
    };

    if let Some(window) = window {
        window.fail();
    }
    warn!(offset, error = %last, "chunk failed, retrying");

    let mut attempts: u32 = 1;
    let result = loop {
        if attempts >= config.max_attempts {
            break Err(last);
        }
        if let Some(delay) = config.retry_delay() {
            tokio::time::sleep(delay).await;
        }
        attempts += 1;
        match attempt().await {
            Ok(value) => {
                debug!(offset, attempt = attempts, "retry succeeded");
                break Ok(value);
            }
            Err(e) => {
                debug!(offset, attempt = attempts, error = %e, "retry failed");
                last = e;
            }
        }
    };

    if let Some(window) = window {
        window.recover();
    }

    result.map_err(|source| TransferError::Chunk {
        offset,
        attempts,
        source: Box::new(source),
    })
}
