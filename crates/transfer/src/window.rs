//! Adaptive bound on chunks in flight.

use std::sync::{Mutex, PoisonError};

use tokio::sync::Semaphore;
use tracing::trace;

/// Counting semaphore whose size reacts to chunk outcomes.
///
/// The window opens at one permit. Each first-attempt success widens it by
/// one until `capacity`; the first failure stops growth for good and every
/// failure narrows it by one, down to 1.
///
/// Permits are not tied to a guard: [`acquire`](Self::acquire) takes one and
/// exactly one of [`success`](Self::success) or [`fail`](Self::fail) followed
/// by [`recover`](Self::recover) gives it back.
#[derive(Debug)]
pub struct WindowSemaphore {
    permits: Semaphore,
    capacity: usize,
    state: Mutex<WindowState>,
}

#[derive(Debug)]
struct WindowState {
    size: usize,
    growing: bool,
    /// Releases to swallow so that shrinking takes permits out of circulation.
    retired: usize,
}

impl WindowSemaphore {
    /// Creates a window of size 1. A `capacity` of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Semaphore::new(1),
            capacity: capacity.max(1),
            state: Mutex::new(WindowState {
                size: 1,
                growing: true,
                retired: 0,
            }),
        }
    }

    /// Waits for a permit. There is no timeout.
    pub async fn acquire(&self) {
        // The semaphore is never closed, so acquire cannot fail.
        if let Ok(permit) = self.permits.acquire().await {
            permit.forget();
        }
    }

    /// Completes an operation that succeeded on its first attempt.
    pub fn success(&self) {
        let mut state = self.lock();
        let mut release = 1;
        if state.growing && state.size < self.capacity {
            state.size += 1;
            release += 1;
        }
        trace!(size = state.size, "window success");
        self.release(&mut state, release);
    }

    /// Records a failed attempt. The operation keeps its permit until
    /// [`recover`](Self::recover).
    pub fn fail(&self) {
        let mut state = self.lock();
        state.growing = false;
        if state.size > 1 {
            state.size -= 1;
            state.retired += 1;
        }
        trace!(size = state.size, "window fail");
    }

    /// Returns the permit held back by [`fail`](Self::fail). Call once per
    /// `fail`, whatever the retries' outcome.
    pub fn recover(&self) {
        let mut state = self.lock();
        self.release(&mut state, 1);
    }

    pub fn size(&self) -> usize {
        self.lock().size
    }

    pub fn is_growing(&self) -> bool {
        self.lock().growing
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    fn release(&self, state: &mut WindowState, count: usize) {
        let absorbed = count.min(state.retired);
        state.retired -= absorbed;
        let count = count - absorbed;
        if count > 0 {
            self.permits.add_permits(count);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WindowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
