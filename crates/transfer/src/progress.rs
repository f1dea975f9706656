use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::trace;

/// Snapshot published after each acknowledged chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferProgress {
    /// End offset of the chunk whose completion produced this update.
    pub offset: u64,
    /// Bytes acknowledged so far, in any order.
    pub transferred: u64,
    pub total: u64,
    pub bytes_per_second: f64,
}

impl TransferProgress {
    /// Fraction complete in `0.0..=1.0`. An empty transfer is complete.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.transferred as f64 / self.total as f64
    }

    pub fn is_complete(&self) -> bool {
        self.transferred >= self.total
    }

    /// Time left at the current rate; `None` until a rate is known.
    pub fn eta(&self) -> Option<Duration> {
        let remaining = self.total.saturating_sub(self.transferred);
        (self.bytes_per_second > 0.0)
            .then(|| Duration::from_secs_f64(remaining as f64 / self.bytes_per_second))
    }
}

// ---------------------------------------------------------------------------
// ThroughputMeter
// ---------------------------------------------------------------------------

struct Sample {
    bytes: u64,
    timestamp: Instant,
}

/// Transfer rate over a sliding window of samples.
pub struct ThroughputMeter {
    inner: Mutex<MeterInner>,
}

struct MeterInner {
    samples: Vec<Sample>,
    max_samples: usize,
    window: Duration,
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), 100)
    }
}

impl ThroughputMeter {
    pub fn new(window: Duration, max_samples: usize) -> Self {
        Self {
            inner: Mutex::new(MeterInner {
                samples: Vec::new(),
                max_samples: max_samples.max(2),
                window,
            }),
        }
    }

    /// Records `bytes` completed now.
    pub fn record(&self, bytes: u64) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        inner.samples.push(Sample {
            bytes,
            timestamp: now,
        });

        if let Some(cutoff) = now.checked_sub(inner.window) {
            inner.samples.retain(|sample| sample.timestamp >= cutoff);
        }

        if inner.samples.len() > inner.max_samples {
            let excess = inner.samples.len() - inner.max_samples;
            inner.samples.drain(..excess);
        }
    }

    /// Average rate across the window; 0.0 with fewer than two samples.
    pub fn bytes_per_second(&self) -> f64 {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let (Some(first), Some(last)) = (inner.samples.first(), inner.samples.last()) else {
            return 0.0;
        };
        let elapsed = last.timestamp.duration_since(first.timestamp);
        if inner.samples.len() < 2 || elapsed.is_zero() {
            return 0.0;
        }

        // The first sample only marks the start of the interval.
        let bytes: u64 = inner.samples[1..].iter().map(|sample| sample.bytes).sum();
        bytes as f64 / elapsed.as_secs_f64()
    }
}

// ---------------------------------------------------------------------------
// ProgressReporter
// ---------------------------------------------------------------------------

/// Per-session progress state shared by chunk tasks.
pub(crate) struct ProgressReporter {
    tx: Option<mpsc::Sender<TransferProgress>>,
    transferred: AtomicU64,
    total: u64,
    meter: ThroughputMeter,
}

impl ProgressReporter {
    pub(crate) fn new(tx: Option<mpsc::Sender<TransferProgress>>, total: u64) -> Self {
        let meter = ThroughputMeter::default();
        meter.record(0);
        Self {
            tx,
            transferred: AtomicU64::new(0),
            total,
            meter,
        }
    }

    /// Counts a completed chunk and publishes a snapshot.
    ///
    /// Never blocks: a full channel skips the update and a closed one means
    /// the observer went away, neither of which affects the transfer.
    pub(crate) fn chunk_done(&self, offset: u64, len: usize) {
        let transferred = self.transferred.fetch_add(len as u64, Ordering::Relaxed) + len as u64;
        self.meter.record(len as u64);

        let Some(tx) = &self.tx else {
            return;
        };
        let progress = TransferProgress {
            offset: offset + len as u64,
            transferred,
            total: self.total,
            bytes_per_second: self.meter.bytes_per_second(),
        };
        if let Err(e) = tx.try_send(progress) {
            trace!("progress update skipped: {e}");
        }
    }
}
