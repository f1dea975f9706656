use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Engine settings, usually loaded from the `[transfer]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Upper bound on chunks in flight. The window starts at 1 and grows
    /// towards this on success.
    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,

    /// Attempts per chunk, the first one included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Every chunk except the last is a multiple of this many bytes.
    #[serde(default = "default_memory_alignment")]
    pub memory_alignment: usize,

    /// Pause before each retry.
    #[serde(default)]
    pub retry_delay_ms: u64,

    /// How often the CLI prints progress.
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

fn default_window_capacity() -> usize {
    1
}

fn default_max_attempts() -> u32 {
    5
}

fn default_memory_alignment() -> usize {
    1
}

fn default_progress_interval_ms() -> u64 {
    500
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            window_capacity: default_window_capacity(),
            max_attempts: default_max_attempts(),
            memory_alignment: default_memory_alignment(),
            retry_delay_ms: 0,
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

impl TransferConfig {
    pub fn with_window_capacity(mut self, capacity: usize) -> Self {
        self.window_capacity = capacity;
        self
    }

    pub fn with_memory_alignment(mut self, alignment: usize) -> Self {
        self.memory_alignment = alignment;
        self
    }

    pub fn retry_delay(&self) -> Option<Duration> {
        (self.retry_delay_ms > 0).then(|| Duration::from_millis(self.retry_delay_ms))
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}
