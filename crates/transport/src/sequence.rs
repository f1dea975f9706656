use std::sync::atomic::{AtomicU8, Ordering};

/// Rotating 8-bit SMP sequence number, one per transport session.
#[derive(Debug, Default)]
pub struct SequenceCounter(AtomicU8);

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the rotation at `start` instead of 0.
    pub fn starting_at(start: u8) -> Self {
        Self(AtomicU8::new(start))
    }

    /// Returns the next sequence number, wrapping after 255.
    pub fn next(&self) -> u8 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_up_from_start() {
        let seq = SequenceCounter::starting_at(10);
        assert_eq!(seq.next(), 10);
        assert_eq!(seq.next(), 11);
    }

    #[test]
    fn wraps_after_255() {
        let seq = SequenceCounter::starting_at(254);
        assert_eq!(seq.next(), 254);
        assert_eq!(seq.next(), 255);
        assert_eq!(seq.next(), 0);
    }
}
