pub(crate) mod read;
pub(crate) mod write;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mcumgr_protocol::McuMgrResponse;
use tokio::sync::oneshot;

use crate::TransportError;

/// A request waiting for its response.
pub(crate) struct Waiter {
    /// Distinguishes requests that reuse a sequence number after wrap.
    pub(crate) ticket: u64,
    pub(crate) tx: oneshot::Sender<McuMgrResponse>,
}

/// Requests waiting for a response, keyed by sequence number.
///
/// Never held across an `.await`.
pub(crate) type PendingMap = Arc<Mutex<HashMap<u8, Waiter>>>;

pub(crate) fn lock(pending: &PendingMap) -> MutexGuard<'_, HashMap<u8, Waiter>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registration of one in-flight request. Dropping it frees the sequence
/// number, including when the request future itself is dropped mid-flight.
pub(crate) struct PendingEntry {
    pending: PendingMap,
    seq: u8,
    ticket: u64,
}

impl PendingEntry {
    pub(crate) fn register(
        pending: &PendingMap,
        seq: u8,
        ticket: u64,
        tx: oneshot::Sender<McuMgrResponse>,
    ) -> Result<Self, TransportError> {
        let mut map = lock(pending);
        if map.contains_key(&seq) {
            return Err(TransportError::SequenceBusy(seq));
        }
        map.insert(seq, Waiter { ticket, tx });
        Ok(Self {
            pending: pending.clone(),
            seq,
            ticket,
        })
    }
}

impl Drop for PendingEntry {
    fn drop(&mut self) {
        let mut map = lock(&self.pending);
        if map.get(&self.seq).is_some_and(|w| w.ticket == self.ticket) {
            map.remove(&self.seq);
        }
    }
}
