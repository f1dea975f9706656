use std::sync::{Arc, Mutex, PoisonError};

use mcumgr_protocol::{McuMgrRequest, McuMgrResponse, Scheme};
use mcumgr_transport::{SendFuture, SequenceCounter, Transport, TransportError};
use tracing::trace;

use crate::device::SimDevice;

/// In-process [`Transport`] to a [`SimDevice`].
///
/// Frames go through the real codec for the configured scheme, so MTU
/// limits and header overhead behave as on a real link. A request the
/// device drops fails with [`TransportError::Timeout`].
pub struct LoopbackTransport {
    device: Arc<SimDevice>,
    mtu: usize,
    scheme: Scheme,
    sequence: SequenceCounter,
    sent: Mutex<Vec<Vec<u8>>>,
}

impl LoopbackTransport {
    pub fn new(device: Arc<SimDevice>, mtu: usize, scheme: Scheme) -> Self {
        Self {
            device,
            mtu,
            scheme,
            sequence: SequenceCounter::new(),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn with_sequence(mut self, sequence: SequenceCounter) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn device(&self) -> &Arc<SimDevice> {
        &self.device
    }

    /// Every request frame sent so far, in send order.
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn exchange(&self, request: McuMgrRequest) -> Result<McuMgrResponse, TransportError> {
        let seq = self.sequence.next();
        let frame = request.encode(self.scheme, seq)?;
        if frame.len() > self.mtu {
            return Err(TransportError::MtuExceeded {
                len: frame.len(),
                mtu: self.mtu,
            });
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(frame.clone());

        trace!(seq, len = frame.len(), "loopback send");
        let reply = self
            .device
            .process(self.scheme, &frame)
            .await
            .ok_or(TransportError::Timeout)?;
        let response = McuMgrResponse::decode(self.scheme, &reply)?;
        if response.header.seq != seq {
            return Err(TransportError::Closed);
        }
        Ok(response)
    }
}

impl Transport for LoopbackTransport {
    fn send(&self, request: McuMgrRequest) -> SendFuture<'_> {
        Box::pin(self.exchange(request))
    }

    fn mtu(&self) -> usize {
        self.mtu
    }

    fn scheme(&self) -> Scheme {
        self.scheme
    }
}
