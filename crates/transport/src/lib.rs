//! Transports carry one encoded SMP request and bring back one decoded
//! response.
//!
//! The transfer engines only see the [`Transport`] trait. This crate also
//! provides the per-session [`SequenceCounter`], the tri-state
//! [`McuMgrResult`] and [`StreamTransport`], which speaks the standard
//! scheme over any byte stream.

use std::future::Future;
use std::pin::Pin;

use mcumgr_protocol::{McuMgrRequest, McuMgrResponse, Scheme};

pub mod config;
pub mod error;
mod pumps;
pub mod result;
pub mod sequence;
pub mod stream;

pub use config::TransportConfig;
pub use error::TransportError;
pub use pumps::read::read_frame;
pub use result::{McuMgrError, McuMgrResult};
pub use sequence::SequenceCounter;
pub use stream::StreamTransport;

/// Future returned by [`Transport::send`].
pub type SendFuture<'a> =
    Pin<Box<dyn Future<Output = Result<McuMgrResponse, TransportError>> + Send + 'a>>;

/// A link to one device.
///
/// Implementations assign the sequence number, frame the request for their
/// [`Scheme`], enforce the MTU and match the response back to the request.
pub trait Transport: Send + Sync {
    fn send(&self, request: McuMgrRequest) -> SendFuture<'_>;

    /// Largest frame the link carries, header included.
    fn mtu(&self) -> usize;

    fn scheme(&self) -> Scheme;
}
