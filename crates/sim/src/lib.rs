//! A simulated SMP device.
//!
//! [`SimDevice`] answers image, file, core dump and SUIT transfer requests
//! from in-memory stores and can inject faults. Reach it in-process through
//! [`LoopbackTransport`] or over a stream with [`serve`].

pub mod device;
pub mod error;
pub mod loopback;
pub mod server;

pub use device::{FaultKind, Faults, SimDevice, SimOptions};
pub use error::DeviceError;
pub use loopback::LoopbackTransport;
pub use server::{serve, serve_tcp};
