//! Concrete upload targets and download sources.

pub mod coredump;
pub mod fs;
pub mod image;
pub mod suit;

pub use coredump::CoreDownload;
pub use fs::{FileDownload, FileUpload};
pub use image::ImageUpload;
pub use suit::{CacheUpload, EnvelopeUpload, ResourceUpload};
