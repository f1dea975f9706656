//! Chunked transfer engines for SMP.
//!
//! [`Uploader`] and [`Downloader`] split a payload into MTU-sized chunks,
//! keep up to a [`WindowSemaphore`]'s worth of them in flight, retry failed
//! chunks and stop the session on the first chunk that runs out of retries.
//! What is transferred is described by an [`UploadTarget`] or a
//! [`DownloadSource`]; the [`variants`] module has the standard ones.

pub mod config;
pub mod download;
pub mod error;
mod pipeline;
pub mod progress;
mod retry;
pub mod sizing;
pub mod upload;
pub mod variants;
pub mod window;

pub use config::TransferConfig;
pub use download::{DownloadSource, Downloader, ReadChunk};
pub use error::{ChunkError, TransferError};
pub use progress::{ThroughputMeter, TransferProgress};
pub use sizing::ChunkSizer;
pub use upload::{UploadTarget, Uploader};
pub use variants::{
    CacheUpload, CoreDownload, EnvelopeUpload, FileDownload, FileUpload, ImageUpload,
    ResourceUpload,
};
pub use window::WindowSemaphore;
