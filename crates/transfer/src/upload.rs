//! Windowed chunked upload.

use std::sync::Arc;

use mcumgr_protocol::cbor::{CborValue, MapWriter, fields_len};
use mcumgr_protocol::constants::field;
use mcumgr_protocol::{CborMap, CodecError, McuMgrRequest};
use mcumgr_transport::{McuMgrResult, Transport};
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::config::TransferConfig;
use crate::error::{ChunkError, TransferError};
use crate::pipeline::Pipeline;
use crate::progress::{ProgressReporter, TransferProgress};
use crate::retry::with_retries;
use crate::sizing::ChunkSizer;
use crate::window::WindowSemaphore;

/// Where an upload goes and what each chunk carries besides its data.
pub trait UploadTarget: Send + Sync {
    fn group(&self) -> u16;

    fn command(&self) -> u8;

    /// Fields sent with the chunk at `offset`, in addition to `"off"`,
    /// `"len"` and `"data"`. `payload` is the whole upload.
    fn extra_fields(&self, offset: u64, payload: &[u8]) -> Vec<(&'static str, CborValue)> {
        let _ = (offset, payload);
        Vec::new()
    }
}

/// Encodes one write-chunk request body.
pub fn encode_chunk(
    offset: u64,
    total: u64,
    extra: &[(&'static str, CborValue)],
    data: &[u8],
) -> Vec<u8> {
    let mut w = MapWriter::with_capacity(data.len() + 32);
    w.uint(field::OFF, offset);
    if offset == 0 {
        w.uint(field::LEN, total);
    }
    w.fields(extra).bytes(field::DATA, data);
    w.finish()
}

/// Parses the acknowledged offset out of an upload response.
pub fn acknowledged_offset(body: &CborMap) -> Result<u64, CodecError> {
    body.require_u64(field::OFF)
}

/// Drives a write-chunk pipeline for one [`UploadTarget`].
pub struct Uploader<T> {
    transport: Arc<dyn Transport>,
    target: T,
    config: TransferConfig,
    progress: Option<mpsc::Sender<TransferProgress>>,
}

impl<T: UploadTarget> Uploader<T> {
    pub fn new(transport: Arc<dyn Transport>, target: T) -> Self {
        Self {
            transport,
            target,
            config: TransferConfig::default(),
            progress: None,
        }
    }

    pub fn with_config(mut self, config: TransferConfig) -> Self {
        self.config = config;
        self
    }

    /// Publishes a [`TransferProgress`] per acknowledged chunk.
    pub fn with_progress(mut self, tx: mpsc::Sender<TransferProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    /// Uploads `data`, returning once every byte is acknowledged.
    ///
    /// Chunks are dispatched in offset order without waiting for earlier
    /// ones; at most the window's size are in flight. An empty payload
    /// sends nothing.
    pub async fn upload(&self, data: &[u8]) -> Result<(), TransferError> {
        let total = data.len() as u64;
        if total == 0 {
            debug!("empty payload, nothing to upload");
            return Ok(());
        }

        let sizer = ChunkSizer::new(
            self.transport.mtu(),
            self.transport.scheme(),
            self.config.memory_alignment,
        );
        let reporter = Arc::new(ProgressReporter::new(self.progress.clone(), total));
        let config = Arc::new(self.config.clone());
        let mut pipeline = Pipeline::new(self.config.window_capacity);

        debug!(
            total,
            group = self.target.group(),
            command = self.target.command(),
            mtu = self.transport.mtu(),
            window = self.config.window_capacity,
            "starting upload"
        );

        let mut offset = 0u64;
        while offset < total {
            let extra = self.target.extra_fields(offset, data);
            let size = match sizer.chunk_size(offset, total, fields_len(&extra)) {
                Ok(size) => size,
                Err(e) => {
                    pipeline.fail(e);
                    break;
                }
            };

            if !pipeline.acquire().await {
                break;
            }

            let start = offset as usize;
            let body = encode_chunk(offset, total, &extra, &data[start..start + size]);
            let request = McuMgrRequest::write(self.target.group(), self.target.command(), body);
            trace!(offset, len = size, "dispatching chunk");

            pipeline.spawn(write_chunk(
                self.transport.clone(),
                pipeline.window(),
                config.clone(),
                reporter.clone(),
                request,
                offset,
                size,
            ));
            offset += size as u64;
        }

        pipeline.finish().await?;
        info!(total, "upload complete");
        Ok(())
    }
}

async fn write_chunk(
    transport: Arc<dyn Transport>,
    window: Arc<WindowSemaphore>,
    config: Arc<TransferConfig>,
    reporter: Arc<ProgressReporter>,
    request: McuMgrRequest,
    offset: u64,
    size: usize,
) -> Result<(), TransferError> {
    let expected = offset + size as u64;
    with_retries(Some(&window), &config, offset, || {
        let transport = transport.clone();
        let request = request.clone();
        async move {
            let exchange = transport.send(request).await;
            let acked = McuMgrResult::from_exchange(exchange, acknowledged_offset).into_result()?;
            if acked != expected {
                return Err(ChunkError::OffsetMismatch {
                    expected,
                    actual: acked,
                });
            }
            Ok(())
        }
    })
    .await?;

    reporter.chunk_done(offset, size);
    Ok(())
}
