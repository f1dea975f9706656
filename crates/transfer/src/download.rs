//! Windowed chunked download with reassembly.

use std::sync::Arc;

use mcumgr_protocol::cbor::{CborValue, MapWriter};
use mcumgr_protocol::constants::field;
use mcumgr_protocol::{CborMap, CodecError, McuMgrRequest};
use mcumgr_transport::{McuMgrResult, Transport};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, trace};

use crate::config::TransferConfig;
use crate::error::{ChunkError, TransferError};
use crate::pipeline::Pipeline;
use crate::progress::{ProgressReporter, TransferProgress};
use crate::retry::with_retries;
use crate::window::WindowSemaphore;

/// Where a download reads from.
pub trait DownloadSource: Send + Sync {
    fn group(&self) -> u16;

    fn command(&self) -> u8;

    /// Fields sent with every read besides `"off"`.
    fn extra_fields(&self) -> Vec<(&'static str, CborValue)> {
        Vec::new()
    }
}

/// One decoded read response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadChunk {
    pub off: u64,
    pub data: Vec<u8>,
    /// Total length; the device sends it with the offset-0 chunk.
    pub len: Option<u64>,
}

impl ReadChunk {
    pub fn parse(body: &CborMap) -> Result<Self, CodecError> {
        Ok(Self {
            off: body.require_u64(field::OFF)?,
            data: body.require_bytes(field::DATA)?.to_vec(),
            len: body.u64(field::LEN)?,
        })
    }
}

/// Encodes one read-chunk request body.
pub fn encode_read(offset: u64, extra: &[(&'static str, CborValue)]) -> Vec<u8> {
    let mut w = MapWriter::new();
    w.fields(extra).uint(field::OFF, offset);
    w.finish()
}

/// Drives a read-chunk pipeline for one [`DownloadSource`].
pub struct Downloader<S> {
    transport: Arc<dyn Transport>,
    source: S,
    config: TransferConfig,
    progress: Option<mpsc::Sender<TransferProgress>>,
}

impl<S: DownloadSource> Downloader<S> {
    pub fn new(transport: Arc<dyn Transport>, source: S) -> Self {
        Self {
            transport,
            source,
            config: TransferConfig::default(),
            progress: None,
        }
    }

    pub fn with_config(mut self, config: TransferConfig) -> Self {
        self.config = config;
        self
    }

    /// Publishes a [`TransferProgress`] per received chunk after the first.
    pub fn with_progress(mut self, tx: mpsc::Sender<TransferProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Downloads the whole object.
    ///
    /// The offset-0 read runs alone and tells the total length and the chunk
    /// size the device uses; the rest is read through the window.
    pub async fn download(&self) -> Result<Vec<u8>, TransferError> {
        let extra = Arc::new(self.source.extra_fields());
        let config = Arc::new(self.config.clone());
        let reader = ChunkReader {
            transport: self.transport.clone(),
            group: self.source.group(),
            command: self.source.command(),
            extra,
        };

        debug!(
            group = reader.group,
            command = reader.command,
            window = self.config.window_capacity,
            "starting download"
        );

        let first = with_retries(None, &config, 0, || reader.read(0)).await?;
        let total = first.len.ok_or(TransferError::MissingLength)?;
        let expected = first.data.len();

        let invalid = TransferError::InvalidLength {
            total,
            first_chunk: expected,
        };
        if expected as u64 > total || (expected == 0 && total > 0) {
            return Err(invalid);
        }
        let Ok(size) = usize::try_from(total) else {
            return Err(invalid);
        };
        if expected == size {
            info!(total, "download complete");
            return Ok(first.data);
        }

        let mut buffer = vec![0u8; size];
        buffer[..expected].copy_from_slice(&first.data);
        let buffer = Arc::new(Mutex::new(buffer));

        let reporter = Arc::new(ProgressReporter::new(self.progress.clone(), total));
        reporter.chunk_done(0, expected);
        let reader = Arc::new(reader);
        let mut pipeline = Pipeline::new(self.config.window_capacity);

        debug!(total, chunk = expected, "length known, reading remaining chunks");

        let mut offset = expected as u64;
        while offset < total {
            if !pipeline.acquire().await {
                break;
            }
            trace!(offset, "dispatching read");
            pipeline.spawn(read_chunk(
                reader.clone(),
                pipeline.window(),
                config.clone(),
                reporter.clone(),
                buffer.clone(),
                offset,
                expected,
                total,
            ));
            offset += expected as u64;
        }

        pipeline.finish().await?;

        let data = match Arc::try_unwrap(buffer) {
            Ok(buffer) => buffer.into_inner(),
            Err(shared) => shared.lock().await.clone(),
        };
        info!(total, "download complete");
        Ok(data)
    }
}

/// Issues read requests for one source.
struct ChunkReader {
    transport: Arc<dyn Transport>,
    group: u16,
    command: u8,
    extra: Arc<Vec<(&'static str, CborValue)>>,
}

impl ChunkReader {
    async fn read(&self, offset: u64) -> Result<ReadChunk, ChunkError> {
        let request = McuMgrRequest::read(self.group, self.command, encode_read(offset, &self.extra));
        let exchange = self.transport.send(request).await;
        let chunk = McuMgrResult::from_exchange(exchange, ReadChunk::parse).into_result()?;
        if chunk.off != offset {
            return Err(ChunkError::OffsetMismatch {
                expected: offset,
                actual: chunk.off,
            });
        }
        Ok(chunk)
    }
}

#[allow(clippy::too_many_arguments)]
async fn read_chunk(
    reader: Arc<ChunkReader>,
    window: Arc<WindowSemaphore>,
    config: Arc<TransferConfig>,
    reporter: Arc<ProgressReporter>,
    buffer: Arc<Mutex<Vec<u8>>>,
    offset: u64,
    expected: usize,
    total: u64,
) -> Result<(), TransferError> {
    let reader = &reader;
    let chunk = with_retries(Some(&window), &config, offset, || async move {
        let chunk = reader.read(offset).await?;
        let actual = chunk.data.len();
        let end = offset + actual as u64;
        let last = end == total;
        if end > total || (actual != expected && !last) {
            return Err(ChunkError::SizeMismatch {
                offset,
                expected,
                actual,
            });
        }
        Ok(chunk)
    })
    .await?;

    let start = offset as usize;
    let len = chunk.data.len();
    buffer.lock().await[start..start + len].copy_from_slice(&chunk.data);
    reporter.chunk_done(offset, len);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use mcumgr_protocol::{McuMgrHeader, McuMgrResponse, Operation, ResponseCode, Scheme};
    use mcumgr_transport::{SendFuture, TransportError};

    use super::*;

    /// Serves `data` in `chunk`-byte reads.
    struct MockFile {
        data: Vec<u8>,
        chunk: usize,
        send_len: bool,
        /// Reverses completion order by delaying earlier offsets more.
        reorder: bool,
        rc: Option<u64>,
        reads: StdMutex<Vec<u64>>,
    }

    impl MockFile {
        fn new(data: Vec<u8>, chunk: usize) -> Self {
            Self {
                data,
                chunk,
                send_len: true,
                reorder: false,
                rc: None,
                reads: StdMutex::new(Vec::new()),
            }
        }
    }

    fn response(body: Vec<u8>) -> McuMgrResponse {
        McuMgrResponse {
            header: McuMgrHeader {
                version: 1,
                op: Operation::ReadResponse,
                flags: 0,
                len: body.len() as u16,
                group: 8,
                seq: 0,
                command: 0,
            },
            body: CborMap::decode(&body).unwrap(),
        }
    }

    impl Transport for MockFile {
        fn send(&self, request: McuMgrRequest) -> SendFuture<'_> {
            Box::pin(async move {
                let body = CborMap::decode(&request.body)?;
                let off = body.require_u64("off")?;
                self.reads.lock().unwrap().push(off);

                let mut w = MapWriter::new();
                if let Some(rc) = self.rc {
                    w.uint("rc", rc);
                    return Ok(response(w.finish()));
                }
                if self.reorder {
                    let delay = 50u64.saturating_sub(off / self.chunk as u64 * 5);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                let start = (off as usize).min(self.data.len());
                let end = (start + self.chunk).min(self.data.len());
                w.uint("off", off).bytes("data", &self.data[start..end]);
                if off == 0 && self.send_len {
                    w.uint("len", self.data.len() as u64);
                }
                Ok(response(w.finish()))
            })
        }

        fn mtu(&self) -> usize {
            512
        }

        fn scheme(&self) -> Scheme {
            Scheme::Standard
        }
    }

    struct File;

    impl DownloadSource for File {
        fn group(&self) -> u16 {
            8
        }
        fn command(&self) -> u8 {
            0
        }
        fn extra_fields(&self) -> Vec<(&'static str, CborValue)> {
            vec![("name", CborValue::Text("/lfs/log".into()))]
        }
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 253) as u8).collect()
    }

    #[tokio::test]
    async fn reassembles_multi_chunk_file() {
        let data = payload(1000);
        let file = Arc::new(MockFile::new(data.clone(), 128));
        let got = Downloader::new(file.clone(), File)
            .with_config(TransferConfig::default().with_window_capacity(4))
            .download()
            .await
            .unwrap();
        assert_eq!(got, data);
        assert_eq!(file.reads.lock().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn single_chunk_file() {
        let data = payload(50);
        let got = Downloader::new(Arc::new(MockFile::new(data.clone(), 128)), File)
            .download()
            .await
            .unwrap();
        assert_eq!(got, data);
    }

    #[tokio::test]
    async fn empty_file() {
        let got = Downloader::new(Arc::new(MockFile::new(Vec::new(), 128)), File)
            .download()
            .await
            .unwrap();
        assert!(got.is_empty());
    }

    #[tokio::test]
    async fn reverse_completion_order() {
        let data = payload(2000);
        let mut file = MockFile::new(data.clone(), 100);
        file.reorder = true;
        let got = Downloader::new(Arc::new(file), File)
            .with_config(TransferConfig::default().with_window_capacity(16))
            .download()
            .await
            .unwrap();
        assert_eq!(got, data);
    }

    #[tokio::test]
    async fn missing_length_is_fatal_without_retry() {
        let mut file = MockFile::new(payload(500), 100);
        file.send_len = false;
        let file = Arc::new(file);
        let err = Downloader::new(file.clone(), File)
            .download()
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::MissingLength));
        assert_eq!(file.reads.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn no_entry_is_protocol_error() {
        let mut file = MockFile::new(Vec::new(), 100);
        file.rc = Some(5);
        let err = Downloader::new(Arc::new(file), File)
            .download()
            .await
            .unwrap_err();
        assert_eq!(err.response_code(), Some(ResponseCode::NoEntry));
        assert!(err.is_protocol_error());
    }

    #[tokio::test]
    async fn short_middle_chunk_is_rejected() {
        struct Short;
        impl Transport for Short {
            fn send(&self, request: McuMgrRequest) -> SendFuture<'_> {
                Box::pin(async move {
                    let off = CborMap::decode(&request.body)?.require_u64("off")?;
                    let mut w = MapWriter::new();
                    w.uint("off", off);
                    if off == 0 {
                        w.bytes("data", &[0; 100]).uint("len", 1000);
                    } else {
                        w.bytes("data", &[0; 60]);
                    }
                    Ok(response(w.finish()))
                })
            }
            fn mtu(&self) -> usize {
                512
            }
            fn scheme(&self) -> Scheme {
                Scheme::Standard
            }
        }

        let err = Downloader::new(Arc::new(Short), File)
            .download()
            .await
            .unwrap_err();
        assert!(matches!(
            err.chunk_error(),
            Some(ChunkError::SizeMismatch {
                offset: 100,
                expected: 100,
                actual: 60
            })
        ));
    }

    #[tokio::test]
    async fn first_chunk_longer_than_total_is_invalid() {
        struct Liar;
        impl Transport for Liar {
            fn send(&self, _request: McuMgrRequest) -> SendFuture<'_> {
                Box::pin(async {
                    let mut w = MapWriter::new();
                    w.uint("off", 0).bytes("data", &[1; 20]).uint("len", 10);
                    Ok(response(w.finish()))
                })
            }
            fn mtu(&self) -> usize {
                512
            }
            fn scheme(&self) -> Scheme {
                Scheme::Standard
            }
        }

        let err = Downloader::new(Arc::new(Liar), File)
            .download()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransferError::InvalidLength {
                total: 10,
                first_chunk: 20
            }
        ));
    }

    #[tokio::test]
    async fn transport_failure_on_first_read_is_retried() {
        struct Flaky(StdMutex<u32>, Vec<u8>);
        impl Transport for Flaky {
            fn send(&self, _request: McuMgrRequest) -> SendFuture<'_> {
                Box::pin(async move {
                    let mut calls = self.0.lock().unwrap();
                    *calls += 1;
                    if *calls < 3 {
                        return Err(TransportError::Timeout);
                    }
                    let mut w = MapWriter::new();
                    w.uint("off", 0).bytes("data", &self.1).uint("len", self.1.len() as u64);
                    Ok(response(w.finish()))
                })
            }
            fn mtu(&self) -> usize {
                512
            }
            fn scheme(&self) -> Scheme {
                Scheme::Standard
            }
        }

        let flaky = Arc::new(Flaky(StdMutex::new(0), payload(30)));
        let got = Downloader::new(flaky.clone(), File).download().await.unwrap();
        assert_eq!(got, payload(30));
        assert_eq!(*flaky.0.lock().unwrap(), 3);
    }

    #[test]
    fn read_request_carries_extra_fields() {
        let body = encode_read(256, &[("name", CborValue::Text("/a".into()))]);
        let map = CborMap::decode(&body).unwrap();
        assert_eq!(map.u64("off").unwrap(), Some(256));
        assert_eq!(map.text("name").unwrap(), Some("/a"));
    }
}
