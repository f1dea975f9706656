//! The simulated device: SMP request handling over in-memory stores.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use mcumgr_protocol::cbor::{CborValue, MapWriter};
use mcumgr_protocol::constants::{field, fs_cmd, group, image_cmd, suit_cmd};
use mcumgr_protocol::{
    CborMap, McuMgrHeader, Operation, ResponseCode, Scheme, decode_frame, encode_frame,
};
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::{debug, trace, warn};

use crate::error::DeviceError;

/// What happens to a request picked by [`Faults::every_nth`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Answer with this code without processing the request.
    Code(ResponseCode),
    /// Never answer; the client sees a transport failure.
    Drop,
}

/// Fault injection settings.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Hit every n-th request (counting from 1).
    pub every_nth: Option<u64>,
    pub kind: Option<FaultKind>,
    /// Hold each response for a random time up to this, which reorders
    /// responses to concurrent requests.
    pub max_delay: Option<Duration>,
}

impl Faults {
    fn strike(&self, request: u64) -> Option<FaultKind> {
        let every = self.every_nth.filter(|n| *n > 0)?;
        (request % every == 0).then_some(self.kind?)
    }
}

/// Device behaviour knobs.
#[derive(Debug, Clone)]
pub struct SimOptions {
    /// Bytes returned per read.
    pub read_chunk_size: usize,
    /// Only accept upload chunks at the next expected offset, answering
    /// anything else with that offset (as MCUboot-based firmware does).
    pub strict_offsets: bool,
    /// Leave `"len"` out of the first download response.
    pub omit_download_length: bool,
    /// Report errors as SMP v2 `"err"` maps instead of `"rc"`.
    pub group_errors: bool,
    pub faults: Faults,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            read_chunk_size: 128,
            strict_offsets: false,
            omit_download_length: false,
            group_errors: false,
            faults: Faults::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum UploadKind {
    Image,
    File,
    Envelope,
    Resource,
    Cache,
}

/// Where a finished upload is stored, decided by its offset-0 chunk.
#[derive(Debug, Clone)]
enum Destination {
    Image { slot: u32, sha: Option<Vec<u8>> },
    File(String),
    Envelope,
    Resource(u64),
    Cache(u64),
}

#[derive(Debug)]
struct UploadSlot {
    total: u64,
    received: u64,
    next: u64,
    chunks: BTreeMap<u64, Vec<u8>>,
    destination: Destination,
}

impl UploadSlot {
    fn new(total: u64, destination: Destination) -> Self {
        Self {
            total,
            received: 0,
            next: 0,
            chunks: BTreeMap::new(),
            destination,
        }
    }

    /// Joins the chunks if they cover `0..total` without gaps.
    fn assemble(&self) -> Option<Vec<u8>> {
        if self.received != self.total {
            return None;
        }
        let mut out = Vec::with_capacity(self.total as usize);
        for (off, chunk) in &self.chunks {
            if *off != out.len() as u64 {
                return None;
            }
            out.extend_from_slice(chunk);
        }
        (out.len() as u64 == self.total).then_some(out)
    }
}

#[derive(Debug, Default)]
struct DeviceState {
    uploads: HashMap<UploadKind, UploadSlot>,
    images: HashMap<u32, Vec<u8>>,
    files: HashMap<String, Vec<u8>>,
    envelope: Option<Vec<u8>>,
    resources: HashMap<u64, Vec<u8>>,
    cache: HashMap<u64, Vec<u8>>,
    core: Option<Vec<u8>>,
}

enum Source {
    File,
    Core,
}

/// An SMP device kept entirely in memory.
///
/// Handles image upload, core dump download, file upload/download and the
/// SUIT uploads. Any other route gets `NotSupported`.
#[derive(Debug, Default)]
pub struct SimDevice {
    options: SimOptions,
    state: Mutex<DeviceState>,
    requests: AtomicU64,
}

impl SimDevice {
    pub fn new(options: SimOptions) -> Self {
        Self {
            options,
            state: Mutex::default(),
            requests: AtomicU64::new(0),
        }
    }

    pub fn options(&self) -> &SimOptions {
        &self.options
    }

    /// Requests seen so far, including faulted ones.
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn add_file(&self, name: impl Into<String>, data: Vec<u8>) {
        self.lock().files.insert(name.into(), data);
    }

    pub fn set_core(&self, data: Option<Vec<u8>>) {
        self.lock().core = data;
    }

    pub fn image(&self, slot: u32) -> Option<Vec<u8>> {
        self.lock().images.get(&slot).cloned()
    }

    pub fn file(&self, name: &str) -> Option<Vec<u8>> {
        self.lock().files.get(name).cloned()
    }

    pub fn envelope(&self) -> Option<Vec<u8>> {
        self.lock().envelope.clone()
    }

    pub fn resource(&self, session_id: u64) -> Option<Vec<u8>> {
        self.lock().resources.get(&session_id).cloned()
    }

    pub fn cache(&self, target_id: u64) -> Option<Vec<u8>> {
        self.lock().cache.get(&target_id).cloned()
    }

    /// Handles one request frame and returns the response frame, or `None`
    /// when the frame is dropped.
    pub async fn process(&self, scheme: Scheme, frame: &[u8]) -> Option<Vec<u8>> {
        let n = self.requests.fetch_add(1, Ordering::Relaxed) + 1;
        let (header, body) = match decode_frame(scheme, frame) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("undecodable request: {e}");
                return None;
            }
        };

        trace!(group = header.group, command = header.command, seq = header.seq, "request");

        let response = match self.options.faults.strike(n) {
            Some(FaultKind::Drop) => {
                debug!(seq = header.seq, "fault: dropping request");
                return None;
            }
            Some(FaultKind::Code(code)) => {
                debug!(seq = header.seq, %code, "fault: rejecting request");
                self.error_body(header.group, code)
            }
            None => self.handle(&header, &body).unwrap_or_else(|e| {
                debug!(seq = header.seq, "request failed: {e}");
                self.error_body(header.group, e.code())
            }),
        };

        if let Some(delay) = self.random_delay() {
            tokio::time::sleep(delay).await;
        }

        let Ok(len) = u16::try_from(response.len()) else {
            warn!(len = response.len(), "response too large");
            return None;
        };
        encode_frame(scheme, &header.response(len), &response).ok()
    }

    fn handle(&self, header: &McuMgrHeader, body: &CborMap) -> Result<Vec<u8>, DeviceError> {
        use Operation::{Read, Write};

        match (header.group, header.command, header.op) {
            (group::IMAGE, image_cmd::UPLOAD, Write) => self.upload(UploadKind::Image, body),
            (group::IMAGE, image_cmd::CORE_LOAD, Read) => self.download(Source::Core, body),
            (group::FS, fs_cmd::FILE, Write) => self.upload(UploadKind::File, body),
            (group::FS, fs_cmd::FILE, Read) => self.download(Source::File, body),
            (group::SUIT, suit_cmd::ENVELOPE_UPLOAD, Write) => {
                self.upload(UploadKind::Envelope, body)
            }
            (group::SUIT, suit_cmd::RESOURCE_UPLOAD, Write) => {
                self.upload(UploadKind::Resource, body)
            }
            (group::SUIT, suit_cmd::CACHE_RAW_UPLOAD, Write) => {
                self.upload(UploadKind::Cache, body)
            }
            _ => Err(DeviceError::Rejected(ResponseCode::NotSupported)),
        }
    }

    fn upload(&self, kind: UploadKind, body: &CborMap) -> Result<Vec<u8>, DeviceError> {
        let off = body.require_u64(field::OFF)?;
        let data = body.require_bytes(field::DATA)?;
        let end = off + data.len() as u64;

        let mut state = self.lock();
        if off == 0 {
            let total = body.require_u64(field::LEN)?;
            let destination = destination(kind, body)?;
            state.uploads.insert(kind, UploadSlot::new(total, destination));
        }

        let slot = state
            .uploads
            .get_mut(&kind)
            .ok_or(DeviceError::Rejected(ResponseCode::BadState))?;
        if end > slot.total {
            return Err(DeviceError::Rejected(ResponseCode::InValue));
        }
        if self.options.strict_offsets && off != slot.next {
            trace!(off, expected = slot.next, "out-of-order chunk");
            return Ok(ack(slot.next, None));
        }

        if let Some(previous) = slot.chunks.insert(off, data.to_vec()) {
            slot.received -= previous.len() as u64;
        }
        slot.received += data.len() as u64;
        slot.next = slot.next.max(end);

        let Some(assembled) = slot.assemble() else {
            return Ok(ack(end, None));
        };
        let Some(slot) = state.uploads.remove(&kind) else {
            return Ok(ack(end, None));
        };
        let matched = commit(&mut state, slot.destination, assembled)?;
        debug!(?kind, total = slot.total, "upload complete");
        Ok(ack(end, matched))
    }

    fn download(&self, source: Source, body: &CborMap) -> Result<Vec<u8>, DeviceError> {
        let off = body.require_u64(field::OFF)?;
        let state = self.lock();
        let content = match source {
            Source::File => state.files.get(body.require_text(field::NAME)?),
            Source::Core => state.core.as_ref(),
        }
        .ok_or(DeviceError::Rejected(ResponseCode::NoEntry))?;

        let len = content.len() as u64;
        if off > len {
            return Err(DeviceError::Rejected(ResponseCode::InValue));
        }
        let start = off as usize;
        let end = (start + self.options.read_chunk_size).min(content.len());

        let mut w = MapWriter::with_capacity(end - start + 16);
        w.uint(field::RC, 0)
            .uint(field::OFF, off)
            .bytes(field::DATA, &content[start..end]);
        if off == 0 && !self.options.omit_download_length {
            w.uint(field::LEN, len);
        }
        Ok(w.finish())
    }

    fn error_body(&self, group: u16, code: ResponseCode) -> Vec<u8> {
        let mut w = MapWriter::new();
        if self.options.group_errors {
            w.value(
                field::ERR,
                &CborValue::Map(vec![
                    (field::GROUP.into(), CborValue::Unsigned(group.into())),
                    (field::RC.into(), CborValue::Unsigned(code.raw())),
                ]),
            );
        } else {
            w.uint(field::RC, code.raw());
        }
        w.finish()
    }

    fn random_delay(&self) -> Option<Duration> {
        let max = self.options.faults.max_delay?;
        let ms = rand::thread_rng().gen_range(0..=max.as_millis() as u64);
        Some(Duration::from_millis(ms))
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn destination(kind: UploadKind, body: &CborMap) -> Result<Destination, DeviceError> {
    Ok(match kind {
        UploadKind::Image => {
            let slot = body.u64(field::IMAGE)?.unwrap_or(0);
            Destination::Image {
                slot: u32::try_from(slot).map_err(|_| DeviceError::Rejected(ResponseCode::InValue))?,
                sha: body.bytes(field::SHA)?.map(<[u8]>::to_vec),
            }
        }
        UploadKind::File => Destination::File(body.require_text(field::NAME)?.to_string()),
        UploadKind::Envelope => Destination::Envelope,
        UploadKind::Resource => Destination::Resource(body.require_u64(field::STREAM_SESSION_ID)?),
        UploadKind::Cache => Destination::Cache(body.require_u64(field::TARGET_ID)?),
    })
}

/// Stores a finished upload. Returns the image hash match, if checked.
fn commit(
    state: &mut DeviceState,
    destination: Destination,
    data: Vec<u8>,
) -> Result<Option<bool>, DeviceError> {
    match destination {
        Destination::Image { slot, sha } => {
            let matched = sha.map(|sha| {
                let digest = Sha256::digest(&data);
                digest.get(..sha.len()) == Some(sha.as_slice())
            });
            if matched == Some(false) {
                warn!(slot, "image hash mismatch");
                return Err(DeviceError::Rejected(ResponseCode::Corrupt));
            }
            state.images.insert(slot, data);
            Ok(matched)
        }
        Destination::File(name) => {
            state.files.insert(name, data);
            Ok(None)
        }
        Destination::Envelope => {
            state.envelope = Some(data);
            Ok(None)
        }
        Destination::Resource(id) => {
            state.resources.insert(id, data);
            Ok(None)
        }
        Destination::Cache(id) => {
            state.cache.insert(id, data);
            Ok(None)
        }
    }
}

fn ack(off: u64, matched: Option<bool>) -> Vec<u8> {
    let mut w = MapWriter::new();
    w.uint(field::RC, 0).uint(field::OFF, off);
    if let Some(matched) = matched {
        w.bool(field::MATCH, matched);
    }
    w.finish()
}

#[cfg(test)]
mod tests {
    use mcumgr_protocol::{McuMgrRequest, McuMgrResponse};

    use super::*;

    async fn exchange(device: &SimDevice, request: McuMgrRequest) -> Option<McuMgrResponse> {
        let frame = request.encode(Scheme::Standard, 1).unwrap();
        let response = device.process(Scheme::Standard, &frame).await?;
        Some(McuMgrResponse::decode(Scheme::Standard, &response).unwrap())
    }

    fn chunk(off: u64, len: Option<u64>, data: &[u8], name: Option<&str>) -> Vec<u8> {
        let mut w = MapWriter::new();
        w.uint("off", off);
        if let Some(len) = len {
            w.uint("len", len);
        }
        if let Some(name) = name {
            w.text("name", name);
        }
        w.bytes("data", data);
        w.finish()
    }

    #[tokio::test]
    async fn file_upload_in_two_chunks() {
        let device = SimDevice::default();
        let first = exchange(
            &device,
            McuMgrRequest::write(group::FS, fs_cmd::FILE, chunk(0, Some(6), b"abc", Some("/f"))),
        )
        .await
        .unwrap();
        assert_eq!(first.body.u64("off").unwrap(), Some(3));
        assert!(device.file("/f").is_none());

        exchange(
            &device,
            McuMgrRequest::write(group::FS, fs_cmd::FILE, chunk(3, None, b"def", Some("/f"))),
        )
        .await
        .unwrap();
        assert_eq!(device.file("/f").unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn image_hash_is_checked() {
        let device = SimDevice::default();
        let sha = Sha256::digest(b"firmware");
        let mut w = MapWriter::new();
        w.uint("off", 0)
            .uint("len", 8)
            .bytes("sha", &sha[..3])
            .bytes("data", b"firmware");
        let response = exchange(
            &device,
            McuMgrRequest::write(group::IMAGE, image_cmd::UPLOAD, w.finish()),
        )
        .await
        .unwrap();
        assert_eq!(response.body.bool("match").unwrap(), Some(true));
        assert_eq!(device.image(0).unwrap(), b"firmware");

        let mut w = MapWriter::new();
        w.uint("off", 0)
            .uint("len", 8)
            .bytes("sha", &[0, 0, 0])
            .bytes("data", b"firmware");
        let response = exchange(
            &device,
            McuMgrRequest::write(group::IMAGE, image_cmd::UPLOAD, w.finish()),
        )
        .await
        .unwrap();
        assert_eq!(response.code().unwrap(), ResponseCode::Corrupt);
    }

    #[tokio::test]
    async fn chunk_without_session_is_bad_state() {
        let device = SimDevice::default();
        let response = exchange(
            &device,
            McuMgrRequest::write(group::FS, fs_cmd::FILE, chunk(10, None, b"x", Some("/f"))),
        )
        .await
        .unwrap();
        assert_eq!(response.code().unwrap(), ResponseCode::BadState);
    }

    #[tokio::test]
    async fn strict_offsets_answer_with_expected_offset() {
        let device = SimDevice::new(SimOptions {
            strict_offsets: true,
            ..SimOptions::default()
        });
        exchange(
            &device,
            McuMgrRequest::write(group::FS, fs_cmd::FILE, chunk(0, Some(9), b"abc", Some("/f"))),
        )
        .await
        .unwrap();
        let response = exchange(
            &device,
            McuMgrRequest::write(group::FS, fs_cmd::FILE, chunk(6, None, b"ghi", Some("/f"))),
        )
        .await
        .unwrap();
        assert_eq!(response.body.u64("off").unwrap(), Some(3));
    }

    #[tokio::test]
    async fn download_reports_length_on_first_chunk() {
        let device = SimDevice::new(SimOptions {
            read_chunk_size: 4,
            ..SimOptions::default()
        });
        device.add_file("/log", b"0123456789".to_vec());

        let mut w = MapWriter::new();
        w.text("name", "/log").uint("off", 0);
        let first = exchange(&device, McuMgrRequest::read(group::FS, fs_cmd::FILE, w.finish()))
            .await
            .unwrap();
        assert_eq!(first.body.u64("len").unwrap(), Some(10));
        assert_eq!(first.body.bytes("data").unwrap(), Some(&b"0123"[..]));

        let mut w = MapWriter::new();
        w.text("name", "/log").uint("off", 8);
        let last = exchange(&device, McuMgrRequest::read(group::FS, fs_cmd::FILE, w.finish()))
            .await
            .unwrap();
        assert_eq!(last.body.u64("len").unwrap(), None);
        assert_eq!(last.body.bytes("data").unwrap(), Some(&b"89"[..]));
    }

    #[tokio::test]
    async fn missing_core_is_no_entry() {
        let device = SimDevice::default();
        let mut w = MapWriter::new();
        w.uint("off", 0);
        let response = exchange(
            &device,
            McuMgrRequest::read(group::IMAGE, image_cmd::CORE_LOAD, w.finish()),
        )
        .await
        .unwrap();
        assert_eq!(response.code().unwrap(), ResponseCode::NoEntry);
    }

    #[tokio::test]
    async fn group_errors_use_err_map() {
        let device = SimDevice::new(SimOptions {
            group_errors: true,
            ..SimOptions::default()
        });
        // Image state read has no route on the simulator.
        let response = exchange(&device, McuMgrRequest::read(group::IMAGE, 0, Vec::new()))
            .await
            .unwrap();
        assert_eq!(
            response.code().unwrap(),
            ResponseCode::Group {
                group: group::IMAGE,
                rc: ResponseCode::NotSupported.raw()
            }
        );
    }

    #[tokio::test]
    async fn faults_hit_every_nth_request() {
        let device = SimDevice::new(SimOptions {
            faults: Faults {
                every_nth: Some(2),
                kind: Some(FaultKind::Drop),
                max_delay: None,
            },
            ..SimOptions::default()
        });
        device.add_file("/f", vec![1; 4]);
        let read = || {
            let mut w = MapWriter::new();
            w.text("name", "/f").uint("off", 0);
            McuMgrRequest::read(group::FS, fs_cmd::FILE, w.finish())
        };
        assert!(exchange(&device, read()).await.is_some());
        assert!(exchange(&device, read()).await.is_none());
        assert!(exchange(&device, read()).await.is_some());
        assert_eq!(device.request_count(), 3);
    }
}
