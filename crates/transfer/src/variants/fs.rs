//! File system group transfers.

use mcumgr_protocol::cbor::CborValue;
use mcumgr_protocol::constants::{field, fs_cmd, group};

use crate::download::DownloadSource;
use crate::upload::UploadTarget;

/// Writes a file on the device's file system.
///
/// The device looks the file up by name on every chunk, so `"name"` goes
/// out with each request, not just the first.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub name: String,
}

impl FileUpload {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl UploadTarget for FileUpload {
    fn group(&self) -> u16 {
        group::FS
    }

    fn command(&self) -> u8 {
        fs_cmd::FILE
    }

    fn extra_fields(&self, _offset: u64, _payload: &[u8]) -> Vec<(&'static str, CborValue)> {
        vec![(field::NAME, CborValue::Text(self.name.clone()))]
    }
}

/// Reads a file from the device's file system.
#[derive(Debug, Clone)]
pub struct FileDownload {
    pub name: String,
}

impl FileDownload {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl DownloadSource for FileDownload {
    fn group(&self) -> u16 {
        group::FS
    }

    fn command(&self) -> u8 {
        fs_cmd::FILE
    }

    fn extra_fields(&self) -> Vec<(&'static str, CborValue)> {
        vec![(field::NAME, CborValue::Text(self.name.clone()))]
    }
}
