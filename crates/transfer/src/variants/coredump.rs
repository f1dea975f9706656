use mcumgr_protocol::constants::{group, image_cmd};

use crate::download::DownloadSource;

/// Reads the core dump left by the last crash.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreDownload;

impl DownloadSource for CoreDownload {
    fn group(&self) -> u16 {
        group::IMAGE
    }

    fn command(&self) -> u8 {
        image_cmd::CORE_LOAD
    }
}
