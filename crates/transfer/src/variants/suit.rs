//! SUIT group uploads: manifests (envelopes), resources requested by a
//! manifest and raw cache partitions.

use mcumgr_protocol::cbor::CborValue;
use mcumgr_protocol::constants::{field, group, suit_cmd};

use crate::upload::UploadTarget;

/// Uploads a SUIT envelope.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeUpload {
    /// Store the envelope without starting installation.
    pub defer_install: bool,
}

impl UploadTarget for EnvelopeUpload {
    fn group(&self) -> u16 {
        group::SUIT
    }

    fn command(&self) -> u8 {
        suit_cmd::ENVELOPE_UPLOAD
    }

    fn extra_fields(&self, offset: u64, _payload: &[u8]) -> Vec<(&'static str, CborValue)> {
        if offset == 0 && self.defer_install {
            vec![(field::DEFER_INSTALL, CborValue::Bool(true))]
        } else {
            Vec::new()
        }
    }
}

/// Answers a resource request the device raised while processing an
/// envelope, identified by its stream session.
#[derive(Debug, Clone)]
pub struct ResourceUpload {
    pub session_id: u64,
}

impl UploadTarget for ResourceUpload {
    fn group(&self) -> u16 {
        group::SUIT
    }

    fn command(&self) -> u8 {
        suit_cmd::RESOURCE_UPLOAD
    }

    fn extra_fields(&self, offset: u64, _payload: &[u8]) -> Vec<(&'static str, CborValue)> {
        if offset == 0 {
            vec![(field::STREAM_SESSION_ID, CborValue::Unsigned(self.session_id))]
        } else {
            Vec::new()
        }
    }
}

/// Fills the raw cache partition `target_id` ahead of an envelope upload.
#[derive(Debug, Clone)]
pub struct CacheUpload {
    pub target_id: u64,
}

impl UploadTarget for CacheUpload {
    fn group(&self) -> u16 {
        group::SUIT
    }

    fn command(&self) -> u8 {
        suit_cmd::CACHE_RAW_UPLOAD
    }

    fn extra_fields(&self, offset: u64, _payload: &[u8]) -> Vec<(&'static str, CborValue)> {
        if offset == 0 {
            vec![(field::TARGET_ID, CborValue::Unsigned(self.target_id))]
        } else {
            Vec::new()
        }
    }
}
