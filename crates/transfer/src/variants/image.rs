//! Firmware image upload (image management group).

use mcumgr_protocol::cbor::CborValue;
use mcumgr_protocol::constants::{TRUNCATED_HASH_LEN, field, group, image_cmd};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::upload::UploadTarget;

/// First bytes of the image's SHA-256, sent with the offset-0 chunk so the
/// device can match a resumed or duplicate upload.
pub fn truncated_sha256(data: &[u8]) -> [u8; TRUNCATED_HASH_LEN] {
    let digest = Sha256::digest(data);
    let mut out = [0u8; TRUNCATED_HASH_LEN];
    out.copy_from_slice(&digest[..TRUNCATED_HASH_LEN]);
    out
}

/// Uploads a firmware image into slot `image`.
#[derive(Debug, Clone, Default)]
pub struct ImageUpload {
    pub image: u32,
    /// Ask the device to reject images older than the running one.
    pub upgrade: bool,
}

impl ImageUpload {
    pub fn new(image: u32) -> Self {
        Self {
            image,
            upgrade: false,
        }
    }

    pub fn with_upgrade(mut self, upgrade: bool) -> Self {
        self.upgrade = upgrade;
        self
    }
}

impl UploadTarget for ImageUpload {
    fn group(&self) -> u16 {
        group::IMAGE
    }

    fn command(&self) -> u8 {
        image_cmd::UPLOAD
    }

    fn extra_fields(&self, offset: u64, payload: &[u8]) -> Vec<(&'static str, CborValue)> {
        if offset != 0 {
            return Vec::new();
        }

        let sha = truncated_sha256(payload);
        debug!(image = self.image, sha = %hex::encode(sha), "image upload header");

        let mut fields = Vec::with_capacity(3);
        if self.image != 0 {
            fields.push((field::IMAGE, CborValue::Unsigned(self.image.into())));
        }
        if self.upgrade {
            fields.push((field::UPGRADE, CborValue::Bool(true)));
        }
        fields.push((field::SHA, CborValue::Bytes(sha.to_vec())));
        fields
    }
}
