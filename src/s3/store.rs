//! Storage backend consumed by [`crate::stream::BlockOutputStream`]
//!
//! The calls mirror the S3 operations a block stream needs:
//! * `PutObject` for objects that fit in one block
//! * `CreateMultipartUpload` / `UploadPart` / `CompleteMultipartUpload`
//! * `AbortMultipartUpload` when a part can not be uploaded
//!
//! Retries belong to the implementation, the stream never retries a call.

use crate::s3::checksum::Digest;
use anyhow::Result;
use std::{fmt, future::Future};

/// Identifier returned for an uploaded part, required to complete the upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartETag {
    pub number: u32,
    pub etag: String,
}

impl PartETag {
    #[must_use]
    pub fn new<E: Into<String>>(number: u32, etag: E) -> Self {
        Self {
            number,
            etag: etag.into(),
        }
    }
}

impl fmt::Display for PartETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.number, self.etag)
    }
}

pub trait ObjectStore: Send + Sync + 'static {
    /// Store a whole object in one request.
    fn store_file(
        &self,
        key: &str,
        content: &[u8],
        digest: Option<&Digest>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Initiate a multipart upload and return its upload id.
    fn create_multipart_upload(&self, key: &str) -> impl Future<Output = Result<String>> + Send;

    /// Upload one part, `part_number` starts at 1.
    fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        content: &[u8],
        digest: Option<&Digest>,
    ) -> impl Future<Output = Result<PartETag>> + Send;

    /// `parts` are sorted by part number.
    fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartETag],
    ) -> impl Future<Output = Result<()>> + Send;

    fn abort_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}
