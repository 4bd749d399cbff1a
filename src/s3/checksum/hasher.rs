use bytes::Bytes;
use crc32c::crc32c_append;
use ring::digest::{Context, SHA1_FOR_LEGACY_USE_ONLY, SHA256};

/// Incremental checksum over the bytes of one block.
pub trait ChecksumHasher: Send + Sync {
    fn update(&mut self, bytes: &[u8]);

    fn finalize(self: Box<Self>) -> Bytes;
}

// CRC32
#[derive(Default)]
pub struct Crc32Hasher(crc32fast::Hasher);

impl ChecksumHasher for Crc32Hasher {
    fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    fn finalize(self: Box<Self>) -> Bytes {
        Bytes::copy_from_slice(&self.0.finalize().to_be_bytes())
    }
}

// CRC32C
#[derive(Default)]
pub struct Crc32cHasher(u32);

impl ChecksumHasher for Crc32cHasher {
    fn update(&mut self, bytes: &[u8]) {
        self.0 = crc32c_append(self.0, bytes);
    }

    fn finalize(self: Box<Self>) -> Bytes {
        Bytes::copy_from_slice(&self.0.to_be_bytes())
    }
}

// MD5, sent as Content-MD5
pub struct Md5Hasher(md5::Context);

impl Default for Md5Hasher {
    fn default() -> Self {
        Self(md5::Context::new())
    }
}

impl ChecksumHasher for Md5Hasher {
    fn update(&mut self, bytes: &[u8]) {
        self.0.consume(bytes);
    }

    fn finalize(self: Box<Self>) -> Bytes {
        Bytes::copy_from_slice(&self.0.finalize().0)
    }
}

// SHA1 and SHA256 share the ring context
pub struct RingHasher(Context);

impl RingHasher {
    #[must_use]
    pub fn sha1() -> Self {
        Self(Context::new(&SHA1_FOR_LEGACY_USE_ONLY))
    }

    #[must_use]
    pub fn sha256() -> Self {
        Self(Context::new(&SHA256))
    }
}

impl ChecksumHasher for RingHasher {
    fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    fn finalize(self: Box<Self>) -> Bytes {
        Bytes::copy_from_slice(self.0.finish().as_ref())
    }
}
