use crate::{
    s3::checksum::{Digest, DigestAlgorithm, hasher::ChecksumHasher},
    stream::pool::PooledBuffer,
};
use std::fmt;

/// Running digest over the bytes of the current block.
///
/// Without an algorithm every call is a no-op and blocks carry no digest.
pub struct BlockDigest {
    algorithm: Option<DigestAlgorithm>,
    hasher: Option<Box<dyn ChecksumHasher>>,
}

impl BlockDigest {
    #[must_use]
    pub fn new(algorithm: Option<DigestAlgorithm>) -> Self {
        Self {
            algorithm,
            hasher: algorithm.map(DigestAlgorithm::hasher),
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        if let Some(hasher) = self.hasher.as_mut() {
            hasher.update(bytes);
        }
    }

    /// Digest of the bytes seen so far, the accumulator starts over.
    pub fn finish(&mut self) -> Option<Digest> {
        let algorithm = self.algorithm?;
        let hasher = self.hasher.replace(algorithm.hasher())?;

        Some(Digest {
            algorithm,
            value: hasher.finalize(),
        })
    }
}

impl fmt::Debug for BlockDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockDigest")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Block being filled by the stream.
#[derive(Debug)]
pub struct BlockWriter {
    index: u32,
    buffer: PooledBuffer,
    digest: BlockDigest,
}

impl BlockWriter {
    #[must_use]
    pub fn new(index: u32, buffer: PooledBuffer, algorithm: Option<DigestAlgorithm>) -> Self {
        Self {
            index,
            buffer,
            digest: BlockDigest::new(algorithm),
        }
    }

    /// Copy as much of `bytes` as the block still holds, returns the count.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let n = self.buffer.put(bytes);
        if let Some(written) = bytes.get(..n) {
            self.digest.update(written);
        }
        n
    }

    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    #[must_use]
    pub fn written(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.buffer.is_full()
    }

    /// Seal the block, no more bytes can be added.
    #[must_use]
    pub fn finish(mut self) -> Block {
        let digest = self.digest.finish();
        Block {
            index: self.index,
            buffer: self.buffer,
            digest,
        }
    }
}

/// Sealed block, ready to be uploaded.
#[derive(Debug)]
pub struct Block {
    index: u32,
    buffer: PooledBuffer,
    digest: Option<Digest>,
}

impl Block {
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Part numbers start at 1
    #[must_use]
    pub const fn part_number(&self) -> u32 {
        self.index + 1
    }

    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.buffer
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[must_use]
    pub const fn digest(&self) -> Option<&Digest> {
        self.digest.as_ref()
    }

    /// Return the buffer to its pool.
    pub fn release(self) {
        self.buffer.release();
    }
}
