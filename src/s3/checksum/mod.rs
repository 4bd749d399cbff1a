pub mod hasher;

use anyhow::{Result, anyhow};
use base64ct::{Base64, Encoding};
use bytes::Bytes;
use hasher::{ChecksumHasher, Crc32Hasher, Crc32cHasher, Md5Hasher, RingHasher};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Crc32,
    Crc32c,
}

impl DigestAlgorithm {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Crc32 => "crc32",
            Self::Crc32c => "crc32c",
        }
    }

    #[must_use]
    pub fn hasher(self) -> Box<dyn ChecksumHasher> {
        match self {
            Self::Md5 => Box::<Md5Hasher>::default(),
            Self::Sha1 => Box::new(RingHasher::sha1()),
            Self::Sha256 => Box::new(RingHasher::sha256()),
            Self::Crc32 => Box::<Crc32Hasher>::default(),
            Self::Crc32c => Box::<Crc32cHasher>::default(),
        }
    }

    /// Resolve a configured algorithm name.
    ///
    /// `none` (or an empty name) disables digests. An unknown name also
    /// disables them, with a warning: uploads go out without an integrity
    /// attachment instead of failing.
    #[must_use]
    pub fn resolve(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() || name.eq_ignore_ascii_case("none") {
            return None;
        }

        match name.parse::<Self>() {
            Ok(algorithm) => Some(algorithm),
            Err(e) => {
                log::warn!("{e}, blocks will be uploaded without a digest");
                None
            }
        }
    }
}

impl FromStr for DigestAlgorithm {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            "crc32" => Ok(Self::Crc32),
            "crc32c" => Ok(Self::Crc32c),
            _ => Err(anyhow!("digest algorithm not available: {s}")),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Finished digest of one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    pub algorithm: DigestAlgorithm,
    pub value: Bytes,
}

impl Digest {
    #[must_use]
    pub fn compute(algorithm: DigestAlgorithm, content: &[u8]) -> Self {
        let mut hasher = algorithm.hasher();
        hasher.update(content);
        Self {
            algorithm,
            value: hasher.finalize(),
        }
    }

    /// Base64 value, the encoding used by `Content-MD5` and `x-amz-checksum-*`
    #[must_use]
    pub fn to_base64(&self) -> String {
        Base64::encode_string(&self.value)
    }

    #[must_use]
    pub fn matches(&self, content: &[u8]) -> bool {
        Self::compute(self.algorithm, content) == *self
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.to_base64())
    }
}
