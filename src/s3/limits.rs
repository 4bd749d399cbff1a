//! S3 multipart upload limits
//!
//! Block sizes are validated against these values before a stream starts
//! producing parts. Backends with other rules can inject their own
//! [`PartLimits`].
//!
//! # References
//! - [S3 Quotas](https://docs.aws.amazon.com/AmazonS3/latest/userguide/qfacts.html)
//! - [Multipart Upload Overview](https://docs.aws.amazon.com/AmazonS3/latest/userguide/mpuoverview.html)

/// Maximum size of a single multipart upload part (5 GiB)
///
/// Each part in a multipart upload (except the last) must be at least 5 MiB
/// and at most 5 GiB.
pub const MAX_PART_SIZE_BYTES: u64 = 5_368_709_120; // 5 GB

/// Minimum size of a multipart upload part (5 MiB)
///
/// The last part can be smaller than this minimum.
pub const MIN_PART_SIZE_BYTES: u64 = 5_242_880; // 5 MB

/// Maximum number of parts in a multipart upload, numbered 1 to 10,000
pub const MAX_PARTS_PER_UPLOAD: u32 = 10_000;

/// Bounds applied to a configured block size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartLimits {
    pub min: u64,
    pub max: u64,
}

impl Default for PartLimits {
    fn default() -> Self {
        Self {
            min: MIN_PART_SIZE_BYTES,
            max: MAX_PART_SIZE_BYTES,
        }
    }
}

impl PartLimits {
    /// A block holds at least one byte, a `min` of 0 is raised to 1
    #[must_use]
    pub const fn new(min: u64, max: u64) -> Self {
        Self {
            min: if min == 0 { 1 } else { min },
            max,
        }
    }

    /// Returns `block_size` corrected into `[min, max]`, never below 1.
    ///
    /// An out of range block size is an operator mistake, not a caller
    /// error, so it is fixed with a warning instead of failing.
    #[must_use]
    pub fn clamp(&self, block_size: u64) -> u64 {
        let min = self.min.max(1);

        if block_size < min {
            log::warn!("The minimum size of a single block is limited to {min}.");
            return min;
        }

        if block_size > self.max {
            log::warn!(
                "The maximum size of a single block is limited to {}.",
                self.max
            );
            return self.max;
        }

        block_size
    }
}
