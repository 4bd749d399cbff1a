use crate::{
    s3::{
        checksum::DigestAlgorithm,
        limits::{MAX_PART_SIZE_BYTES, MIN_PART_SIZE_BYTES, PartLimits},
    },
    stream::{DEFAULT_BLOCK_SIZE, StreamOptions},
};
use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::{fs::File, path::Path};

// 32MB, four blocks of the default size
pub const DEFAULT_BUFFER_POOL_SIZE: u64 = 32 * 1_024 * 1_024;

/// Values read from `config.yml`, every key is optional:
///
/// ```yaml
/// ---
/// block_size: 8388608
/// buffer_pool_size: 33554432
/// upload_workers: 16
/// digest: md5
/// ```
#[derive(Debug, Default, Deserialize, Eq, PartialEq)]
pub struct Config {
    pub block_size: Option<u64>,
    pub buffer_pool_size: Option<u64>,
    pub upload_workers: Option<usize>,
    pub digest: Option<String>,
    pub min_part_size: Option<u64>,
    pub max_part_size: Option<u64>,
}

impl Config {
    /// # Errors
    /// Will return an error if the file can not be read or parsed
    pub fn new(config_path: &Path) -> Result<Self> {
        let file = File::open(config_path)
            .with_context(|| format!("unable to open: {}", config_path.display()))?;

        let config: Self =
            serde_yaml_ng::from_reader(file).context("unable to parse config file")?;

        Ok(config)
    }

    /// Like [`Config::new`] but a missing file is an empty config
    ///
    /// # Errors
    /// Will return an error if the file exists and can not be parsed
    pub fn load(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            Self::new(config_path)
        } else {
            log::debug!("no config file at {}", config_path.display());
            Ok(Self::default())
        }
    }

    /// A `min_part_size` of 0 is raised to 1 byte.
    ///
    /// # Errors
    /// Will return an error if `min_part_size` is bigger than `max_part_size`
    pub fn stream_options(&self) -> Result<StreamOptions> {
        let limits = PartLimits::new(
            self.min_part_size.unwrap_or(MIN_PART_SIZE_BYTES),
            self.max_part_size.unwrap_or(MAX_PART_SIZE_BYTES),
        );

        if limits.min > limits.max {
            return Err(anyhow!(
                "min_part_size ({}) is bigger than max_part_size ({})",
                limits.min,
                limits.max
            ));
        }

        let digest = self
            .digest
            .as_deref()
            .map_or(Some(DigestAlgorithm::Md5), DigestAlgorithm::resolve);

        Ok(
            StreamOptions::new(self.block_size.unwrap_or(DEFAULT_BLOCK_SIZE))
                .with_limits(limits)
                .with_digest(digest),
        )
    }

    #[must_use]
    pub fn buffer_pool_size(&self) -> u64 {
        self.buffer_pool_size.unwrap_or(DEFAULT_BUFFER_POOL_SIZE)
    }

    #[must_use]
    pub fn upload_workers(&self) -> usize {
        self.upload_workers
            .unwrap_or_else(|| num_cpus::get() * 5)
            .max(1)
    }
}
