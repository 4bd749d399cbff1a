//! Common test helpers for the block stream integration tests
//!
//! `RecordingStore` is an in-memory `ObjectStore` that logs every call and
//! can be told to fail or stall specific requests.

#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::missing_panics_doc
)]

use anyhow::{Result, anyhow};
use blockput::{
    s3::{ObjectStore, PartETag, checksum::Digest},
    stream::{BufferPool, UploadPool},
};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

pub const UPLOAD_ID: &str = "upload-1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    StoreFile {
        key: String,
        content: Vec<u8>,
        digest: Option<Digest>,
    },
    Create {
        key: String,
    },
    UploadPart {
        number: u32,
        content: Vec<u8>,
        digest: Option<Digest>,
        thread: Option<String>,
    },
    Complete {
        parts: Vec<PartETag>,
    },
    Abort {
        upload_id: String,
    },
}

#[derive(Debug, Default)]
pub struct RecordingStore {
    calls: Mutex<Vec<Call>>,
    fail_parts: HashSet<u32>,
    part_delays: HashMap<u32, Duration>,
    fail_create: bool,
    fail_complete: bool,
    fail_store: bool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `upload_part` for `number` returns an error
    pub fn fail_part(mut self, number: u32) -> Self {
        self.fail_parts.insert(number);
        self
    }

    /// `upload_part` for `number` sleeps before answering
    pub fn delay_part(mut self, number: u32, delay: Duration) -> Self {
        self.part_delays.insert(number, delay);
        self
    }

    pub fn fail_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn fail_complete(mut self) -> Self {
        self.fail_complete = true;
        self
    }

    pub fn fail_store(mut self) -> Self {
        self.fail_store = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Part calls sorted by part number
    pub fn parts(&self) -> Vec<(u32, Vec<u8>)> {
        let mut parts = self
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::UploadPart {
                    number, content, ..
                } => Some((number, content)),
                _ => None,
            })
            .collect::<Vec<_>>();
        parts.sort_by_key(|(number, _)| *number);
        parts
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|call| matches(call)).count()
    }

    pub fn creates(&self) -> usize {
        self.count(|c| matches!(c, Call::Create { .. }))
    }

    pub fn completes(&self) -> usize {
        self.count(|c| matches!(c, Call::Complete { .. }))
    }

    pub fn aborts(&self) -> usize {
        self.count(|c| matches!(c, Call::Abort { .. }))
    }

    pub fn store_files(&self) -> usize {
        self.count(|c| matches!(c, Call::StoreFile { .. }))
    }

    /// Highest number of `upload_part` calls running at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl ObjectStore for RecordingStore {
    async fn store_file(&self, key: &str, content: &[u8], digest: Option<&Digest>) -> Result<()> {
        self.record(Call::StoreFile {
            key: key.to_string(),
            content: content.to_vec(),
            digest: digest.cloned(),
        });

        if self.fail_store {
            return Err(anyhow!("SlowDown: please reduce your request rate"));
        }

        Ok(())
    }

    async fn create_multipart_upload(&self, key: &str) -> Result<String> {
        self.record(Call::Create {
            key: key.to_string(),
        });

        if self.fail_create {
            return Err(anyhow!("AccessDenied"));
        }

        Ok(UPLOAD_ID.to_string())
    }

    async fn upload_part(
        &self,
        _key: &str,
        upload_id: &str,
        part_number: u32,
        content: &[u8],
        digest: Option<&Digest>,
    ) -> Result<PartETag> {
        assert_eq!(upload_id, UPLOAD_ID);

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        self.record(Call::UploadPart {
            number: part_number,
            content: content.to_vec(),
            digest: digest.cloned(),
            thread: std::thread::current().name().map(String::from),
        });

        if let Some(delay) = self.part_delays.get(&part_number) {
            tokio::time::sleep(*delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_parts.contains(&part_number) {
            return Err(anyhow!("InternalError: part {part_number}"));
        }

        Ok(PartETag::new(part_number, format!("etag-{part_number}")))
    }

    async fn complete_multipart_upload(
        &self,
        _key: &str,
        upload_id: &str,
        parts: &[PartETag],
    ) -> Result<()> {
        assert_eq!(upload_id, UPLOAD_ID);

        self.record(Call::Complete {
            parts: parts.to_vec(),
        });

        if self.fail_complete {
            return Err(anyhow!("InvalidPart"));
        }

        Ok(())
    }

    async fn abort_multipart_upload(&self, _key: &str, upload_id: &str) -> Result<()> {
        self.record(Call::Abort {
            upload_id: upload_id.to_string(),
        });
        Ok(())
    }
}

/// Pool and workers sized for small test blocks
pub fn pools(buffers: usize, block_size: usize, workers: usize) -> (BufferPool, UploadPool) {
    (
        BufferPool::new(buffers, block_size),
        UploadPool::current(workers).expect("tokio runtime"),
    )
}

/// `len` bytes cycling through the alphabet
pub fn alphabet(len: usize) -> Vec<u8> {
    (b'A'..=b'Z').cycle().take(len).collect()
}
