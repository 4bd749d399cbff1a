use crate::{
    s3::{
        checksum::DigestAlgorithm,
        limits::{MAX_PARTS_PER_UPLOAD, PartLimits},
        store::{ObjectStore, PartETag},
    },
    stream::{
        block::{Block, BlockWriter},
        dispatcher::{PartUploads, UploadPool},
        error::{Result, StreamError},
        pool::BufferPool,
    },
};
use anyhow::anyhow;
use futures::stream::TryStreamExt;
use std::sync::Arc;
use tokio::{io::AsyncRead, sync::mpsc::UnboundedSender};
use tokio_util::codec::{BytesCodec, FramedRead};

// 8MB
pub const DEFAULT_BLOCK_SIZE: u64 = 8 * 1_024 * 1_024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    pub block_size: u64,
    pub limits: PartLimits,
    pub digest: Option<DigestAlgorithm>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            limits: PartLimits::default(),
            digest: Some(DigestAlgorithm::Md5),
        }
    }
}

impl StreamOptions {
    #[must_use]
    pub fn new(block_size: u64) -> Self {
        Self {
            block_size,
            ..Default::default()
        }
    }

    #[must_use]
    pub const fn with_limits(mut self, limits: PartLimits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub const fn with_digest(mut self, digest: Option<DigestAlgorithm>) -> Self {
        self.digest = digest;
        self
    }

    /// Block size clamped into the part limits
    #[must_use]
    pub fn effective_block_size(&self) -> usize {
        usize::try_from(self.limits.clamp(self.block_size)).unwrap_or(usize::MAX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Closed,
}

/// Output stream for one object.
///
/// Bytes are buffered in blocks of `block_size`. An object that fits in one
/// block is stored with a single request, otherwise every block becomes a
/// part of a multipart upload; full blocks are uploaded in the background
/// while the caller keeps writing.
///
/// Nothing is stored until [`close`](Self::close) returns `Ok`.
#[derive(Debug)]
pub struct BlockOutputStream<S: ObjectStore> {
    store: Arc<S>,
    key: String,
    block_size: usize,
    digest: Option<DigestAlgorithm>,
    buffers: BufferPool,
    workers: UploadPool,
    current: Option<BlockWriter>,
    block_index: u32,
    upload_id: Option<String>,
    parts: PartUploads,
    bytes_written: u64,
    state: State,
}

impl<S: ObjectStore> BlockOutputStream<S> {
    /// # Errors
    /// Will return an error if the first buffer can not be acquired
    pub async fn new<K: Into<String>>(
        store: Arc<S>,
        key: K,
        options: StreamOptions,
        buffers: BufferPool,
        workers: UploadPool,
    ) -> Result<Self> {
        let key = key.into();
        let block_size = options.effective_block_size();

        log::debug!(
            "new block stream:
            key: {key}
            block size: {block_size}
            digest: {:?}
            upload workers: {}",
            options.digest,
            workers.workers()
        );

        let buffer = buffers.acquire(block_size).await?;

        Ok(Self {
            store,
            key,
            block_size,
            digest: options.digest,
            buffers,
            workers,
            current: Some(BlockWriter::new(0, buffer, options.digest)),
            block_index: 0,
            upload_id: None,
            parts: PartUploads::default(),
            bytes_written: 0,
            state: State::Open,
        })
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub const fn block_size(&self) -> usize {
        self.block_size
    }

    /// Multipart upload id, once a second block was started
    #[must_use]
    pub fn upload_id(&self) -> Option<&str> {
        self.upload_id.as_deref()
    }

    #[must_use]
    pub const fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Blocks produced so far, including the current one
    #[must_use]
    pub const fn blocks(&self) -> u32 {
        self.block_index + 1
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            State::Open => Ok(()),
            State::Closed => Err(StreamError::Closed),
        }
    }

    /// Buffer `bytes`, uploading every block that gets full.
    ///
    /// # Errors
    /// Will return an error if the stream is closed, a buffer can not be
    /// acquired or the upload session can not be created
    pub async fn write(&mut self, mut bytes: &[u8]) -> Result<()> {
        self.ensure_open()?;

        while !bytes.is_empty() {
            // a full block is only sent once more bytes arrive, the last
            // block is always handled by close
            if self.current.as_ref().is_some_and(BlockWriter::is_full) {
                self.upload_part().await?;
            }

            let written = self.current_block().await?.write(bytes);
            bytes = bytes.get(written..).unwrap_or_default();
            self.bytes_written += written as u64;
        }

        Ok(())
    }

    /// Write `length` bytes of `bytes` starting at `offset`.
    ///
    /// # Errors
    /// Will return an error if the range is out of bounds or [`write`](Self::write) fails
    pub async fn write_at(&mut self, bytes: &[u8], offset: usize, length: usize) -> Result<()> {
        let range = offset
            .checked_add(length)
            .and_then(|end| bytes.get(offset..end))
            .ok_or(StreamError::InvalidRange {
                offset,
                length,
                size: bytes.len(),
            })?;

        self.write(range).await
    }

    /// # Errors
    /// Will return an error if [`write`](Self::write) fails
    pub async fn write_u8(&mut self, byte: u8) -> Result<()> {
        self.write(&[byte]).await
    }

    /// Bytes are only buffered, there is nothing to push before close.
    ///
    /// # Errors
    /// Will return an error if the stream is closed
    pub fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;

        log::trace!(
            "flush: block {} has {} bytes",
            self.block_index,
            self.current.as_ref().map_or(0, BlockWriter::written)
        );

        Ok(())
    }

    /// Write everything `reader` yields, returns the number of bytes read.
    ///
    /// The length of every chunk is sent to `progress` if given.
    ///
    /// # Errors
    /// Will return an error if reading or writing fails
    pub async fn copy_from<R: AsyncRead + Unpin>(
        &mut self,
        reader: R,
        progress: Option<&UnboundedSender<usize>>,
    ) -> Result<u64> {
        // Buffer size is 256KB
        let mut frames = FramedRead::with_capacity(reader, BytesCodec::new(), 1024 * 256);
        let mut total: u64 = 0;

        while let Some(bytes) = frames.try_next().await? {
            self.write(&bytes).await?;
            total += bytes.len() as u64;

            if let Some(progress) = progress {
                progress.send(bytes.len()).ok();
            }
        }

        Ok(total)
    }

    async fn current_block(&mut self) -> Result<&mut BlockWriter> {
        let writer = match self.current.take() {
            Some(writer) => writer,
            // a previous rollover could not get a new buffer
            None => {
                let buffer = self.buffers.acquire(self.block_size).await?;
                BlockWriter::new(self.block_index, buffer, self.digest)
            }
        };

        Ok(self.current.insert(writer))
    }

    // send the current (full) block in the background and start a new one
    async fn upload_part(&mut self) -> Result<()> {
        // first rollover, the object needs a multipart upload
        if self.block_index == 0 {
            let upload_id = self
                .store
                .create_multipart_upload(&self.key)
                .await
                .map_err(StreamError::store)?;

            log::info!("key: {}, upload id: {upload_id}", self.key);

            self.upload_id = Some(upload_id);
        }

        let upload_id = self.upload_id.clone().ok_or_else(|| {
            StreamError::store(anyhow!("no upload id for {}", self.key))
        })?;

        let Some(writer) = self.current.take() else {
            return Ok(());
        };

        let block = writer.finish();
        let part_number = block.part_number();

        if part_number > MAX_PARTS_PER_UPLOAD {
            log::warn!(
                "part number {part_number} exceeds the limit of {MAX_PARTS_PER_UPLOAD} parts, increase the block size"
            );
        }

        log::debug!(
            "upload part... blockId: {}, written: {}",
            block.index(),
            block.len()
        );

        let store = Arc::clone(&self.store);
        let key = self.key.clone();

        let handle = self
            .workers
            .submit(async move {
                let result = store
                    .upload_part(
                        &key,
                        &upload_id,
                        part_number,
                        block.content(),
                        block.digest(),
                    )
                    .await;

                // the buffer goes back whatever the outcome
                block.release();

                result
            })
            .await;

        self.parts.push(part_number, handle);
        self.block_index += 1;

        let buffer = self.buffers.acquire(self.block_size).await?;
        self.current = Some(BlockWriter::new(self.block_index, buffer, self.digest));

        Ok(())
    }

    /// Store the object.
    ///
    /// A single block is stored with one request. Otherwise the last block
    /// is uploaded as the final part, every part is awaited and the
    /// multipart upload is completed; if any part fails the remaining ones
    /// are cancelled and the upload is aborted.
    ///
    /// The stream is closed even if this fails, calling it again does
    /// nothing. [`blocks`](Self::blocks) and
    /// [`bytes_written`](Self::bytes_written) keep their totals.
    ///
    /// # Errors
    /// Will return an error if the object could not be stored
    pub async fn close(&mut self) -> Result<()> {
        if self.state == State::Closed {
            return Ok(());
        }

        let result = self.commit().await;

        self.current = None;
        self.upload_id = None;
        self.state = State::Closed;

        result
    }

    /// Discard the object: pending parts are cancelled and the multipart
    /// upload, if any, is aborted. The stream is closed afterwards.
    ///
    /// # Errors
    /// Will return an error if the multipart upload could not be aborted
    pub async fn cancel(&mut self) -> Result<()> {
        if self.state == State::Closed {
            return Ok(());
        }

        self.parts.cancel().await;
        self.current = None;
        self.state = State::Closed;

        let Some(upload_id) = self.upload_id.take() else {
            log::info!("block stream for key '{}' cancelled", self.key);
            return Ok(());
        };

        log::warn!("aborting upload id {upload_id} for key '{}'", self.key);

        self.store
            .abort_multipart_upload(&self.key, &upload_id)
            .await
            .map_err(StreamError::store)
    }

    async fn commit(&mut self) -> Result<()> {
        let block = self.current.take().map(BlockWriter::finish);

        if self.block_index == 0 {
            return self.store_file(block).await;
        }

        let upload_id = self.upload_id.clone().ok_or_else(|| {
            StreamError::store(anyhow!("no upload id for {}", self.key))
        })?;

        let last = match block.filter(|b| !b.is_empty()) {
            Some(block) => match self.upload_last_part(&upload_id, block).await {
                Ok(part) => Some(part),
                Err(e) => {
                    self.parts.cancel().await;
                    return Err(self.abort_upload(&upload_id, e).await);
                }
            },
            None => None,
        };

        log::info!("waiting for {} part uploads", self.parts.len());

        let mut parts = match self.parts.join_all().await {
            Ok(parts) => parts,
            Err(e) => return Err(self.abort_upload(&upload_id, e).await),
        };

        parts.extend(last);

        if let Err(e) = self
            .store
            .complete_multipart_upload(&self.key, &upload_id, &parts)
            .await
        {
            return Err(self.abort_upload(&upload_id, e).await);
        }

        log::info!(
            "OutputStream for key '{}' upload complete, {} parts, {} bytes",
            self.key,
            parts.len(),
            self.bytes_written
        );

        Ok(())
    }

    async fn store_file(&self, block: Option<Block>) -> Result<()> {
        let (content, digest) = block
            .as_ref()
            .map_or((&[][..], None), |b| (b.content(), b.digest()));

        self.store
            .store_file(&self.key, content, digest)
            .await
            .map_err(StreamError::store)?;

        log::info!(
            "OutputStream for key '{}' upload complete, {} bytes",
            self.key,
            content.len()
        );

        Ok(())
    }

    // the last part is uploaded inline, nothing else is left to overlap with it
    async fn upload_last_part(
        &self,
        upload_id: &str,
        block: Block,
    ) -> anyhow::Result<PartETag> {
        let part_number = block.part_number();

        log::info!(
            "upload last part... blockId: {}, written: {}",
            block.index(),
            block.len()
        );

        let result = self
            .store
            .upload_part(
                &self.key,
                upload_id,
                part_number,
                block.content(),
                block.digest(),
            )
            .await;

        block.release();

        result.map_err(|e| e.context(format!("Error uploading last part number {part_number}")))
    }

    async fn abort_upload(&self, upload_id: &str, source: anyhow::Error) -> StreamError {
        log::error!(
            "Multipart upload with id: {upload_id} to {}: {source:#}",
            self.key
        );

        if let Err(e) = self
            .store
            .abort_multipart_upload(&self.key, upload_id)
            .await
        {
            log::error!("Error aborting upload id {upload_id}: {e}");
        }

        StreamError::MultipartUploadFailed {
            key: self.key.clone(),
            upload_id: upload_id.to_string(),
            source,
        }
    }
}

impl<S: ObjectStore> Drop for BlockOutputStream<S> {
    fn drop(&mut self) {
        if self.state == State::Open && (self.bytes_written > 0 || self.upload_id.is_some()) {
            log::warn!(
                "block stream for key '{}' dropped without close, {} bytes not stored",
                self.key,
                self.bytes_written
            );
        }

        self.parts.abort();
    }
}
