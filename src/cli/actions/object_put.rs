use crate::{
    cli::{globals::GlobalArgs, progressbar::Bar},
    s3::LocalStore,
    stream::{BlockOutputStream, BufferPool, StreamOptions, UploadPool},
};
use anyhow::{Context, Result};
use bytesize::ByteSize;
use std::{path::PathBuf, sync::Arc};
use tokio::{
    fs::File,
    io::AsyncRead,
    sync::mpsc::unbounded_channel,
};

#[derive(Debug)]
pub struct PutObject {
    pub key: String,
    /// `None` reads from STDIN
    pub file: Option<PathBuf>,
    pub options: StreamOptions,
}

/// Stream the input into the store, returns the number of bytes stored.
///
/// # Errors
/// Will return an error if the input can not be read or the object can not
/// be stored, nothing is left behind in that case
pub async fn handle(store: LocalStore, action: PutObject, globals: GlobalArgs) -> Result<u64> {
    let PutObject { key, file, options } = action;

    let (reader, pb): (Box<dyn AsyncRead + Unpin + Send>, Bar) = match &file {
        Some(path) => {
            let file = File::open(path)
                .await
                .with_context(|| format!("could not open {}", path.display()))?;
            let file_size = file.metadata().await?.len();

            log::info!("file path: {}, file size: {file_size}", path.display());

            (Box::new(file), Bar::new(file_size, globals.quiet))
        }
        None => (
            Box::new(tokio::io::stdin()),
            Bar::new_spinner_stream(globals.quiet),
        ),
    };

    let block_size = options.effective_block_size();
    let buffers = BufferPool::with_capacity(globals.buffer_pool, block_size);
    let workers = UploadPool::current(globals.workers)?;

    log::info!(
        "block size: {}, buffers: {}, workers: {}",
        ByteSize(block_size as u64),
        buffers.max_buffers(),
        workers.workers()
    );

    let mut stream = BlockOutputStream::new(Arc::new(store), key.as_str(), options, buffers, workers)
        .await
        .with_context(|| format!("could not open a stream for {key}"))?;

    // progress is updated from its own task so the writer never waits on the terminal
    let (sender, mut receiver) = unbounded_channel::<usize>();
    let progress = tokio::spawn(async move {
        while let Some(n) = receiver.recv().await {
            pb.inc(n as u64);
        }
        pb.finish();
    });

    let copied = stream.copy_from(reader, Some(&sender)).await;

    drop(sender);
    progress.await.ok();

    let total = match copied {
        Ok(total) => total,
        Err(e) => {
            if let Err(cancel_err) = stream.cancel().await {
                log::error!("could not cancel the upload of {key}: {cancel_err}");
            }
            return Err(e).with_context(|| format!("could not read the input for {key}"));
        }
    };

    stream
        .close()
        .await
        .with_context(|| format!("could not store {key}"))?;

    Ok(total)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::s3::limits::PartLimits;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[tokio::test]
    async fn test_put_file_in_blocks() {
        let root = TempDir::new().unwrap();
        let mut input = NamedTempFile::new().unwrap();
        let content = (0..=250_u8).cycle().take(10_000).collect::<Vec<_>>();
        input.write_all(&content).unwrap();

        let action = PutObject {
            key: String::from("backups/data.bin"),
            file: Some(input.path().to_path_buf()),
            options: StreamOptions::new(1024).with_limits(PartLimits::new(1024, 4096)),
        };

        let mut globals = GlobalArgs::new();
        globals.quiet = true;
        globals.set_workers(2);
        globals.set_buffer_pool(4096);

        let total = handle(LocalStore::new(root.path()), action, globals)
            .await
            .unwrap();

        assert_eq!(total, 10_000);
        let stored = std::fs::read(root.path().join("backups/data.bin")).unwrap();
        assert_eq!(stored, content);
    }

    #[tokio::test]
    async fn test_put_missing_file() {
        let root = TempDir::new().unwrap();
        let action = PutObject {
            key: String::from("x"),
            file: Some(root.path().join("missing")),
            options: StreamOptions::default(),
        };

        assert!(
            handle(LocalStore::new(root.path()), action, GlobalArgs::new())
                .await
                .is_err()
        );
        assert!(!root.path().join("x").exists());
    }
}
