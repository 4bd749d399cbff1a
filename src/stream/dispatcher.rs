//! Concurrent part uploads
//!
//! [`UploadPool`] runs part uploads on a runtime with a bounded number in
//! flight. [`PartUploads`] keeps the handle of every submitted part in
//! submission order and joins them as a group: the first failure cancels
//! the rest.

use crate::s3::store::PartETag;
use anyhow::{Result, anyhow};
use futures::stream::{FuturesUnordered, StreamExt};
use std::{future::Future, sync::Arc};
use tokio::{
    runtime::Handle,
    sync::Semaphore,
    task::{AbortHandle, JoinError, JoinHandle},
};

/// Worker pool shared by any number of streams.
#[derive(Debug, Clone)]
pub struct UploadPool {
    handle: Handle,
    permits: Arc<Semaphore>,
    workers: usize,
}

impl UploadPool {
    #[must_use]
    pub fn new(handle: Handle, workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            handle,
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    /// Pool on the runtime of the caller
    ///
    /// # Errors
    /// Will return an error when called outside of a tokio runtime
    pub fn current(workers: usize) -> Result<Self> {
        let handle = Handle::try_current().map_err(|e| anyhow!("no tokio runtime: {e}"))?;
        Ok(Self::new(handle, workers))
    }

    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Uploads currently running
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.workers.saturating_sub(self.permits.available_permits())
    }

    /// Reject new tasks, they resolve to an error without running.
    pub fn close(&self) {
        self.permits.close();
    }

    /// Spawn `task` once a worker is free.
    ///
    /// Waiting for a worker is the backpressure applied to writers. If the
    /// pool is closed the task is dropped unpolled, releasing whatever it
    /// owns, and its handle resolves to an error.
    pub async fn submit<T, F>(&self, task: F) -> JoinHandle<Result<T>>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits).acquire_owned().await;

        self.handle.spawn(async move {
            let Ok(_permit) = permit else {
                drop(task);
                return Err(anyhow!("the upload pool is closed"));
            };
            task.await
        })
    }
}

#[derive(Debug)]
struct PendingUpload {
    part_number: u32,
    handle: JoinHandle<Result<PartETag>>,
}

/// Uploads submitted by one stream, in part order.
#[derive(Debug, Default)]
pub struct PartUploads {
    pending: Vec<PendingUpload>,
}

impl PartUploads {
    pub fn push(&mut self, part_number: u32, handle: JoinHandle<Result<PartETag>>) {
        self.pending.push(PendingUpload {
            part_number,
            handle,
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Wait for every upload and return the parts in submission order.
    ///
    /// On the first failure every other upload is aborted, and this only
    /// returns once they have all stopped, so their buffers are back in
    /// the pool.
    ///
    /// # Errors
    /// Will return the error of the first part that failed
    pub async fn join_all(&mut self) -> Result<Vec<PartETag>> {
        let pending = std::mem::take(&mut self.pending);
        let aborts = abort_handles(&pending);

        let mut parts: Vec<Option<PartETag>> = vec![None; pending.len()];

        let mut tasks = pending
            .into_iter()
            .enumerate()
            .map(|(slot, upload)| async move {
                (slot, upload.part_number, upload.handle.await)
            })
            .collect::<FuturesUnordered<_>>();

        while let Some((slot, number, result)) = tasks.next().await {
            match part_result(number, result) {
                Ok(part) => {
                    log::debug!("Uploaded part: {}, etag: {}", part.number, part.etag);

                    if let Some(entry) = parts.get_mut(slot) {
                        *entry = Some(part);
                    }
                }

                Err(e) => {
                    log::error!("cancelling part uploads: {e:#}");

                    for abort in &aborts {
                        abort.abort();
                    }

                    // wait for the aborted tasks to drop their blocks
                    while tasks.next().await.is_some() {}

                    return Err(e);
                }
            }
        }

        parts
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| anyhow!("missing part upload result"))
    }

    /// Abort every upload and wait until they stopped.
    pub async fn cancel(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        log::error!("cancelling {} part uploads", self.pending.len());

        let pending = std::mem::take(&mut self.pending);
        for upload in &pending {
            upload.handle.abort();
        }

        for upload in pending {
            // cancelled or finished, either way the task is gone
            let _ = upload.handle.await;
        }
    }

    /// Abort every upload without waiting.
    pub fn abort(&mut self) {
        for upload in self.pending.drain(..) {
            upload.handle.abort();
        }
    }
}

fn abort_handles(pending: &[PendingUpload]) -> Vec<AbortHandle> {
    pending.iter().map(|p| p.handle.abort_handle()).collect()
}

fn part_result(number: u32, result: Result<Result<PartETag>, JoinError>) -> Result<PartETag> {
    match result {
        Ok(Ok(part)) => Ok(part),
        Ok(Err(e)) => Err(e.context(format!("Error uploading part number {number}"))),
        Err(e) if e.is_cancelled() => Err(anyhow!("upload of part number {number} was cancelled")),
        Err(e) => Err(anyhow!("upload of part number {number} failed: {e}")),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };
    use tokio::time::{sleep, timeout};

    // counts the tasks whose state has been dropped
    struct DropGuard(Arc<AtomicUsize>);

    impl Drop for DropGuard {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_join_all_keeps_submission_order() {
        let pool = UploadPool::current(4).unwrap();
        let mut uploads = PartUploads::default();

        // later parts finish first
        for number in 1..=4_u32 {
            let handle = pool
                .submit(async move {
                    sleep(Duration::from_millis(u64::from(5 - number) * 10)).await;
                    Ok(PartETag::new(number, format!("etag-{number}")))
                })
                .await;
            uploads.push(number, handle);
        }
        assert_eq!(uploads.len(), 4);

        let parts = uploads.join_all().await.unwrap();
        let numbers = parts.iter().map(|p| p.number).collect::<Vec<_>>();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert_eq!(parts.first().unwrap().etag, "etag-1");
        assert!(uploads.is_empty());
    }

    #[tokio::test]
    async fn test_first_failure_cancels_the_rest() {
        let pool = UploadPool::current(4).unwrap();
        let dropped = Arc::new(AtomicUsize::new(0));
        let mut uploads = PartUploads::default();

        for number in 1..=3_u32 {
            let guard = DropGuard(Arc::clone(&dropped));
            let handle = pool
                .submit(async move {
                    let _guard = guard;
                    sleep(Duration::from_secs(3600)).await;
                    Ok(PartETag::new(number, "never"))
                })
                .await;
            uploads.push(number, handle);
        }

        let handle = pool
            .submit(async { Err::<PartETag, _>(anyhow!("connection reset")) })
            .await;
        uploads.push(4, handle);

        let err = timeout(Duration::from_secs(5), uploads.join_all())
            .await
            .expect("join_all should not wait for cancelled uploads")
            .unwrap_err();

        assert!(format!("{err:#}").contains("part number 4"));
        assert!(format!("{err:#}").contains("connection reset"));
        assert_eq!(dropped.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_submit_waits_for_a_worker() {
        let pool = UploadPool::current(1).unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let first = pool
            .submit(async move {
                rx.await.ok();
                Ok(1)
            })
            .await;
        tokio::task::yield_now().await;
        assert_eq!(pool.in_flight(), 1);

        // no free worker until the first task finishes
        assert!(
            timeout(Duration::from_millis(50), pool.submit(async { Ok(2) }))
                .await
                .is_err()
        );

        tx.send(()).unwrap();
        assert_eq!(first.await.unwrap().unwrap(), 1);

        let second = pool.submit(async { Ok(2) }).await;
        assert_eq!(second.await.unwrap().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_closed_pool_drops_tasks() {
        let pool = UploadPool::current(2).unwrap();
        let dropped = Arc::new(AtomicUsize::new(0));
        pool.close();

        let guard = DropGuard(Arc::clone(&dropped));
        let handle = pool
            .submit(async move {
                let _guard = guard;
                Ok(PartETag::new(1, "etag"))
            })
            .await;

        let mut uploads = PartUploads::default();
        uploads.push(1, handle);

        let err = uploads.join_all().await.unwrap_err();
        assert!(format!("{err:#}").contains("closed"));
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel() {
        let pool = UploadPool::current(2).unwrap();
        let dropped = Arc::new(AtomicUsize::new(0));
        let mut uploads = PartUploads::default();

        for number in 1..=2_u32 {
            let guard = DropGuard(Arc::clone(&dropped));
            let handle = pool
                .submit(async move {
                    let _guard = guard;
                    sleep(Duration::from_secs(3600)).await;
                    Ok(PartETag::new(number, "never"))
                })
                .await;
            uploads.push(number, handle);
        }

        uploads.cancel().await;
        assert!(uploads.is_empty());
        assert_eq!(dropped.load(Ordering::SeqCst), 2);
        assert_eq!(pool.in_flight(), 0);
    }
}
