//! Object store backed by a local directory
//!
//! Objects live at `<root>/<key>`. A multipart upload is staged under
//! `<root>/.multipart/<upload_id>/` and concatenated into the object on
//! completion, the object only appears once every part is in place.

use crate::s3::{
    checksum::Digest,
    limits::MAX_PARTS_PER_UPLOAD,
    store::{ObjectStore, PartETag},
};
use anyhow::{Context, Result, anyhow, bail};
use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};
use tokio::{fs, io::AsyncWriteExt};

const MULTIPART_DIR: &str = ".multipart";
const KEY_FILE: &str = "key";

#[derive(Debug)]
pub struct LocalStore {
    root: PathBuf,
    sequence: AtomicU64,
}

impl LocalStore {
    #[must_use]
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            sequence: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the object stored under `key`
    ///
    /// # Errors
    /// Will return an error if the key is empty or tries to leave the root
    pub fn object_path(&self, key: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for segment in clean_key(key)? {
            path.push(segment);
        }
        Ok(path)
    }

    fn upload_dir(&self, upload_id: &str) -> Result<PathBuf> {
        if upload_id.len() != 64 || !upload_id.chars().all(|c| c.is_ascii_hexdigit()) {
            bail!("NoSuchUpload: invalid upload id {upload_id}");
        }
        Ok(self.root.join(MULTIPART_DIR).join(upload_id))
    }

    // the upload must exist and belong to key
    async fn session_dir(&self, key: &str, upload_id: &str) -> Result<PathBuf> {
        let dir = self.upload_dir(upload_id)?;
        let owner = fs::read_to_string(dir.join(KEY_FILE))
            .await
            .with_context(|| format!("NoSuchUpload: {upload_id}"))?;

        if owner != key {
            bail!("NoSuchUpload: upload id {upload_id} does not belong to {key}");
        }

        Ok(dir)
    }

    fn temp_path(&self, path: &Path) -> PathBuf {
        let n = self.sequence.fetch_add(1, Ordering::Relaxed);
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!(".{name}.{n}.tmp"))
    }

    async fn write_atomic(&self, path: &Path, content: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("unable to create: {}", parent.display()))?;
        }

        let tmp = self.temp_path(path);
        fs::write(&tmp, content)
            .await
            .with_context(|| format!("unable to write: {}", tmp.display()))?;

        if let Err(e) = fs::rename(&tmp, path).await {
            fs::remove_file(&tmp).await.ok();
            return Err(e).with_context(|| {
                format!("unable to rename {} to {}", tmp.display(), path.display())
            });
        }

        Ok(())
    }
}

fn clean_key(key: &str) -> Result<Vec<&str>> {
    // remove leading / or //
    let segments = key
        .split('/')
        .filter(|p| !p.is_empty())
        .collect::<Vec<&str>>();

    if segments.is_empty() {
        bail!("invalid key: {key:?}");
    }

    if segments.iter().any(|s| *s == "." || *s == "..") || segments.first() == Some(&MULTIPART_DIR)
    {
        bail!("invalid key: {key:?}");
    }

    Ok(segments)
}

fn etag(content: &[u8]) -> String {
    format!("\"{:x}\"", md5::compute(content))
}

fn verify(digest: Option<&Digest>, content: &[u8]) -> Result<()> {
    match digest {
        Some(digest) if !digest.matches(content) => Err(anyhow!(
            "BadDigest: the {} digest {} did not match the content",
            digest.algorithm,
            digest.to_base64()
        )),
        _ => Ok(()),
    }
}

fn part_path(dir: &Path, number: u32) -> PathBuf {
    dir.join(format!("{number:05}"))
}

// concatenate the staged parts of `dir` into `tmp` and move it to `path`,
// the object only appears through the rename
async fn assemble(tmp: &Path, path: &Path, dir: &Path, parts: &[PartETag]) -> Result<()> {
    let mut object = fs::File::create(tmp)
        .await
        .with_context(|| format!("unable to create: {}", tmp.display()))?;

    for part in parts {
        let data = fs::read(part_path(dir, part.number))
            .await
            .map_err(|e| anyhow!("InvalidPart: part {} not found: {e}", part.number))?;

        if etag(&data) != part.etag {
            bail!("InvalidPart: ETag mismatch for part {}", part.number);
        }

        object.write_all(&data).await?;
    }

    object.flush().await?;
    object.sync_all().await?;
    drop(object);

    fs::rename(tmp, path)
        .await
        .with_context(|| format!("unable to rename {} to {}", tmp.display(), path.display()))
}

impl ObjectStore for LocalStore {
    async fn store_file(&self, key: &str, content: &[u8], digest: Option<&Digest>) -> Result<()> {
        verify(digest, content)?;

        let path = self.object_path(key)?;
        self.write_atomic(&path, content).await?;

        log::debug!("stored {} bytes in {}", content.len(), path.display());

        Ok(())
    }

    async fn create_multipart_upload(&self, key: &str) -> Result<String> {
        clean_key(key)?;

        let n = self.sequence.fetch_add(1, Ordering::Relaxed);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let upload_id = blake3::hash(format!("{key}:{nanos}:{n}").as_bytes())
            .to_hex()
            .to_string();

        let dir = self.upload_dir(&upload_id)?;
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("unable to create: {}", dir.display()))?;
        fs::write(dir.join(KEY_FILE), key).await?;

        log::debug!("created upload id {upload_id} for {key}");

        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        content: &[u8],
        digest: Option<&Digest>,
    ) -> Result<PartETag> {
        if !(1..=MAX_PARTS_PER_UPLOAD).contains(&part_number) {
            bail!("InvalidArgument: part number must be between 1 and {MAX_PARTS_PER_UPLOAD}");
        }

        verify(digest, content)?;

        let dir = self.session_dir(key, upload_id).await?;
        self.write_atomic(&part_path(&dir, part_number), content)
            .await?;

        Ok(PartETag::new(part_number, etag(content)))
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartETag],
    ) -> Result<()> {
        let dir = self.session_dir(key, upload_id).await?;

        if parts.is_empty() {
            bail!("MalformedXML: at least one part is required");
        }

        if parts.windows(2).any(|w| matches!(w, [a, b] if a.number >= b.number)) {
            bail!("InvalidPartOrder: parts must be listed in ascending order");
        }

        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let tmp = self.temp_path(&path);

        if let Err(e) = assemble(&tmp, &path, &dir, parts).await {
            fs::remove_file(&tmp).await.ok();
            return Err(e);
        }

        fs::remove_dir_all(&dir).await?;

        log::debug!("completed upload id {upload_id}, {} parts", parts.len());

        Ok(())
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()> {
        let dir = self.session_dir(key, upload_id).await?;

        fs::remove_dir_all(&dir)
            .await
            .with_context(|| format!("unable to remove: {}", dir.display()))?;

        log::debug!("aborted upload id {upload_id}");

        Ok(())
    }
}
