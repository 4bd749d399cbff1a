use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    /// A buffer or an upload slot could not be obtained.
    #[error("unable to get a buffer of {size} bytes: {reason}")]
    ResourceExhausted { size: usize, reason: String },

    #[error("multipart upload with id: {upload_id} to {key} failed")]
    MultipartUploadFailed {
        key: String,
        upload_id: String,
        source: anyhow::Error,
    },

    #[error("block stream has been closed")]
    Closed,

    #[error("storage error: {source}")]
    Store { source: anyhow::Error },

    #[error("invalid range: offset {offset} + length {length} exceeds {size} bytes")]
    InvalidRange {
        offset: usize,
        length: usize,
        size: usize,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StreamError {
    pub(crate) fn store(source: anyhow::Error) -> Self {
        Self::Store { source }
    }
}

pub type Result<T, E = StreamError> = std::result::Result<T, E>;
