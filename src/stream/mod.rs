pub mod block;
pub mod dispatcher;
pub mod error;
pub mod output;
pub mod pool;

pub use self::{
    dispatcher::UploadPool,
    error::StreamError,
    output::{BlockOutputStream, DEFAULT_BLOCK_SIZE, StreamOptions},
    pool::{BufferPool, PooledBuffer},
};
