pub mod cli;
pub mod s3;
pub mod stream;
