//! s3cli - command-line client for S3-compatible object stores

pub mod cli;
pub mod config;
pub mod s3;

pub use config::Config;
pub use s3::{Bucket, S3Client};
