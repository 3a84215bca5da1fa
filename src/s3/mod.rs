//! S3 client core with AWS SigV4 signing
//!
//! This module provides:
//! - AWS Signature Version 4 signing for S3 requests
//! - A single-shot HTTP transport
//! - ListObjectsV2 pagination and the object operations (get, put, batch delete)

pub mod client;
pub mod error;
pub mod signer;
pub mod transport;
pub mod types;
pub mod visitor;

// Re-export main types for convenience
pub use client::S3Client;
pub use error::{Result, S3Error};
pub use signer::S3SignerV4;
pub use transport::{S3Request, S3Response, Transport};
pub use types::{Bucket, DeleteResult, DeletedKey, FailedKey, Item, ListingPage, Owner};
pub use visitor::{DeletionVisitor, ListingVisitor};
