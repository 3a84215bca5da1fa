//! S3 types and response structures

use serde::{Deserialize, Serialize};

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Connection and credential descriptor for one bucket.
///
/// The endpoint is the base URL every request path is appended to, so it
/// already addresses the bucket (virtual-host or path style).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    /// Name used to select the bucket on the command line
    pub name: String,
    /// Base URL, e.g. `https://s3.example.com/backups`
    pub endpoint: String,
    /// AWS region used in the signing scope
    #[serde(default = "default_region")]
    pub region: String,
    /// Access key ID
    #[serde(alias = "accessKeyId", alias = "accesskeyid")]
    pub access_key_id: String,
    /// Secret access key
    #[serde(alias = "secretKey", alias = "secretkey")]
    pub secret_key: String,
}

impl Bucket {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        region: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            region: region.into(),
            access_key_id: access_key_id.into(),
            secret_key: secret_key.into(),
        }
    }
}

/// Object owner as reported by a listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: String,
    pub display_name: String,
}

/// One object entry of a listing page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Object key
    pub key: String,
    /// Last modified timestamp, as sent by the server
    pub last_modified: String,
    /// ETag (quotes preserved)
    pub etag: String,
    /// Object size in bytes
    pub size: u64,
    pub owner: Owner,
    /// Storage class (STANDARD, STANDARD_IA, GLACIER, etc.)
    pub storage_class: String,
}

impl Item {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
            ..Default::default()
        }
    }
}

/// One decoded ListObjectsV2 response.
///
/// Pages are rebuilt for every request; the pagination engine never
/// accumulates them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingPage {
    pub name: String,
    pub prefix: String,
    pub delimiter: String,
    pub max_keys: u32,
    /// Declared number of keys in this page
    pub key_count: u32,
    pub continuation_token: String,
    pub next_continuation_token: String,
    pub start_after: String,
    /// Decoded but never consulted for pagination
    pub is_truncated: bool,
    pub items: Vec<Item>,
}

impl ListingPage {
    /// Key of the last item, used as the `start-after` cursor of the next page
    pub fn last_key(&self) -> Option<&str> {
        self.items.last().map(|item| item.key.as_str())
    }
}

/// Key removed by a batch delete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedKey {
    pub key: String,
}

/// Key a batch delete could not remove
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedKey {
    pub key: String,
    /// S3 error code, e.g. `AccessDenied`
    pub code: String,
    pub message: String,
}

/// Result of one DeleteObjects call.
///
/// A 200 response may still carry failed keys; the two sets are disjoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResult {
    pub deleted: Vec<DeletedKey>,
    pub failed: Vec<FailedKey>,
}

impl DeleteResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when at least one key was not deleted
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn deleted_keys(&self) -> impl Iterator<Item = &str> {
        self.deleted.iter().map(|d| d.key.as_str())
    }

    pub fn failed_keys(&self) -> impl Iterator<Item = &str> {
        self.failed.iter().map(|f| f.key.as_str())
    }

    /// Drop any deleted entry whose key is also reported as failed
    pub(crate) fn make_disjoint(&mut self) {
        if self.failed.is_empty() {
            return;
        }
        let failed = &self.failed;
        self.deleted
            .retain(|d| !failed.iter().any(|f| f.key == d.key));
    }
}
