//! S3 client implementation with the core operations
//!
//! - `list`: ListObjectsV2 pagination driven by a `start-after` cursor
//! - `download`: GET one object into a local file
//! - `upload`: PUT one local file as one object
//! - `delete`: POST one DeleteObjects batch
//!
//! Every call is a strictly sequential series of single-shot exchanges on
//! the [`Transport`]; nothing is retried.

use bytes::Bytes;
use hyper::Method;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::s3::error::{Result, S3Error};
use crate::s3::transport::{object_path, S3Request, Transport};
use crate::s3::types::{Bucket, DeleteResult, DeletedKey, FailedKey, Item, ListingPage};
use crate::s3::visitor::{DeletionVisitor, ListingVisitor};

/// Client for one bucket.
///
/// Clone is cheap - the transport shares its hyper client.
#[derive(Clone)]
pub struct S3Client {
    transport: Transport,
    bucket: Bucket,
}

impl S3Client {
    /// Create a client with a fresh transport
    pub fn new(bucket: Bucket) -> Result<Self> {
        Ok(Self::with_transport(bucket, Transport::new()?))
    }

    pub fn with_transport(bucket: Bucket, transport: Transport) -> Self {
        Self { transport, bucket }
    }

    /// List objects under `prefix`, feeding every page to `visitor`.
    ///
    /// A page whose key count equals `page_size` triggers another request
    /// with `start-after` set to the page's last key, even if that next page
    /// turns out to be empty. Any other key count ends the listing, as does
    /// the visitor returning `false`. Returns the number of pages visited.
    ///
    /// A non-200 response aborts the listing; pages already visited stay
    /// visited.
    pub async fn list<V: ListingVisitor>(
        &self,
        prefix: &str,
        page_size: u32,
        visitor: &mut V,
    ) -> Result<usize> {
        if page_size == 0 {
            return Err(S3Error::InvalidArgument(
                "page size must be at least 1".to_string(),
            ));
        }
        info!(bucket = %self.bucket.name, prefix = %prefix, page_size, "listing items");

        let mut start_after: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let mut request = S3Request::new(Method::GET, "")
                .query("list-type", "2")
                .query("max-keys", page_size.to_string());
            if !prefix.is_empty() {
                request = request.query("prefix", prefix);
            }
            if let Some(cursor) = &start_after {
                request = request.query("start-after", cursor.as_str());
            }

            let body = self
                .transport
                .execute(&self.bucket, request)
                .await?
                .into_ok_body()?;
            let page = Self::parse_list_response(&body)?;
            pages += 1;
            debug!(page = pages, key_count = page.key_count, "listing page");

            if !visitor.visit_listing(&page).await {
                return Ok(pages);
            }
            if page.key_count != page_size {
                return Ok(pages);
            }
            match page.last_key() {
                Some(key) => start_after = Some(key.to_string()),
                None => {
                    warn!(
                        key_count = page.key_count,
                        "full page without items, stopping listing"
                    );
                    return Ok(pages);
                }
            }
        }
    }

    /// Download one object to `destination`, replacing its contents.
    ///
    /// Preconditions are checked before any request is sent: an existing
    /// directory is always refused, an existing file only without
    /// `overwrite`. Missing parent directories are created. Returns the
    /// number of bytes written.
    pub async fn download(&self, key: &str, destination: &Path, overwrite: bool) -> Result<u64> {
        Self::check_key(key)?;
        info!(key = %key, destination = %destination.display(), "downloading object");

        match tokio::fs::metadata(destination).await {
            Ok(metadata) => {
                if metadata.is_dir() {
                    return Err(S3Error::DestinationIsDirectory(destination.to_path_buf()));
                }
                if !overwrite {
                    return Err(S3Error::DestinationExists(destination.to_path_buf()));
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = destination.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
            Err(e) => return Err(S3Error::Io(e)),
        }

        let body = self
            .transport
            .execute(&self.bucket, S3Request::new(Method::GET, object_path(key)))
            .await?
            .into_ok_body()?;

        tokio::fs::write(destination, &body).await?;
        Ok(body.len() as u64)
    }

    /// Upload one local file as the object `key`.
    ///
    /// Directories are refused before any request is sent. The file is
    /// read completely into memory and sent with `Content-MD5`.
    pub async fn upload(&self, key: &str, source: &Path) -> Result<()> {
        Self::check_key(key)?;
        info!(file = %source.display(), key = %key, "uploading object");

        let metadata = tokio::fs::metadata(source).await?;
        if metadata.is_dir() {
            return Err(S3Error::SourceIsDirectory(source.to_path_buf()));
        }
        let content = tokio::fs::read(source)
            .await
            .map_err(S3Error::PayloadUnreadable)?;

        let request = S3Request::new(Method::PUT, object_path(key))
            .body(content)
            .with_content_md5();
        self.transport
            .execute(&self.bucket, request)
            .await?
            .into_ok_body()?;
        Ok(())
    }

    /// Delete `keys` with one DeleteObjects call and hand the decoded result
    /// to `visitor`.
    ///
    /// Keys reported in the result's `failed` set do not make this call
    /// fail. The batch is never split, whatever its size.
    pub async fn delete<K, V>(&self, keys: &[K], visitor: &mut V) -> Result<()>
    where
        K: AsRef<str>,
        V: DeletionVisitor,
    {
        if keys.is_empty() {
            return Err(S3Error::InvalidArgument("no keys to delete".to_string()));
        }
        info!(bucket = %self.bucket.name, count = keys.len(), "deleting keys");

        let payload = Self::build_delete_body(keys);
        let request = S3Request::new(Method::POST, "/")
            .query("delete", "")
            .header("content-type", "application/xml")
            .body(Bytes::from(payload))
            .with_content_md5();

        let body = self
            .transport
            .execute(&self.bucket, request)
            .await?
            .into_ok_body()?;
        let mut result = Self::parse_delete_response(&body)?;
        result.make_disjoint();

        if !visitor.visit_deletion(&result) {
            debug!("deletion visitor declined the result");
        }
        Ok(())
    }

    fn check_key(key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(S3Error::InvalidArgument("object key must not be empty".to_string()));
        }
        Ok(())
    }

    /// Build the `<Delete>` request body
    fn build_delete_body<K: AsRef<str>>(keys: &[K]) -> String {
        let mut xml = String::with_capacity(keys.len() * 60 + 32);
        xml.push_str("<Delete>");
        for key in keys {
            xml.push_str("<Object><Key>");
            Self::xml_escape_into(&mut xml, key.as_ref());
            xml.push_str("</Key></Object>");
        }
        xml.push_str("</Delete>");
        xml
    }

    /// Parse ListObjectsV2 XML response
    ///
    /// A missing `KeyCount` element is taken as the number of decoded items.
    pub(crate) fn parse_list_response(xml_data: &[u8]) -> Result<ListingPage> {
        let mut reader = Reader::from_reader(xml_data);
        reader.config_mut().trim_text_start = true;
        reader.config_mut().trim_text_end = true;

        let mut page = ListingPage::default();
        let mut current_item: Option<Item> = None;
        let mut current_text = String::with_capacity(256);
        let mut in_owner = false;
        let mut in_common_prefixes = false;
        let mut saw_key_count = false;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => match e.local_name().as_ref() {
                    b"Contents" => current_item = Some(Item::default()),
                    b"Owner" => in_owner = true,
                    b"CommonPrefixes" => in_common_prefixes = true,
                    _ => {}
                },
                Ok(Event::Empty(e)) => {
                    if e.local_name().as_ref() == b"Contents" {
                        page.items.push(Item::default());
                    }
                }
                Ok(Event::Text(e)) => {
                    current_text.clear();
                    current_text.push_str(&e.unescape()?);
                }
                Ok(Event::End(e)) => {
                    let name = e.local_name();
                    if let Some(item) = current_item.as_mut() {
                        match name.as_ref() {
                            b"Key" => item.key = std::mem::take(&mut current_text),
                            b"LastModified" => {
                                item.last_modified = std::mem::take(&mut current_text)
                            }
                            b"ETag" => item.etag = std::mem::take(&mut current_text),
                            b"Size" => item.size = Self::parse_number(b"Size", &current_text)?,
                            b"StorageClass" => {
                                item.storage_class = std::mem::take(&mut current_text)
                            }
                            b"ID" if in_owner => item.owner.id = std::mem::take(&mut current_text),
                            b"DisplayName" if in_owner => {
                                item.owner.display_name = std::mem::take(&mut current_text)
                            }
                            b"Owner" => in_owner = false,
                            b"Contents" => {
                                if let Some(item) = current_item.take() {
                                    page.items.push(item);
                                }
                            }
                            _ => {}
                        }
                    } else if in_common_prefixes {
                        if name.as_ref() == b"CommonPrefixes" {
                            in_common_prefixes = false;
                        }
                    } else {
                        match name.as_ref() {
                            b"Name" => page.name = std::mem::take(&mut current_text),
                            b"Prefix" => page.prefix = std::mem::take(&mut current_text),
                            b"Delimiter" => page.delimiter = std::mem::take(&mut current_text),
                            b"MaxKeys" => {
                                page.max_keys = Self::parse_number(b"MaxKeys", &current_text)?
                            }
                            b"KeyCount" => {
                                page.key_count = Self::parse_number(b"KeyCount", &current_text)?;
                                saw_key_count = true;
                            }
                            b"ContinuationToken" => {
                                page.continuation_token = std::mem::take(&mut current_text)
                            }
                            b"NextContinuationToken" => {
                                page.next_continuation_token = std::mem::take(&mut current_text)
                            }
                            b"StartAfter" => page.start_after = std::mem::take(&mut current_text),
                            b"IsTruncated" => page.is_truncated = current_text == "true",
                            _ => {}
                        }
                    }

                    current_text.clear();
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(S3Error::from(e)),
                _ => {}
            }
        }

        if !saw_key_count {
            page.key_count = page.items.len() as u32;
        }
        Ok(page)
    }

    /// Parse DeleteObjects XML response
    pub(crate) fn parse_delete_response(xml_data: &[u8]) -> Result<DeleteResult> {
        let mut reader = Reader::from_reader(xml_data);
        reader.config_mut().trim_text_start = true;
        reader.config_mut().trim_text_end = true;

        let mut result = DeleteResult::new();
        let mut current_deleted: Option<DeletedKey> = None;
        let mut current_failed: Option<FailedKey> = None;
        let mut current_text = String::with_capacity(256);

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => match e.local_name().as_ref() {
                    b"Deleted" => current_deleted = Some(DeletedKey { key: String::new() }),
                    b"Error" => {
                        current_failed = Some(FailedKey {
                            key: String::new(),
                            code: String::new(),
                            message: String::new(),
                        })
                    }
                    _ => {}
                },
                Ok(Event::Text(e)) => {
                    current_text.clear();
                    current_text.push_str(&e.unescape()?);
                }
                Ok(Event::End(e)) => {
                    match e.local_name().as_ref() {
                        b"Key" => {
                            if let Some(deleted) = current_deleted.as_mut() {
                                deleted.key = std::mem::take(&mut current_text);
                            } else if let Some(failed) = current_failed.as_mut() {
                                failed.key = std::mem::take(&mut current_text);
                            }
                        }
                        b"Code" => {
                            if let Some(failed) = current_failed.as_mut() {
                                failed.code = std::mem::take(&mut current_text);
                            }
                        }
                        b"Message" => {
                            if let Some(failed) = current_failed.as_mut() {
                                failed.message = std::mem::take(&mut current_text);
                            }
                        }
                        b"Deleted" => {
                            if let Some(deleted) = current_deleted.take() {
                                result.deleted.push(deleted);
                            }
                        }
                        b"Error" => {
                            if let Some(failed) = current_failed.take() {
                                result.failed.push(failed);
                            }
                        }
                        _ => {}
                    }

                    current_text.clear();
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(S3Error::from(e)),
                _ => {}
            }
        }

        Ok(result)
    }

    fn parse_number<T: std::str::FromStr>(element: &[u8], text: &str) -> Result<T> {
        text.parse().map_err(|_| {
            S3Error::XmlParse(format!(
                "invalid <{}> value: {:?}",
                String::from_utf8_lossy(element),
                text
            ))
        })
    }

    /// Escape XML special characters into an existing buffer (no intermediate allocation)
    fn xml_escape_into(buf: &mut String, s: &str) {
        for ch in s.chars() {
            match ch {
                '&' => buf.push_str("&amp;"),
                '<' => buf.push_str("&lt;"),
                '>' => buf.push_str("&gt;"),
                '"' => buf.push_str("&quot;"),
                '\'' => buf.push_str("&apos;"),
                _ => buf.push(ch),
            }
        }
    }
}
