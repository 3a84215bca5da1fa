use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use walkdir::WalkDir;

use super::args::KeyMode;
use super::format::SizeFormat;
use super::keys::{absolute_path, convert_key, create_key};
use crate::s3::{DeleteResult, DeletionVisitor, Item, ListingPage, ListingVisitor, S3Client};

// ============================================================================
// Visitors
// ============================================================================

/// Format one listing row: the key, or in long form
/// `storage-class\tdisplay-name(id)\tsize\tkey`
pub fn format_row(item: &Item, long_list: bool, sizes: SizeFormat) -> String {
    if !long_list {
        return item.key.clone();
    }
    let size = sizes
        .human(item.size)
        .unwrap_or_else(|| item.size.to_string());
    format!(
        "{}\t{}({})\t{}\t{}",
        item.storage_class, item.owner.display_name, item.owner.id, size, item.key
    )
}

/// Prints every listed object
pub struct PrintingVisitor<W: Write> {
    out: W,
    long_list: bool,
    sizes: SizeFormat,
    error: Option<std::io::Error>,
}

impl<W: Write> PrintingVisitor<W> {
    pub fn new(out: W, long_list: bool, sizes: SizeFormat) -> Self {
        Self {
            out,
            long_list,
            sizes,
            error: None,
        }
    }

    /// Flush the output, surfacing the first write error
    pub fn finish(mut self) -> std::io::Result<W> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        self.out.flush()?;
        Ok(self.out)
    }
}

impl<W: Write> ListingVisitor for PrintingVisitor<W> {
    async fn visit_listing(&mut self, page: &ListingPage) -> bool {
        for item in &page.items {
            let row = format_row(item, self.long_list, self.sizes);
            if let Err(e) = writeln!(self.out, "{}", row) {
                // Broken pipe and friends: stop listing
                self.error = Some(e);
                return false;
            }
        }
        true
    }
}

/// Counts listed objects and sums their sizes
#[derive(Debug, Default)]
pub struct UsageVisitor {
    pub count: u64,
    pub size: u64,
}

impl ListingVisitor for UsageVisitor {
    async fn visit_listing(&mut self, page: &ListingPage) -> bool {
        for item in &page.items {
            self.count += 1;
            self.size = self.size.saturating_add(item.size);
        }
        true
    }
}

/// Downloads every listed object below a local directory.
///
/// Failures are logged and counted; the listing goes on.
pub struct DownloadingVisitor<'a> {
    client: &'a S3Client,
    target: PathBuf,
    delimiter: &'a str,
    force: bool,
    pub downloaded: usize,
    pub failed: usize,
}

impl<'a> DownloadingVisitor<'a> {
    pub fn new(client: &'a S3Client, target: PathBuf, delimiter: &'a str, force: bool) -> Self {
        Self {
            client,
            target,
            delimiter,
            force,
            downloaded: 0,
            failed: 0,
        }
    }
}

impl ListingVisitor for DownloadingVisitor<'_> {
    async fn visit_listing(&mut self, page: &ListingPage) -> bool {
        for item in &page.items {
            let Some(destination) = convert_key(&self.target, &item.key, self.delimiter) else {
                self.failed += 1;
                error!(key = %item.key, target = %self.target.display(), "key leaves the download target, skipped");
                continue;
            };
            match self.client.download(&item.key, &destination, self.force).await {
                Ok(bytes) => {
                    self.downloaded += 1;
                    info!(key = %item.key, bytes, "downloaded");
                }
                Err(e) => {
                    self.failed += 1;
                    error!(key = %item.key, destination = %destination.display(), "download failed: {}", e);
                }
            }
        }
        true
    }
}

/// Collects listed keys, then reports the outcome of deleting them
pub struct DeletingVisitor<W: Write> {
    out: W,
    pub keys: Vec<String>,
    pub failed: bool,
    error: Option<std::io::Error>,
}

impl<W: Write> DeletingVisitor<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            keys: Vec::new(),
            failed: false,
            error: None,
        }
    }

    /// Flush the report, surfacing the first write error
    pub fn finish(mut self) -> std::io::Result<W> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        self.out.flush()?;
        Ok(self.out)
    }

    fn report(&mut self, line: std::fmt::Arguments<'_>) {
        if self.error.is_none() {
            if let Err(e) = writeln!(self.out, "{}", line) {
                self.error = Some(e);
            }
        }
    }
}

impl<W: Write> ListingVisitor for DeletingVisitor<W> {
    async fn visit_listing(&mut self, page: &ListingPage) -> bool {
        self.keys
            .extend(page.items.iter().map(|item| item.key.clone()));
        true
    }
}

impl<W: Write> DeletionVisitor for DeletingVisitor<W> {
    fn visit_deletion(&mut self, result: &DeleteResult) -> bool {
        if result.has_failures() {
            self.failed = true;
        }
        for deleted in &result.deleted {
            self.report(format_args!("'{}' deleted", deleted.key));
        }
        for failed in &result.failed {
            self.report(format_args!(
                "'{}' not deleted: {} -> {}",
                failed.key, failed.code, failed.message
            ));
        }
        self.error.is_none()
    }
}

// ============================================================================
// Commands
// ============================================================================

/// List objects command
pub async fn cmd_ls(
    client: &S3Client,
    prefix: &str,
    fetch_size: u32,
    long_list: bool,
    sizes: SizeFormat,
) -> Result<()> {
    // Buffer stdout to avoid per-line flush syscalls
    let stdout = std::io::stdout();
    let out = std::io::BufWriter::with_capacity(64 * 1024, stdout.lock());
    let mut visitor = PrintingVisitor::new(out, long_list, sizes);

    client
        .list(prefix, fetch_size, &mut visitor)
        .await
        .with_context(|| format!("listing '{}' failed", prefix))?;
    visitor.finish().context("writing listing failed")?;
    Ok(())
}

/// Disk usage command
pub async fn cmd_du(
    client: &S3Client,
    prefix: &str,
    fetch_size: u32,
    sizes: SizeFormat,
) -> Result<()> {
    let mut visitor = UsageVisitor::default();
    client
        .list(prefix, fetch_size, &mut visitor)
        .await
        .with_context(|| format!("listing '{}' failed", prefix))?;

    println!("{}", usage_line(&visitor, sizes));
    Ok(())
}

fn usage_line(usage: &UsageVisitor, sizes: SizeFormat) -> String {
    let size = sizes
        .human(usage.size)
        .unwrap_or_else(|| format!("{} B", usage.size));
    format!("{} object(s) using {}", usage.count, size)
}

/// Download command
///
/// Without `recursive`, `key` names one object: a missing `local_path` is
/// taken as the file to write, an existing directory receives the object
/// under its translated key, and an existing file is replaced only with
/// `force`. With `recursive`, `key` is a prefix and `local_path` must be
/// missing or a directory.
pub async fn cmd_down(
    client: &S3Client,
    key: &str,
    local_path: Option<&str>,
    recursive: bool,
    force: bool,
    delimiter: &str,
    fetch_size: u32,
) -> Result<()> {
    let target = match local_path {
        Some(path) => PathBuf::from(path),
        None => std::env::current_dir().context("Failed to determine working directory")?,
    };

    let is_dir = match std::fs::metadata(&target) {
        Ok(metadata) => Some(metadata.is_dir()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            return Err(e).with_context(|| format!("error reading stats of {}", target.display()))
        }
    };

    if recursive {
        if is_dir == Some(false) {
            anyhow::bail!(
                "recursive download target {} needs to be a directory",
                target.display()
            );
        }

        let mut visitor = DownloadingVisitor::new(client, target, delimiter, force);
        client
            .list(key, fetch_size, &mut visitor)
            .await
            .with_context(|| format!("listing '{}' failed", key))?;

        info!(downloaded = visitor.downloaded, failed = visitor.failed, "download finished");
        if visitor.failed > 0 {
            anyhow::bail!(
                "{} of {} object(s) could not be downloaded",
                visitor.failed,
                visitor.failed + visitor.downloaded
            );
        }
        return Ok(());
    }

    let destination = if is_dir == Some(true) {
        convert_key(&target, key, delimiter).with_context(|| {
            format!("key '{}' cannot be stored below {}", key, target.display())
        })?
    } else {
        target
    };
    if is_dir == Some(false) && !force {
        anyhow::bail!("file {} already exists (use force flag)", destination.display());
    }

    let bytes = client
        .download(key, &destination, force)
        .await
        .with_context(|| format!("downloading '{}' failed", key))?;
    info!(key = %key, bytes, destination = %destination.display(), "downloaded");
    Ok(())
}

/// Upload command
pub async fn cmd_up(
    client: &S3Client,
    local_path: &str,
    key: Option<&str>,
    recursive: bool,
    delimiter: &str,
    key_mode: KeyMode,
) -> Result<()> {
    let source = Path::new(local_path);
    let metadata = std::fs::metadata(source)
        .with_context(|| format!("Failed to read {}", source.display()))?;
    let base_path = absolute_path(source)?;

    if !metadata.is_dir() {
        let parent = base_path.parent().unwrap_or(Path::new(""));
        let object_key = create_key(key, &base_path, parent, key_mode, delimiter, recursive)?;
        client
            .upload(&object_key, source)
            .await
            .with_context(|| format!("uploading {} failed", source.display()))?;
        info!(file = %source.display(), key = %object_key, "uploaded");
        return Ok(());
    }

    if !recursive {
        anyhow::bail!("file {} is a directory (use recursive flag)", source.display());
    }

    let mut uploaded = 0usize;
    let mut failed = 0usize;
    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                failed += 1;
                error!("walking {} failed: {}", source.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let file = entry.path();
        let result = match create_key(key, file, &base_path, key_mode, delimiter, recursive) {
            Ok(object_key) => client.upload(&object_key, file).await.map(|_| object_key),
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(object_key) => {
                uploaded += 1;
                info!(file = %file.display(), key = %object_key, "uploaded");
            }
            Err(e) => {
                failed += 1;
                error!(file = %file.display(), "upload failed: {}", e);
            }
        }
    }

    info!(uploaded, failed, "upload finished");
    if failed > 0 {
        anyhow::bail!("{} of {} file(s) could not be uploaded", failed, failed + uploaded);
    }
    Ok(())
}

/// Remove command
pub async fn cmd_rm(client: &S3Client, key: &str, recursive: bool, fetch_size: u32) -> Result<()> {
    let stdout = std::io::stdout();
    let mut visitor = DeletingVisitor::new(stdout.lock());

    client
        .list(key, fetch_size, &mut visitor)
        .await
        .with_context(|| format!("listing '{}' failed", key))?;

    if visitor.keys.is_empty() {
        anyhow::bail!("no objects found for key '{}'", key);
    }
    if visitor.keys.len() > 1 && !recursive {
        anyhow::bail!(
            "{} objects found for key '{}', retry using the recursive flag",
            visitor.keys.len(),
            key
        );
    }

    let keys = std::mem::take(&mut visitor.keys);
    client
        .delete(&keys, &mut visitor)
        .await
        .with_context(|| format!("deleting {} object(s) failed", keys.len()))?;

    let failed = visitor.failed;
    visitor.finish().context("writing delete report failed")?;
    if failed {
        anyhow::bail!("at least one object was not deleted");
    }
    Ok(())
}

/// Version command
pub fn cmd_version() -> Result<()> {
    println!("version {}", env!("CARGO_PKG_VERSION"));
    Ok(())
}
