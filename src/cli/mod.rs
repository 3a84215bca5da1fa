//! CLI module for s3cli
//!
//! Every command resolves one bucket from the configuration and drives the
//! S3 core with a visitor:
//!
//! ```bash
//! # List objects, long format with IEC sizes
//! s3 ls -lH backups logs/
//!
//! # Disk usage below a prefix
//! s3 du -H backups logs/
//!
//! # Download everything below a prefix into ./restore
//! s3 down -r backups logs/ ./restore
//!
//! # Upload a directory, keys relative to it
//! s3 up -r -k R backups ./logs logs
//!
//! # Delete everything below a prefix
//! s3 rm -r backups logs/
//! ```

pub mod args;
pub mod commands;
pub mod format;
pub mod keys;

use anyhow::{Context, Result};
use tracing::debug;

use crate::config;
use crate::s3::S3Client;
use args::{Cli, Commands};
use commands::*;
use format::SizeFormat;

/// Run one parsed command line
pub async fn run(cli: Cli) -> Result<()> {
    cli.validate().context("Invalid arguments")?;
    debug!("CLI arguments: {:?}", cli);

    if let Commands::Version = cli.command {
        return cmd_version();
    }

    let config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Ls {
            bucket,
            prefix,
            fetch_size,
            long_list,
            human_readable,
            si,
        } => {
            let client = client_for(&config, &bucket)?;
            let sizes = SizeFormat::from_flags(human_readable, si);
            cmd_ls(&client, &prefix, fetch_size, long_list, sizes).await
        }

        Commands::Du {
            bucket,
            prefix,
            fetch_size,
            human_readable,
            si,
        } => {
            let client = client_for(&config, &bucket)?;
            let sizes = SizeFormat::from_flags(human_readable, si);
            cmd_du(&client, &prefix, fetch_size, sizes).await
        }

        Commands::Down {
            bucket,
            key,
            local_path,
            recursive,
            force,
            delimiter,
            fetch_size,
        } => {
            let client = client_for(&config, &bucket)?;
            cmd_down(
                &client,
                &key,
                local_path.as_deref(),
                recursive,
                force,
                &delimiter,
                fetch_size,
            )
            .await
        }

        Commands::Up {
            bucket,
            local_path,
            key,
            recursive,
            delimiter,
            key_mode,
        } => {
            let client = client_for(&config, &bucket)?;
            cmd_up(&client, &local_path, key.as_deref(), recursive, &delimiter, key_mode).await
        }

        Commands::Rm {
            bucket,
            key,
            recursive,
            fetch_size,
        } => {
            let client = client_for(&config, &bucket)?;
            cmd_rm(&client, &key, recursive, fetch_size).await
        }

        Commands::Version => cmd_version(),
    }
}

fn client_for(config: &config::Config, name: &str) -> Result<S3Client> {
    let bucket = config.find_bucket(name)?;
    debug!(bucket = %bucket.name, endpoint = %bucket.endpoint, "using bucket");
    S3Client::new(bucket).context("Failed to create S3 client")
}
