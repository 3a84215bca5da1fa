use clap::{Parser, Subcommand, ValueEnum};

/// s3cli - command-line client for S3-compatible object stores
#[derive(Parser, Debug)]
#[command(name = "s3")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Bucket configuration file (default: first buckets.yaml found in
    /// ~/.s3, /etc/s3, <executable dir>/etc or the working directory)
    #[arg(short = 'C', long, global = true, env = "S3CLI_CONFIG")]
    pub config: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short = 'L', long, global = true, default_value = "error")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// How a local file name becomes an object key
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KeyMode {
    /// File name only
    #[value(name = "B")]
    Basename,
    /// Absolute path
    #[value(name = "A")]
    Absolute,
    /// Path relative to the uploaded directory
    #[value(name = "R")]
    Relative,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List objects
    #[command(visible_alias = "list")]
    Ls {
        /// Bucket name from the configuration
        bucket: String,

        /// Key prefix
        #[arg(default_value = "")]
        prefix: String,

        /// Fetch objects in batches of this size
        #[arg(short = 'n', long, default_value = "1000")]
        fetch_size: u32,

        /// Use a long listing format
        #[arg(short = 'l', long)]
        long_list: bool,

        /// Print object sizes by the powers of 1024 instead of in bytes
        #[arg(short = 'H', long)]
        human_readable: bool,

        /// Print object sizes by the powers of 1000 instead of in bytes
        #[arg(long)]
        si: bool,
    },

    /// Show disk usage of objects
    #[command(visible_aliases = ["usage", "disk-usage"])]
    Du {
        /// Bucket name from the configuration
        bucket: String,

        /// Key prefix
        #[arg(default_value = "")]
        prefix: String,

        /// Fetch objects in batches of this size
        #[arg(short = 'n', long, default_value = "1000")]
        fetch_size: u32,

        /// Print the total by the powers of 1024 instead of in bytes
        #[arg(short = 'H', long)]
        human_readable: bool,

        /// Print the total by the powers of 1000 instead of in bytes
        #[arg(long)]
        si: bool,
    },

    /// Download objects
    #[command(visible_aliases = ["download", "get"])]
    Down {
        /// Bucket name from the configuration
        bucket: String,

        /// Object key, or key prefix with --recursive
        key: String,

        /// Local target (default: current directory)
        local_path: Option<String>,

        /// Download every object under the key prefix
        #[arg(short, long)]
        recursive: bool,

        /// Overwrite existing destination files
        #[arg(short, long)]
        force: bool,

        /// Delimiter used to convert object keys to filesystem paths
        #[arg(short, long, default_value = "/")]
        delimiter: String,

        /// Fetch objects in batches of this size
        #[arg(short = 'n', long, default_value = "1000")]
        fetch_size: u32,
    },

    /// Upload files
    #[command(visible_aliases = ["upload", "put"])]
    Up {
        /// Bucket name from the configuration
        bucket: String,

        /// Local file, or directory with --recursive
        local_path: String,

        /// Object key, or key prefix with --recursive
        key: Option<String>,

        /// Upload directories and their contents recursively
        #[arg(short, long)]
        recursive: bool,

        /// Delimiter used to convert filesystem paths to object keys
        #[arg(short, long, default_value = "/")]
        delimiter: String,

        /// Key translation when no key is given: B (basename), A (absolute) or R (relative)
        #[arg(short = 'k', long = "use-keymode", value_enum, ignore_case = true, default_value = "B")]
        key_mode: KeyMode,
    },

    /// Remove objects
    #[command(visible_aliases = ["remove", "delete"])]
    Rm {
        /// Bucket name from the configuration
        bucket: String,

        /// Object key, or key prefix with --recursive
        key: String,

        /// Remove every object under the key prefix
        #[arg(short, long)]
        recursive: bool,

        /// Fetch objects in batches of this size
        #[arg(short = 'n', long, default_value = "1000")]
        fetch_size: u32,
    },

    /// Print version information
    #[command(visible_alias = "info")]
    Version,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Validate arguments
    pub fn validate(&self) -> anyhow::Result<()> {
        match &self.command {
            Commands::Ls { fetch_size, .. }
            | Commands::Du { fetch_size, .. }
            | Commands::Down { fetch_size, .. }
            | Commands::Rm { fetch_size, .. } => {
                if *fetch_size == 0 {
                    anyhow::bail!("Fetch size must be greater than 0");
                }
            }
            _ => {}
        }

        match &self.command {
            Commands::Down { delimiter, .. } | Commands::Up { delimiter, .. } => {
                if delimiter.is_empty() {
                    anyhow::bail!("Delimiter cannot be empty");
                }
            }
            _ => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ls_defaults() {
        let cli = Cli::try_parse_from(["s3", "ls", "backups"]).unwrap();
        assert_eq!(cli.log_level, "error");
        match cli.command {
            Commands::Ls {
                bucket,
                prefix,
                fetch_size,
                long_list,
                human_readable,
                si,
            } => {
                assert_eq!(bucket, "backups");
                assert_eq!(prefix, "");
                assert_eq!(fetch_size, 1000);
                assert!(!long_list);
                assert!(!human_readable);
                assert!(!si);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_aliases_and_global_flags() {
        let cli = Cli::try_parse_from([
            "s3", "get", "-C", "/tmp/buckets.yaml", "-L", "debug", "-rf", "backups", "logs/",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some("/tmp/buckets.yaml"));
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(
            cli.command,
            Commands::Down {
                recursive: true,
                force: true,
                local_path: None,
                ..
            }
        ));

        let cli = Cli::try_parse_from(["s3", "delete", "backups", "old/"]).unwrap();
        assert!(matches!(cli.command, Commands::Rm { .. }));
    }

    #[test]
    fn test_parse_key_mode_ignores_case() {
        let cli = Cli::try_parse_from(["s3", "put", "-k", "r", "backups", "dir"]).unwrap();
        match cli.command {
            Commands::Up { key_mode, key, .. } => {
                assert_eq!(key_mode, KeyMode::Relative);
                assert_eq!(key, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert!(Cli::try_parse_from(["s3", "up", "-k", "X", "backups", "dir"]).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_fetch_size() {
        let cli = Cli::try_parse_from(["s3", "du", "-n", "0", "backups"]).unwrap();
        assert!(cli.validate().is_err());
    }
}
