//! Error type shared by the signer, the transport and the object operations

use hyper::StatusCode;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// S3 client errors
#[derive(Error, Debug)]
pub enum S3Error {
    #[error("invalid request URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("payload unreadable: {0}")]
    PayloadUnreadable(#[source] std::io::Error),

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("http response was: {} / {message}", status.as_u16())]
    S3Response { status: StatusCode, message: String },

    #[error("XML parse error: {0}")]
    XmlParse(String),

    #[error("destination {} already exists", .0.display())]
    DestinationExists(PathBuf),

    #[error("destination {} is a directory", .0.display())]
    DestinationIsDirectory(PathBuf),

    #[error("file {} is a directory", .0.display())]
    SourceIsDirectory(PathBuf),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<quick_xml::Error> for S3Error {
    fn from(err: quick_xml::Error) -> Self {
        S3Error::XmlParse(err.to_string())
    }
}

impl From<hyper_util::client::legacy::Error> for S3Error {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        S3Error::Transport(format!("request failed: {}", err))
    }
}

impl S3Error {
    /// Build a protocol error from a non-200 response, keeping the raw body
    pub fn from_response(status: StatusCode, body: &[u8]) -> Self {
        S3Error::S3Response {
            status,
            message: String::from_utf8_lossy(body).to_string(),
        }
    }

    /// HTTP status of a protocol error
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            S3Error::S3Response { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, S3Error>;
