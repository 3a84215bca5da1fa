//! Single-shot HTTP transport
//!
//! One call = one signed HTTP/1.1 exchange:
//! - fixed 10 second timeout covering send and body drain
//! - response body always fully buffered, whatever the status
//! - no retries, no connection reuse (idle pool disabled)
//!
//! Deciding whether a status is a success is left to the caller.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, StatusCode, Uri};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use native_tls::TlsConnector;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use crate::s3::error::{Result, S3Error};
use crate::s3::signer::S3SignerV4;
use crate::s3::types::Bucket;

/// Timeout applied to every exchange
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Hex lookup table for URI encoding
static HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// One request against a bucket endpoint.
///
/// `path` is appended to the bucket endpoint verbatim and must already be
/// encoded (see [`object_path`]); an empty path addresses the endpoint
/// itself. Query parameters are encoded when the URL is built.
#[derive(Debug, Clone)]
pub struct S3Request {
    pub method: Method,
    pub path: String,
    pub query: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
    /// Attach `Content-MD5` (mutating calls)
    pub content_md5: bool,
}

impl S3Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: BTreeMap::new(),
            headers: BTreeMap::new(),
            body: Bytes::new(),
            content_md5: false,
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_content_md5(mut self) -> Self {
        self.content_md5 = true;
        self
    }

    /// Full request URL for the given endpoint
    pub fn url(&self, endpoint: &str) -> String {
        let endpoint = endpoint.trim_end_matches('/');
        let mut url = String::with_capacity(endpoint.len() + self.path.len() + 64);
        url.push_str(endpoint);
        if !self.path.is_empty() {
            url.push_str(&self.path);
        } else if !endpoint_has_path(endpoint) {
            url.push('/');
        }

        let mut first = true;
        for (key, value) in &self.query {
            url.push(if first { '?' } else { '&' });
            first = false;
            url_encode_into(&mut url, key);
            url.push('=');
            url_encode_into(&mut url, value);
        }
        url
    }
}

/// Raw outcome of one exchange
#[derive(Debug, Clone)]
pub struct S3Response {
    pub status: StatusCode,
    pub body: Bytes,
}

impl S3Response {
    /// Body of a 200 response, otherwise a protocol error carrying the body
    pub fn into_ok_body(self) -> Result<Bytes> {
        if self.status == StatusCode::OK {
            Ok(self.body)
        } else {
            Err(S3Error::from_response(self.status, &self.body))
        }
    }
}

/// True when the endpoint URL carries a path after its authority
fn endpoint_has_path(endpoint: &str) -> bool {
    let rest = match endpoint.find("://") {
        Some(pos) => &endpoint[pos + 3..],
        None => endpoint,
    };
    rest.contains('/')
}

/// Path for an object key: `/` + key, percent-encoded with `/` preserved
pub fn object_path(key: &str) -> String {
    let mut path = String::with_capacity(key.len() + 1);
    path.push('/');
    path.push_str(&encode_s3_key(key));
    path
}

/// Encode an S3 key, preserving forward slashes
fn encode_s3_key(key: &str) -> Cow<'_, str> {
    let needs_encoding = key.bytes().any(|b| {
        !matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/')
    });

    if !needs_encoding {
        return Cow::Borrowed(key);
    }

    let mut result = String::with_capacity(key.len() + 32);
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                result.push(byte as char);
            }
            _ => {
                result.push('%');
                result.push(HEX_UPPER[(byte >> 4) as usize] as char);
                result.push(HEX_UPPER[(byte & 0xf) as usize] as char);
            }
        }
    }
    Cow::Owned(result)
}

/// Encode a query component (RFC 3986, space as `%20`) into `buf`
fn url_encode_into(buf: &mut String, s: &str) {
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                buf.push(byte as char);
            }
            _ => {
                buf.push('%');
                buf.push(HEX_UPPER[(byte >> 4) as usize] as char);
                buf.push(HEX_UPPER[(byte & 0xf) as usize] as char);
            }
        }
    }
}

/// HTTP transport shared by all operations of one command.
///
/// Clone is cheap; the hyper client is reference counted.
#[derive(Clone)]
pub struct Transport {
    client: HyperClient<HttpsConnector<HttpConnector>, Full<Bytes>>,
    timeout: Duration,
}

impl Transport {
    pub fn new() -> Result<Self> {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_nodelay(true);
        http.set_connect_timeout(Some(DEFAULT_TIMEOUT));

        let tls = TlsConnector::new().map_err(|e| S3Error::Tls(e.to_string()))?;
        let https = HttpsConnector::from((http, tls.into()));

        // Idle pool of size 0: every request opens its own connection
        let client = HyperClient::builder(TokioExecutor::new())
            .pool_max_idle_per_host(0)
            .set_host(true)
            .build(https);

        Ok(Self {
            client,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sign and send one request, returning status and the full body
    pub async fn execute(&self, bucket: &Bucket, request: S3Request) -> Result<S3Response> {
        let url = request.url(&bucket.endpoint);
        let uri: Uri = url.parse().map_err(|e: hyper::http::uri::InvalidUri| {
            S3Error::InvalidUrl {
                url: url.clone(),
                reason: e.to_string(),
            }
        })?;
        if uri.scheme().is_none() {
            return Err(S3Error::InvalidUrl {
                url,
                reason: "missing scheme".to_string(),
            });
        }

        let signed = S3SignerV4::new(bucket).sign(
            &request.method,
            &uri,
            &request.headers,
            &request.body,
            request.content_md5,
        )?;

        debug!(method = %request.method, url = %url, "sending request");

        let mut builder = Request::builder().method(request.method.clone()).uri(uri);
        for (name, value) in signed.headers.iter() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let http_request = builder
            .body(Full::new(request.body))
            .map_err(|e| S3Error::InvalidArgument(format!("request build error: {}", e)))?;

        let exchange = async {
            let response = self.client.request(http_request).await?;
            let status = response.status();
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| S3Error::Transport(format!("body error: {}", e)))?
                .to_bytes();
            Ok::<_, S3Error>(S3Response { status, body })
        };

        let response = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| S3Error::Timeout(self.timeout))??;

        debug!(
            status = response.status.as_u16(),
            bytes = response.body.len(),
            "received response"
        );
        Ok(response)
    }
}
