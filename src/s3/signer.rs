//! AWS Signature Version 4 signer for S3 requests
//!
//! Every call builds a fresh signing context:
//! - UTC timestamp and SHA-256 of the payload
//! - canonical request (method, path, query, `host` + `x-amz-*` headers)
//! - string to sign bound to the `date/region/s3/aws4_request` scope
//! - signing key derived through the 4-step HMAC chain
//!
//! Nothing is cached between requests.

use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use hyper::{Method, Uri};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::s3::error::{Result, S3Error};
use crate::s3::types::Bucket;

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";
pub const SERVICE: &str = "s3";
pub const USER_AGENT: &str = concat!("s3cli/", env!("CARGO_PKG_VERSION"));

/// Hex lookup table for zero-allocation percent encoding
static HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// Everything computed while signing one request.
///
/// `headers` is the complete header set to put on the wire; the other
/// fields are kept for logging and tests.
#[derive(Debug, Clone)]
pub struct SigningContext {
    /// `YYYYMMDDThhmmssZ`
    pub amz_date: String,
    pub content_sha256: String,
    pub canonical_request: String,
    pub signed_headers: String,
    pub scope: String,
    pub string_to_sign: String,
    pub signature: String,
    pub headers: BTreeMap<String, String>,
}

impl SigningContext {
    pub fn authorization(&self) -> Option<&str> {
        self.headers.get("authorization").map(String::as_str)
    }
}

/// AWS Signature Version 4 signer bound to one bucket's credentials
#[derive(Clone)]
pub struct S3SignerV4 {
    access_key: String,
    secret_key: String,
    region: String,
}

impl std::fmt::Debug for S3SignerV4 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3SignerV4")
            .field("access_key", &self.access_key)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl S3SignerV4 {
    pub fn new(bucket: &Bucket) -> Self {
        Self {
            access_key: bucket.access_key_id.clone(),
            secret_key: bucket.secret_key.clone(),
            region: bucket.region.clone(),
        }
    }

    /// Sign a request at the current time
    pub fn sign(
        &self,
        method: &Method,
        uri: &Uri,
        headers: &BTreeMap<String, String>,
        payload: &[u8],
        content_md5: bool,
    ) -> Result<SigningContext> {
        self.sign_at(method, uri, headers, payload, content_md5, Utc::now())
    }

    /// Sign a request at a fixed instant.
    ///
    /// `headers` are caller supplied; any whose lowercased name starts with
    /// `x-amz-` is signed, the rest are only forwarded. A caller `host`
    /// header is replaced by the one derived from `uri`.
    pub fn sign_at(
        &self,
        method: &Method,
        uri: &Uri,
        headers: &BTreeMap<String, String>,
        payload: &[u8],
        content_md5: bool,
        now: DateTime<Utc>,
    ) -> Result<SigningContext> {
        let host = Self::canonical_host(uri)?;
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        let content_sha256 = hex::encode(Sha256::digest(payload));

        let mut all_headers: BTreeMap<String, String> = headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
            .filter(|(k, _)| k != "host")
            .collect();
        all_headers.insert("x-amz-date".to_string(), amz_date.clone());
        all_headers.insert("x-amz-content-sha256".to_string(), content_sha256.clone());
        all_headers.insert("user-agent".to_string(), USER_AGENT.to_string());
        all_headers.insert("accept".to_string(), "*/*".to_string());

        let canonical_path = Self::canonical_path(uri);
        let canonical_query = Self::canonical_query_string(uri.query().unwrap_or(""));
        let (canonical_headers, signed_headers) = Self::canonical_headers(&host, &all_headers);

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method.as_str().to_ascii_uppercase(),
            canonical_path,
            canonical_query,
            canonical_headers,
            signed_headers,
            content_sha256
        );
        tracing::trace!(canonical_request = %canonical_request, "canonical request");

        let scope = format!("{}/{}/{}/aws4_request", date_stamp, self.region, SERVICE);
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            amz_date,
            scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );
        tracing::trace!(string_to_sign = %string_to_sign, "string to sign");

        let signing_key = self.derive_signing_key(&date_stamp);
        let signature = hex::encode(Self::hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        let authorization = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, self.access_key, scope, signed_headers, signature
        );

        all_headers.insert("host".to_string(), host);
        all_headers.insert("authorization".to_string(), authorization);
        if content_md5 {
            all_headers.insert("content-md5".to_string(), Self::content_md5(payload));
        }

        Ok(SigningContext {
            amz_date,
            content_sha256,
            canonical_request,
            signed_headers,
            scope,
            string_to_sign,
            signature,
            headers: all_headers,
        })
    }

    /// Host header value: authority without user info and without the
    /// scheme's default port
    pub fn canonical_host(uri: &Uri) -> Result<String> {
        let authority = uri.authority().ok_or_else(|| S3Error::InvalidUrl {
            url: uri.to_string(),
            reason: "missing host".to_string(),
        })?;
        let host = authority.host();
        if host.is_empty() {
            return Err(S3Error::InvalidUrl {
                url: uri.to_string(),
                reason: "missing host".to_string(),
            });
        }

        let default_port = match uri.scheme_str() {
            Some("https") => Some(443),
            Some("http") => Some(80),
            _ => None,
        };
        match authority.port_u16() {
            Some(port) if Some(port) != default_port => Ok(format!("{}:{}", host, port)),
            _ => Ok(host.to_string()),
        }
    }

    /// Request path with every `=` escaped; an empty path signs as `/`
    fn canonical_path(uri: &Uri) -> String {
        let path = uri.path();
        if path.is_empty() {
            "/".to_string()
        } else {
            path.replace('=', "%3D")
        }
    }

    /// Create canonical query string (sorted by parameter name, then value)
    ///
    /// Each component is decoded and re-encoded so that the result does not
    /// depend on how the caller escaped it. Parameters without `=` become
    /// `param=`.
    pub fn canonical_query_string(query: &str) -> String {
        if query.is_empty() {
            return String::new();
        }

        let mut params: Vec<(String, String)> = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                let key = urlencoding::decode(key).unwrap_or_else(|_| key.into());
                let value = urlencoding::decode(value).unwrap_or_else(|_| value.into());
                (Self::uri_encode(&key, true), Self::uri_encode(&value, true))
            })
            .collect();

        params.sort_unstable();

        params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Canonical header block (`host` first, then the sorted `x-amz-*`
    /// headers, one per line) and the matching signed-header list
    fn canonical_headers(host: &str, headers: &BTreeMap<String, String>) -> (String, String) {
        let mut canonical = String::with_capacity(headers.len() * 64);
        let mut signed = String::with_capacity(headers.len() * 20);

        canonical.push_str("host:");
        canonical.push_str(host);
        canonical.push('\n');
        signed.push_str("host");

        // keys are lowercase, BTreeMap keeps them sorted
        for (k, v) in headers.iter().filter(|(k, _)| k.starts_with("x-amz-")) {
            canonical.push_str(k);
            canonical.push(':');
            canonical.push_str(v.trim());
            canonical.push('\n');
            signed.push(';');
            signed.push_str(k);
        }

        (canonical, signed)
    }

    /// Derive signing key from date stamp (4 chained HMAC operations)
    pub fn derive_signing_key(&self, date_stamp: &str) -> [u8; 32] {
        let seed = format!("AWS4{}", self.secret_key);
        let k_date = Self::hmac_sha256(seed.as_bytes(), date_stamp.as_bytes());
        let k_region = Self::hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = Self::hmac_sha256(&k_region, SERVICE.as_bytes());
        Self::hmac_sha256(&k_service, b"aws4_request")
    }

    /// HMAC-SHA256 returning fixed-size array (no heap allocation)
    fn hmac_sha256(key: &[u8], msg: &[u8]) -> [u8; 32] {
        let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
        mac.update(msg);
        let result = mac.finalize().into_bytes();
        let mut output = [0u8; 32];
        output.copy_from_slice(&result);
        output
    }

    /// Base64 of the payload's MD5 digest
    pub fn content_md5(payload: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(md5::compute(payload).0)
    }

    /// URI encode a string (RFC 3986) using hex lookup table
    pub fn uri_encode(s: &str, encode_slash: bool) -> String {
        let mut result = String::with_capacity(s.len() + 16);
        for byte in s.bytes() {
            match byte {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                    result.push(byte as char);
                }
                b'/' if !encode_slash => {
                    result.push('/');
                }
                _ => {
                    result.push('%');
                    result.push(HEX_UPPER[(byte >> 4) as usize] as char);
                    result.push(HEX_UPPER[(byte & 0xf) as usize] as char);
                }
            }
        }
        result
    }
}
