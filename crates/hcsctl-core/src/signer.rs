//! `SDK-HMAC-SHA256` request signing
//!
//! The scheme is a single-key HMAC over a canonical form of the request:
//!
//! 1. Create the canonical request
//! 2. Create the string to sign from the `X-Sdk-Date` timestamp and the
//!    hash of the canonical request
//! 3. HMAC the string to sign with the secret key
//! 4. Put the signature in the `Authorization` header
//!
//! Signing is pure apart from the timestamp, which callers pass in. Re-signing
//! the same input with the same timestamp yields the same headers.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use reqwest::Method;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

use crate::credentials::{AuthMethod, Credentials};
use crate::error::{CoreError, Result};

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "SDK-HMAC-SHA256";
pub const DATE_HEADER: &str = "x-sdk-date";
pub const DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// RFC 3986 unreserved characters stay as-is, everything else is escaped
const RFC3986: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// A request ready to hand to the HTTP client.
///
/// Built once per attempt and never reused, so a retry always carries a
/// fresh `X-Sdk-Date`.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub method: Method,
    pub url: Url,
    /// Outgoing headers, lower-cased. `host` is signed but left to the HTTP client.
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

/// Access-key signer
#[derive(Clone)]
pub struct AkSkSigner {
    access_key_id: String,
    secret: String,
}

impl fmt::Debug for AkSkSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AkSkSigner")
            .field(
                "access_key_id",
                &self.access_key_id.chars().take(8).collect::<String>(),
            )
            .finish_non_exhaustive()
    }
}

impl AkSkSigner {
    pub fn new(access_key_id: impl Into<String>, secret: impl Into<String>) -> Result<Self> {
        let access_key_id = access_key_id.into();
        let secret = secret.into();
        if access_key_id.is_empty() || secret.is_empty() {
            return Err(CoreError::Credential(
                "access key id and secret are required for request signing".to_string(),
            ));
        }
        Ok(Self {
            access_key_id,
            secret,
        })
    }

    /// Signer for access-key credentials; password credentials are rejected
    pub fn from_credentials(credentials: &Credentials) -> Result<Self> {
        match credentials.auth() {
            AuthMethod::AccessKey {
                access_key_id,
                secret,
            } => Self::new(access_key_id.clone(), secret.clone()),
            AuthMethod::Password { .. } => Err(CoreError::Credential(
                "password credentials cannot sign requests, use token authentication".to_string(),
            )),
        }
    }

    /// Sign one request.
    ///
    /// `headers` are the headers that will be sent. `host` and `x-sdk-date`
    /// are added to the signed set, `authorization` is added to the output.
    pub fn sign(
        &self,
        method: &Method,
        url: &Url,
        headers: &BTreeMap<String, String>,
        body: &[u8],
        timestamp: DateTime<Utc>,
    ) -> SignedRequest {
        let sdk_date = timestamp.format(DATE_FORMAT).to_string();

        let mut out: BTreeMap<String, String> = headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.trim().to_string()))
            .collect();
        out.insert(DATE_HEADER.to_string(), sdk_date.clone());

        let mut signed = out.clone();
        signed.insert("host".to_string(), host_header(url));

        let canonical = canonical_request(method, url, &signed, body);
        let string_to_sign = format!(
            "{}\n{}\n{}",
            ALGORITHM,
            sdk_date,
            sha256_hex(canonical.as_bytes())
        );
        let signature = hex::encode(hmac_sha256(
            self.secret.as_bytes(),
            string_to_sign.as_bytes(),
        ));

        let authorization = format!(
            "{} Access={}, SignedHeaders={}, Signature={}",
            ALGORITHM,
            self.access_key_id,
            signed_header_names(&signed),
            signature
        );
        out.insert("authorization".to_string(), authorization);

        SignedRequest {
            method: method.clone(),
            url: url.clone(),
            headers: out,
            body: body.to_vec(),
        }
    }
}

/// Canonical request:
///
/// ```text
/// METHOD \n CanonicalURI \n CanonicalQuery \n CanonicalHeaders \n SignedHeaders \n hex(sha256(body))
/// ```
pub(crate) fn canonical_request(
    method: &Method,
    url: &Url,
    headers: &BTreeMap<String, String>,
    body: &[u8],
) -> String {
    format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method.as_str(),
        canonical_uri(url),
        canonical_query(url),
        canonical_headers(headers),
        signed_header_names(headers),
        sha256_hex(body)
    )
}

/// Each path segment RFC 3986 encoded, always ending in `/`
fn canonical_uri(url: &Url) -> String {
    let mut uri = url
        .path()
        .split('/')
        .map(|segment| {
            let decoded = percent_decode_str(segment).decode_utf8_lossy();
            utf8_percent_encode(&decoded, RFC3986).to_string()
        })
        .collect::<Vec<_>>()
        .join("/");
    if !uri.ends_with('/') {
        uri.push('/');
    }
    uri
}

fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            (
                utf8_percent_encode(&k, RFC3986).to_string(),
                utf8_percent_encode(&v, RFC3986).to_string(),
            )
        })
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn canonical_headers(headers: &BTreeMap<String, String>) -> String {
    headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
        .collect()
}

fn signed_header_names(headers: &BTreeMap<String, String>) -> String {
    headers.keys().cloned().collect::<Vec<_>>().join(";")
}

fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
