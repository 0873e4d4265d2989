//! Unified error handling for hcsctl-core
//!
//! Every failure the dispatch layer can produce is a [`CoreError`]. Vendor
//! HTTP failures carry an [`ErrorClassification`] so callers can branch on
//! the kind of failure instead of matching error strings.
//!
//! # Example
//!
//! ```rust
//! use hcsctl_core::{CoreError, ErrorClassification};
//! use serde_json::json;
//!
//! let body = json!({"error_code": "Ecs.0114", "error_msg": "server does not exist"});
//! let err = CoreError::Api {
//!     product: "ecs".to_string(),
//!     operation: "GET cloudservers/abc".to_string(),
//!     classification: ErrorClassification::classify(400, &body),
//! };
//! assert!(err.is_not_found());
//! assert!(!err.is_retryable());
//! ```

use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;

/// Vendor error codes (or error types) that mean "the resource does not exist",
/// whatever HTTP status the product chose to send them with.
const NOT_FOUND_CODES: &[&str] = &[
    "Ecs.0114",
    "DCS.4010",
    "itemNotFound",
    "NetworkNotFound",
    "SubnetNotFound",
    "PortNotFound",
    "RouterNotFound",
    "FloatingIPNotFound",
    "SecurityGroupNotFound",
    "SecurityGroupRuleNotFound",
];

/// Coarse failure kind derived from an HTTP response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    RateLimited,
    Conflict,
    ServerError,
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::RateLimited => "rate limited",
            ErrorKind::Conflict => "conflict",
            ErrorKind::ServerError => "server error",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Classification of one failed vendor response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorClassification {
    pub http_status: u16,
    pub vendor_code: Option<String>,
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorClassification {
    /// Classify an HTTP status plus the (possibly empty) vendor error body.
    ///
    /// A vendor code listed in the not-found table wins over the status code,
    /// since several products report missing resources as 400.
    pub fn classify(status: u16, body: &Value) -> Self {
        let (vendor_code, message) = extract_vendor_error(body);

        let kind = if vendor_code
            .as_deref()
            .is_some_and(|code| NOT_FOUND_CODES.contains(&code))
        {
            ErrorKind::NotFound
        } else {
            match status {
                404 => ErrorKind::NotFound,
                401 | 403 => ErrorKind::Unauthorized,
                409 | 412 => ErrorKind::Conflict,
                429 => ErrorKind::RateLimited,
                500..=599 => ErrorKind::ServerError,
                _ => ErrorKind::Unknown,
            }
        };

        let message = message.unwrap_or_else(|| match body {
            Value::Null => format!("HTTP {}", status),
            other => other.to_string(),
        });

        Self {
            http_status: status,
            vendor_code,
            kind,
            message,
        }
    }

    /// Whether the Transport may retry the request that produced this
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::ServerError | ErrorKind::RateLimited)
    }
}

impl fmt::Display for ErrorClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {} ({})", self.http_status, self.kind)?;
        if let Some(code) = &self.vendor_code {
            write!(f, " [{}]", code)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Pull `(code, message)` out of the error body shapes used across products.
fn extract_vendor_error(body: &Value) -> (Option<String>, Option<String>) {
    let Some(obj) = body.as_object() else {
        return (None, None);
    };

    let text = |v: Option<&Value>| -> Option<String> {
        v.and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    };

    // {"error_code": "...", "error_msg": "..."}
    if let Some(code) = text(obj.get("error_code")) {
        return (Some(code), text(obj.get("error_msg")));
    }

    // {"code": "...", "message": "..."}
    if let Some(Value::String(code)) = obj.get("code") {
        return (
            Some(code.clone()),
            text(obj.get("message").or_else(|| obj.get("msg"))),
        );
    }

    // {"NeutronError": {"type": "...", "message": "..."}}
    if let Some(inner) = obj.get("NeutronError") {
        return (text(inner.get("type")), text(inner.get("message")));
    }

    // {"error": {"code": "...", "message": "..."}} or {"itemNotFound": {...}}
    if obj.len() == 1 {
        if let Some((key, inner)) = obj.iter().next()
            && inner.is_object()
        {
            let message = text(inner.get("message"));
            let code = match text(inner.get("code")) {
                Some(code) if key == "error" => Some(code),
                // nova-style bodies name the fault in the key, the code is just the status
                _ if key != "error" => Some(key.clone()),
                other => other,
            };
            return (code, message);
        }
    }

    (None, text(obj.get("message")))
}

/// Core error type for the dispatch layer
#[derive(Error, Debug)]
pub enum CoreError {
    /// Credentials are absent or malformed
    #[error("Credential error: {0}")]
    Credential(String),

    /// Client setup is wrong (unknown product, missing region, bad URL)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Authentication failed after the single allowed token refresh
    #[error("Authentication failed for {product}: {message}")]
    Auth { product: String, message: String },

    /// A mutating call was attempted on a read-only client
    #[error("Refusing {method} {url}: client is configured read-only")]
    ReadOnlyViolation { method: String, url: String },

    /// The vendor answered with a non-success status
    #[error("{product} {operation} failed: {classification}")]
    Api {
        product: String,
        operation: String,
        classification: ErrorClassification,
    },

    /// Network-level failure after the retry budget was spent
    #[error("{product} {operation} failed: {message}")]
    Network {
        product: String,
        operation: String,
        message: String,
    },

    /// The vendor broke its own paging or job contract
    #[error("Protocol error from {product}: {message}")]
    Protocol { product: String, message: String },

    /// The vendor reported the asynchronous job as failed
    #[error("Job {job_id} failed: {reason}")]
    JobFailed { job_id: String, reason: String },

    /// The job did not reach a terminal state within the ceiling
    #[error("Job {job_id} timed out after {timeout:?}")]
    JobTimedOut { job_id: String, timeout: Duration },

    /// The caller's cancellation token fired
    #[error("Operation cancelled")]
    Cancelled,

    /// Response body could not be decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Profile configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Failure kind for vendor HTTP failures
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            CoreError::Api { classification, .. } => Some(classification.kind),
            CoreError::Auth { .. } => Some(ErrorKind::Unauthorized),
            _ => None,
        }
    }

    /// Returns true if the resource does not exist
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == Some(ErrorKind::NotFound)
    }

    /// Returns true if this is an authentication/authorization error (401/403)
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.kind() == Some(ErrorKind::Unauthorized)
    }

    /// Returns true if this is a rate limiting error (429)
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.kind() == Some(ErrorKind::RateLimited)
    }

    /// Returns true if this is a conflict/precondition error (409/412)
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.kind() == Some(ErrorKind::Conflict)
    }

    /// Returns true if this is a server error (5xx)
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.kind() == Some(ErrorKind::ServerError)
    }

    /// Returns true if a job ran out of time
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, CoreError::JobTimedOut { .. })
    }

    /// Returns true for transient failures: network errors, 5xx and 429
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::Network { .. } => true,
            CoreError::Api { classification, .. } => classification.is_retryable(),
            _ => false,
        }
    }

    /// Returns true for setup mistakes that no retry can fix
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CoreError::Credential(_)
                | CoreError::Configuration(_)
                | CoreError::Auth { .. }
                | CoreError::ReadOnlyViolation { .. }
                | CoreError::Config(_)
        )
    }
}

/// Helpers for adapters that treat a missing resource as a normal outcome
pub trait ResultExt<T> {
    /// Map a not-found failure to `Ok(None)`
    fn ignore_not_found(self) -> Result<Option<T>>;
}

impl<T> ResultExt<T> for Result<T> {
    fn ignore_not_found(self) -> Result<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
