//! Account credentials
//!
//! A [`Credentials`] value is validated once at construction and is immutable
//! afterwards. It is shared by every request a client makes and is never
//! written anywhere by this crate.

use crate::error::{CoreError, Result};
use std::fmt;
use url::Url;

/// How requests are authenticated
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// Access key pair, every request is signed with `SDK-HMAC-SHA256`
    AccessKey {
        access_key_id: String,
        secret: String,
    },
    /// IAM user, requests carry a token obtained from the identity service
    Password {
        user: String,
        password: String,
        domain: String,
    },
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::AccessKey { access_key_id, .. } => f
                .debug_struct("AccessKey")
                .field("access_key_id", &redact_key(access_key_id))
                .field("secret", &"***")
                .finish(),
            AuthMethod::Password { user, domain, .. } => f
                .debug_struct("Password")
                .field("user", user)
                .field("password", &"***")
                .field("domain", domain)
                .finish(),
        }
    }
}

/// Validated credentials for one account and project
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    auth: AuthMethod,
    project_id: Option<String>,
    domain_id: Option<String>,
    auth_domain: String,
    scheme: String,
}

impl Credentials {
    /// Access-key credentials.
    ///
    /// `auth_url` is the stack's identity domain, either a bare domain
    /// (`hcs.example.com`) or a URL (`https://hcs.example.com`).
    pub fn access_key(
        access_key_id: impl Into<String>,
        secret: impl Into<String>,
        auth_url: &str,
    ) -> Result<Self> {
        let access_key_id = access_key_id.into();
        let secret = secret.into();
        if access_key_id.trim().is_empty() {
            return Err(CoreError::Credential("access key id is empty".to_string()));
        }
        if secret.trim().is_empty() {
            return Err(CoreError::Credential("secret key is empty".to_string()));
        }
        if access_key_id.chars().any(char::is_whitespace) {
            return Err(CoreError::Credential(
                "access key id contains whitespace".to_string(),
            ));
        }
        let (scheme, auth_domain) = parse_auth_url(auth_url)?;
        Ok(Self {
            auth: AuthMethod::AccessKey {
                access_key_id,
                secret,
            },
            project_id: None,
            domain_id: None,
            auth_domain,
            scheme,
        })
    }

    /// Password credentials for token authentication
    pub fn password(
        user: impl Into<String>,
        password: impl Into<String>,
        domain: impl Into<String>,
        auth_url: &str,
    ) -> Result<Self> {
        let user = user.into();
        let password = password.into();
        let domain = domain.into();
        if user.trim().is_empty() {
            return Err(CoreError::Credential("user name is empty".to_string()));
        }
        if password.is_empty() {
            return Err(CoreError::Credential("password is empty".to_string()));
        }
        if domain.trim().is_empty() {
            return Err(CoreError::Credential("domain name is empty".to_string()));
        }
        let (scheme, auth_domain) = parse_auth_url(auth_url)?;
        Ok(Self {
            auth: AuthMethod::Password {
                user,
                password,
                domain,
            },
            project_id: None,
            domain_id: None,
            auth_domain,
            scheme,
        })
    }

    /// Scope the credentials to a project
    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        let project_id = project_id.into();
        self.project_id = if project_id.trim().is_empty() {
            None
        } else {
            Some(project_id)
        };
        self
    }

    /// Account (domain) id, sent on VPC peering calls
    pub fn with_domain_id(mut self, domain_id: impl Into<String>) -> Self {
        let domain_id = domain_id.into();
        self.domain_id = (!domain_id.trim().is_empty()).then_some(domain_id);
        self
    }

    pub fn auth(&self) -> &AuthMethod {
        &self.auth
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    pub fn domain_id(&self) -> Option<&str> {
        self.domain_id.as_deref()
    }

    /// Identity domain every product host is derived from
    pub fn auth_domain(&self) -> &str {
        &self.auth_domain
    }

    /// `https` unless the auth URL said otherwise
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Access key id truncated for logs
    pub fn key_hint(&self) -> String {
        match &self.auth {
            AuthMethod::AccessKey { access_key_id, .. } => redact_key(access_key_id),
            AuthMethod::Password { user, .. } => user.clone(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("auth", &self.auth)
            .field("project_id", &self.project_id)
            .field("auth_domain", &self.auth_domain)
            .finish()
    }
}

fn redact_key(key: &str) -> String {
    let visible: String = key.chars().take(8).collect();
    format!("{}...", visible)
}

fn parse_auth_url(auth_url: &str) -> Result<(String, String)> {
    let trimmed = auth_url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(CoreError::Credential("auth URL is empty".to_string()));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let url = Url::parse(&with_scheme)
        .map_err(|e| CoreError::Credential(format!("invalid auth URL '{}': {}", auth_url, e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| CoreError::Credential(format!("auth URL '{}' has no host", auth_url)))?;

    let domain = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    Ok((url.scheme().to_string(), domain))
}
