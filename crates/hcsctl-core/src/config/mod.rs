//! Profile configuration for hcsctl
//!
//! Profiles live in a TOML file at the platform config location and name
//! everything a client needs: the identity domain, credentials, project,
//! region, proxy, endpoint overrides and retry/poll ceilings.
//!
//! # Features
//!
//! - Multiple named profiles with a default
//! - Secure credential storage using OS keyring (optional)
//! - Environment variable expansion in config files
//! - Platform-specific config file locations

#![allow(clippy::module_inception)]

pub mod config;
pub mod credential;
pub mod error;
pub mod resilience;

pub use config::{Config, Profile, ProfileCredentials, ProxyConfig, ResolvedAuth};
pub use credential::{CredentialStore, SecretRef, keyring_key};
pub use error::{ConfigError, Result};
pub use resilience::{PollConfig, ResilienceConfig, RetryConfig};
