//! Connection management: profile resolution and client construction

use crate::error::Result as CliResult;
use anyhow::Context;
use hcsctl_core::config::{Config, Profile, ProfileCredentials};
use hcsctl_core::{HcsClient, HcsClientBuilder};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

const ENV_AUTH_URL: &str = "HCS_AUTH_URL";
const ENV_ACCESS_KEY: &str = "HCS_ACCESS_KEY";
const ENV_SECRET_KEY: &str = "HCS_SECRET_KEY";
const ENV_USERNAME: &str = "HCS_USERNAME";
const ENV_PASSWORD: &str = "HCS_PASSWORD";
const ENV_DOMAIN: &str = "HCS_DOMAIN";
const ENV_PROJECT_ID: &str = "HCS_PROJECT_ID";
const ENV_REGION: &str = "HCS_REGION";
const ENV_READ_ONLY: &str = "HCS_READ_ONLY";

/// Per-invocation settings from global flags
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub region: Option<String>,
    pub read_only: bool,
    pub retry_attempts: Option<u32>,
}

/// Connection manager for creating authenticated clients
#[derive(Clone)]
pub struct ConnectionManager {
    pub config: Config,
    pub config_path: Option<PathBuf>,
}

impl ConnectionManager {
    #[cfg(test)]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            config_path: None,
        }
    }

    /// Create a new connection manager with a custom config path
    pub fn with_config_path(config: Config, config_path: Option<PathBuf>) -> Self {
        Self {
            config,
            config_path,
        }
    }

    /// Save the configuration to the appropriate location
    pub fn save_config(&self) -> CliResult<()> {
        if let Some(ref path) = self.config_path {
            self.config
                .save_to_path(path)
                .context("Failed to save configuration")?;
        } else {
            self.config.save().context("Failed to save configuration")?;
        }
        Ok(())
    }

    /// Path of the active configuration file
    pub fn config_file(&self) -> CliResult<PathBuf> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Config::config_path()?),
        }
    }

    /// When --config-file is given explicitly, environment variables are
    /// ignored so the file alone decides.
    fn env(&self, name: &str) -> Option<String> {
        if self.config_path.is_some() {
            return None;
        }
        let value = std::env::var(name).ok().filter(|v| !v.is_empty());
        if value.is_some() {
            debug!("Found {} environment variable", name);
        }
        value
    }

    /// Profile to build the client from, environment overrides applied.
    ///
    /// Complete credentials in the environment (`HCS_AUTH_URL` plus an access
    /// key pair or username/password/domain) stand on their own; otherwise the
    /// named or default profile is loaded and individual fields are
    /// overridden.
    pub fn resolve_profile(&self, profile_name: Option<&str>) -> CliResult<Profile> {
        trace!("Profile name: {:?}", profile_name);
        if self.config_path.is_some() {
            info!("--config-file specified explicitly, ignoring environment variables");
        }

        let auth_url = self.env(ENV_AUTH_URL);
        let access_key = self.env(ENV_ACCESS_KEY);
        let secret_key = self.env(ENV_SECRET_KEY);
        let username = self.env(ENV_USERNAME);
        let password = self.env(ENV_PASSWORD);
        let domain = self.env(ENV_DOMAIN);

        let from_env = match (&auth_url, &access_key, &secret_key, &username, &password, &domain) {
            (Some(url), Some(ak), Some(sk), _, _, _) => {
                info!("Using access-key credentials from environment variables");
                Some(Profile::access_key(url, ak, sk))
            }
            (Some(url), _, _, Some(user), Some(pw), Some(domain)) => {
                info!("Using password credentials from environment variables");
                Some(Profile::password(url, user, pw, domain))
            }
            _ => None,
        };

        let mut profile = match from_env {
            Some(profile) => profile,
            None => {
                let name = self.config.resolve_profile(profile_name)?;
                info!("Using profile: {}", name);
                let mut profile = self.config.profile(&name)?.clone();
                if let Some(url) = auth_url {
                    profile.auth_url = url;
                }
                if let ProfileCredentials::AccessKey {
                    access_key: ak,
                    secret_key: sk,
                } = &mut profile.credentials
                {
                    if let Some(value) = access_key {
                        *ak = value;
                    }
                    if let Some(value) = secret_key {
                        *sk = value;
                    }
                }
                profile
            }
        };

        if let Some(project) = self.env(ENV_PROJECT_ID) {
            profile.project_id = Some(project);
        }
        if let Some(region) = self.env(ENV_REGION) {
            profile.region = Some(region);
        }
        if let Some(flag) = self.env(ENV_READ_ONLY) {
            profile.read_only |= matches!(flag.to_lowercase().as_str(), "1" | "true" | "yes");
        }

        Ok(profile)
    }

    /// Build a client for the resolved profile.
    ///
    /// Flags can only tighten the profile: `--read-only` turns the guard on
    /// but never off.
    pub fn create_client(
        &self,
        profile_name: Option<&str>,
        options: &ClientOptions,
        cancel: CancellationToken,
    ) -> CliResult<HcsClient> {
        debug!("Creating HCS client");
        let profile = self.resolve_profile(profile_name)?;

        let mut builder = HcsClientBuilder::from_profile(&profile)?.cancellation(cancel);
        if let Some(region) = &options.region {
            builder = builder.region(region.clone());
        }
        if options.read_only {
            builder = builder.read_only(true);
        }
        if let Some(attempts) = options.retry_attempts {
            let mut retry = profile.resilience().retry;
            retry.max_attempts = attempts;
            builder = builder.retry(retry);
        }

        let client = builder.build()?;
        trace!(
            "Client key: {}, read-only: {}",
            client.credentials().key_hint(),
            client.is_read_only()
        );
        Ok(client)
    }
}
