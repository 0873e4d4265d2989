//! Configuration management for hcsctl
//!
//! Handles configuration loading from files and environment variable expansion.
//! Configuration is stored in TOML format with support for multiple named profiles.

#[cfg(target_os = "macos")]
use directories::BaseDirs;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::credential::CredentialStore;
use super::error::{ConfigError, Result};
use super::resilience::ResilienceConfig;
use crate::endpoint::PageStyle;

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Profile used when none is given on the command line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,
    /// Map of profile name -> profile configuration
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

/// One account/project on one stack
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Profile {
    /// Identity domain of the stack, e.g. `hcs.example.com`
    pub auth_url: String,
    /// Credentials (flattened into the profile)
    #[serde(flatten)]
    pub credentials: ProfileCredentials,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Account id, needed by VPC peering calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<String>,
    /// Region used when a command does not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Refuse every mutating call
    #[serde(default, skip_serializing_if = "is_false")]
    pub read_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyConfig>,
    /// product -> base URL
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub endpoints: HashMap<String, String>,
    /// product -> pagination style
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub pagination: HashMap<String, PageStyle>,
    /// Resilience configuration for this profile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resilience: Option<ResilienceConfig>,
}

/// Credentials as written in the profile; secrets may be `keyring:` references
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ProfileCredentials {
    AccessKey {
        access_key: String,
        secret_key: String,
    },
    Password {
        username: String,
        password: String,
        domain: String,
    },
}

/// Outbound proxy settings
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct ProxyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_proxy: Option<String>,
}

/// Credentials with keyring references resolved
#[derive(Clone, PartialEq, Eq)]
pub enum ResolvedAuth {
    AccessKey {
        access_key: String,
        secret_key: String,
    },
    Password {
        username: String,
        password: String,
        domain: String,
    },
}

impl std::fmt::Debug for ResolvedAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolvedAuth::AccessKey { access_key, .. } => f
                .debug_struct("AccessKey")
                .field(
                    "access_key",
                    &format!("{}...", access_key.chars().take(8).collect::<String>()),
                )
                .finish_non_exhaustive(),
            ResolvedAuth::Password {
                username, domain, ..
            } => f
                .debug_struct("Password")
                .field("username", username)
                .field("domain", domain)
                .finish_non_exhaustive(),
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Profile {
    /// Access-key profile with nothing but the essentials set
    pub fn access_key(
        auth_url: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self::with_credentials(
            auth_url.into(),
            ProfileCredentials::AccessKey {
                access_key: access_key.into(),
                secret_key: secret_key.into(),
            },
        )
    }

    /// Password profile with nothing but the essentials set
    pub fn password(
        auth_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self::with_credentials(
            auth_url.into(),
            ProfileCredentials::Password {
                username: username.into(),
                password: password.into(),
                domain: domain.into(),
            },
        )
    }

    fn with_credentials(auth_url: String, credentials: ProfileCredentials) -> Self {
        Self {
            auth_url,
            credentials,
            project_id: None,
            domain_id: None,
            region: None,
            read_only: false,
            proxy: None,
            endpoints: HashMap::new(),
            pagination: HashMap::new(),
            resilience: None,
        }
    }

    /// `access-key` or `password`
    pub fn auth_kind(&self) -> &'static str {
        match self.credentials {
            ProfileCredentials::AccessKey { .. } => "access-key",
            ProfileCredentials::Password { .. } => "password",
        }
    }

    /// Resolve keyring references in the stored credentials
    pub fn resolve_auth(&self) -> Result<ResolvedAuth> {
        let store = CredentialStore::default();
        let resolve = |value: &str, what: &str| {
            store.resolve(value).map_err(|e| {
                ConfigError::CredentialError(format!("Failed to resolve {}: {}", what, e))
            })
        };

        match &self.credentials {
            ProfileCredentials::AccessKey {
                access_key,
                secret_key,
            } => Ok(ResolvedAuth::AccessKey {
                access_key: resolve(access_key, "access key")?,
                secret_key: resolve(secret_key, "secret key")?,
            }),
            ProfileCredentials::Password {
                username,
                password,
                domain,
            } => Ok(ResolvedAuth::Password {
                username: resolve(username, "username")?,
                password: resolve(password, "password")?,
                domain: domain.clone(),
            }),
        }
    }

    /// Every stored secret field, inline or keyring reference
    pub fn secret_fields(&self) -> Vec<&str> {
        match &self.credentials {
            ProfileCredentials::AccessKey {
                access_key,
                secret_key,
            } => vec![access_key.as_str(), secret_key.as_str()],
            ProfileCredentials::Password {
                username, password, ..
            } => vec![username.as_str(), password.as_str()],
        }
    }

    /// Resilience settings, defaults when the profile has none
    pub fn resilience(&self) -> ResilienceConfig {
        self.resilience.clone().unwrap_or_default()
    }
}

impl Config {
    /// Resolve the profile to use: explicit name, then the default, then the
    /// first profile in alphabetical order
    pub fn resolve_profile(&self, explicit_profile: Option<&str>) -> Result<String> {
        if let Some(profile_name) = explicit_profile {
            if !self.profiles.contains_key(profile_name) {
                return Err(ConfigError::ProfileNotFound {
                    name: profile_name.to_string(),
                });
            }
            return Ok(profile_name.to_string());
        }

        if let Some(ref default) = self.default_profile {
            return Ok(default.clone());
        }

        self.list_profiles()
            .first()
            .map(|(name, _)| name.to_string())
            .ok_or_else(|| ConfigError::NoProfiles {
                suggestion: "Use 'hcsctl profile set' to create a profile.".to_string(),
            })
    }

    /// Profile by name
    pub fn profile(&self, name: &str) -> Result<&Profile> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound {
                name: name.to_string(),
            })
    }

    /// Load configuration from the standard location
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(config_path)
            .map_err(|e| ConfigError::io("read", config_path, e))?;

        let expanded_content = Self::expand_env_vars(&content);

        toml::from_str(&expanded_content).map_err(|source| ConfigError::Invalid {
            path: config_path.to_path_buf(),
            source,
        })
    }

    /// Save configuration to the standard location
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        self.save_to_path(&config_path)
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::io("create", parent, e))?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(config_path, content).map_err(|e| ConfigError::io("write", config_path, e))
    }

    /// Set or update a profile
    pub fn set_profile(&mut self, name: String, profile: Profile) {
        self.profiles.insert(name, profile);
    }

    /// Remove a profile by name
    pub fn remove_profile(&mut self, name: &str) -> Option<Profile> {
        if self.default_profile.as_deref() == Some(name) {
            self.default_profile = None;
        }
        self.profiles.remove(name)
    }

    /// List all profiles sorted by name
    pub fn list_profiles(&self) -> Vec<(&String, &Profile)> {
        let mut profiles: Vec<_> = self.profiles.iter().collect();
        profiles.sort_by_key(|(name, _)| *name);
        profiles
    }

    /// Get the path to the configuration file
    ///
    /// On macOS, `~/.config/hcsctl/config.toml` is preferred when it (or its
    /// directory) exists, otherwise the platform location is used.
    ///
    /// On Linux: ~/.config/hcsctl/config.toml
    /// On Windows: %APPDATA%\hcsctl\hcsctl\config.toml
    pub fn config_path() -> Result<PathBuf> {
        #[cfg(target_os = "macos")]
        {
            if let Some(base_dirs) = BaseDirs::new() {
                let linux_style_path = base_dirs
                    .home_dir()
                    .join(".config")
                    .join("hcsctl")
                    .join("config.toml");

                if linux_style_path.exists()
                    || linux_style_path.parent().is_some_and(|p| p.exists())
                {
                    return Ok(linux_style_path);
                }
            }
        }

        let proj_dirs =
            ProjectDirs::from("com", "hcsctl", "hcsctl").ok_or(ConfigError::ConfigDirError)?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Expand environment variables in configuration content
    ///
    /// Supports ${VAR} and ${VAR:-default} syntax. Unset variables without a
    /// default are left as written, so profiles that are not used do not fail.
    ///
    /// Example:
    /// ```toml
    /// secret_key = "${HCS_SECRET_KEY}"
    /// auth_url = "${HCS_AUTH_URL:-hcs.example.com}"
    /// ```
    fn expand_env_vars(content: &str) -> String {
        let expanded =
            shellexpand::env_with_context_no_errors(content, |var| std::env::var(var).ok());
        expanded.to_string()
    }
}
