//! Profile secrets, stored inline or in the OS keyring
//!
//! A secret field of a profile holds either the value itself or a
//! `keyring:<profile>-<field>` reference. References only resolve when the
//! `secure-storage` feature is compiled in.

use super::error::{ConfigError, Result};

const KEYRING_PREFIX: &str = "keyring:";

#[cfg(feature = "secure-storage")]
const SERVICE_NAME: &str = "hcsctl";

/// Where a secret field of a profile points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretRef<'a> {
    Inline(&'a str),
    Keyring(&'a str),
}

impl<'a> SecretRef<'a> {
    pub fn parse(value: &'a str) -> Self {
        match value.strip_prefix(KEYRING_PREFIX) {
            Some(key) => SecretRef::Keyring(key),
            None => SecretRef::Inline(value),
        }
    }

    pub fn is_keyring(&self) -> bool {
        matches!(self, SecretRef::Keyring(_))
    }
}

/// Keyring entry name for one secret field of a profile
pub fn keyring_key(profile: &str, field: &str) -> String {
    format!("{}-{}", profile, field)
}

/// Reads and writes profile secrets
#[derive(Debug, Clone, Copy, Default)]
pub struct CredentialStore {
    use_keyring: bool,
}

impl CredentialStore {
    /// Store that writes secrets inline into the profile
    pub fn inline() -> Self {
        Self { use_keyring: false }
    }

    /// Store that writes secrets to the OS keyring
    #[cfg(feature = "secure-storage")]
    pub fn keyring() -> Self {
        Self { use_keyring: true }
    }

    /// Persist `value` for `profile`/`field`; returns what goes into the
    /// config file
    pub fn store(&self, profile: &str, field: &str, value: &str) -> Result<String> {
        if !self.use_keyring {
            return Ok(value.to_string());
        }
        let key = keyring_key(profile, field);
        write_keyring(&key, value)?;
        tracing::debug!(key = %key, "stored secret in keyring");
        Ok(format!("{}{}", KEYRING_PREFIX, key))
    }

    /// Turn a profile field back into the secret it stands for
    pub fn resolve(&self, value: &str) -> Result<String> {
        match SecretRef::parse(value) {
            SecretRef::Inline(plain) => Ok(plain.to_string()),
            SecretRef::Keyring(key) => read_keyring(key),
        }
    }

    /// Drop the keyring entry behind `value`, if it is a reference. Entries
    /// that are already gone are not an error.
    pub fn forget(&self, value: &str) -> Result<()> {
        match SecretRef::parse(value) {
            SecretRef::Inline(_) => Ok(()),
            SecretRef::Keyring(key) => delete_keyring(key),
        }
    }
}

#[cfg(feature = "secure-storage")]
fn entry(key: &str) -> Result<keyring::Entry> {
    keyring::Entry::new(SERVICE_NAME, key).map_err(|e| ConfigError::KeyringError(e.to_string()))
}

#[cfg(feature = "secure-storage")]
fn write_keyring(key: &str, value: &str) -> Result<()> {
    entry(key)?
        .set_password(value)
        .map_err(|e| ConfigError::KeyringError(format!("cannot store '{}': {}", key, e)))
}

#[cfg(feature = "secure-storage")]
fn read_keyring(key: &str) -> Result<String> {
    entry(key)?
        .get_password()
        .map_err(|e| ConfigError::KeyringError(format!("cannot read '{}': {}", key, e)))
}

#[cfg(feature = "secure-storage")]
fn delete_keyring(key: &str) -> Result<()> {
    match entry(key)?.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(ConfigError::KeyringError(format!(
            "cannot delete '{}': {}",
            key, e
        ))),
    }
}

#[cfg(not(feature = "secure-storage"))]
fn write_keyring(key: &str, _value: &str) -> Result<()> {
    Err(keyring_disabled(key))
}

#[cfg(not(feature = "secure-storage"))]
fn read_keyring(key: &str) -> Result<String> {
    Err(keyring_disabled(key))
}

#[cfg(not(feature = "secure-storage"))]
fn delete_keyring(key: &str) -> Result<()> {
    Err(keyring_disabled(key))
}

#[cfg(not(feature = "secure-storage"))]
fn keyring_disabled(key: &str) -> ConfigError {
    ConfigError::CredentialError(format!(
        "'{}' lives in the keyring but hcsctl was built without secure-storage",
        key
    ))
}
