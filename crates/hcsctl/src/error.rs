//! Error types for hcsctl
//!
//! Every failure the binary reports goes through [`HcsCtlError`], which knows
//! how to print itself as a cargo-style diagnostic with follow-up tips.

use colored::Colorize;
use hcsctl_core::config::ConfigError;
use hcsctl_core::{CoreError, ErrorKind};
use thiserror::Error;

/// Cargo-style diagnostic formatter for CLI errors.
///
/// Produces structured output like:
/// ```text
/// error: Profile 'prod' not found
///
///   tip: list available profiles:
///       hcsctl profile list
/// ```
pub struct CliDiagnostic {
    message: String,
    detail: Option<String>,
    tips: Vec<(String, Vec<String>)>,
}

impl CliDiagnostic {
    pub fn error(message: &str) -> Self {
        Self {
            message: message.to_string(),
            detail: None,
            tips: Vec::new(),
        }
    }

    /// Add a detail line below the error message.
    pub fn detail(mut self, text: &str) -> Self {
        self.detail = Some(text.to_string());
        self
    }

    /// Add a tip with optional example commands.
    pub fn tip(mut self, description: &str, commands: &[&str]) -> Self {
        self.tips.push((
            description.to_string(),
            commands.iter().map(|s| s.to_string()).collect(),
        ));
        self
    }

    /// Print the diagnostic to stderr with colored formatting.
    pub fn print(&self) {
        eprint!("{}{}", "error".red().bold(), ": ".bold());
        eprintln!("{}", self.message);

        if let Some(detail) = &self.detail {
            eprintln!("  {}", detail);
        }

        for (description, commands) in &self.tips {
            eprintln!();
            eprint!("  {}{}", "tip".yellow().bold(), ": ".bold());
            eprintln!("{}", description);
            for cmd in commands {
                eprintln!("      {}", cmd);
            }
        }
    }
}

/// Main error type for the hcsctl application
#[derive(Error, Debug)]
pub enum HcsCtlError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Profile '{name}' not found")]
    ProfileNotFound { name: String },

    #[error("No profile configured. Use 'hcsctl profile set' to configure a profile.")]
    NoProfileConfigured,

    #[error("Missing credentials: {message}")]
    MissingCredentials { message: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("{message}")]
    ReadOnly { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("API error: {message}")]
    ApiError {
        message: String,
        /// Underlying failure kind, when the vendor answered
        kind: Option<ErrorKind>,
    },

    #[error("Job failed: {message}")]
    JobFailed { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("File error for '{path}': {message}")]
    FileError { path: String, message: String },

    #[error("Connection error: {message}")]
    ConnectionError { message: String },

    #[error("Timeout: {message}")]
    Timeout { message: String },

    #[error("Cancelled")]
    Cancelled,

    #[error("Output formatting error: {message}")]
    OutputError { message: String },
}

/// Result type for hcsctl operations
pub type Result<T> = std::result::Result<T, HcsCtlError>;

impl HcsCtlError {
    /// Get helpful suggestions for resolving this error
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            HcsCtlError::ProfileNotFound { name } => vec![
                "List available profiles: hcsctl profile list".to_string(),
                format!(
                    "Create profile '{}': hcsctl profile set {} --auth-url <url> --access-key <ak> --secret-key <sk>",
                    name, name
                ),
            ],
            HcsCtlError::NoProfileConfigured => vec![
                "Create an access-key profile: hcsctl profile set prod --auth-url hcs.example.com --access-key <ak> --secret-key <sk>".to_string(),
                "Or export HCS_AUTH_URL, HCS_ACCESS_KEY and HCS_SECRET_KEY".to_string(),
            ],
            HcsCtlError::MissingCredentials { .. } => vec![
                "Check profile details: hcsctl profile show <profile>".to_string(),
                "Verify environment variables are set correctly".to_string(),
            ],
            HcsCtlError::AuthenticationFailed { .. } => vec![
                "Check your credentials: hcsctl profile show <profile>".to_string(),
                "Verify the auth URL matches your cloud's identity domain".to_string(),
            ],
            HcsCtlError::ReadOnly { .. } => vec![
                "Use a profile without read_only = true to make changes".to_string(),
                "Drop the --read-only flag".to_string(),
            ],
            HcsCtlError::ConnectionError { .. } => vec![
                "Check network connectivity and any proxy configured in the profile".to_string(),
                "Verify endpoint overrides: hcsctl profile show <profile>".to_string(),
            ],
            HcsCtlError::NotFound { .. } => vec![
                "Verify the resource ID is correct".to_string(),
                "Check that you're using the correct region and project".to_string(),
            ],
            HcsCtlError::ApiError {
                kind: Some(ErrorKind::RateLimited),
                ..
            } => vec!["Retry later or raise --retry-attempts".to_string()],
            HcsCtlError::Timeout { .. } => vec![
                "The job may still be running; check it with: hcsctl job wait <product> <job-id>"
                    .to_string(),
            ],
            HcsCtlError::InvalidInput { .. } => vec![
                "Check the command syntax: hcsctl <command> --help".to_string(),
            ],
            HcsCtlError::FileError { path, .. } => vec![
                format!("Check that file exists: {}", path),
                "Verify file permissions are correct".to_string(),
            ],
            _ => vec![],
        }
    }

    /// Print a cargo-style diagnostic to stderr using colored formatting.
    pub fn print_diagnostic(&self) {
        let mut diag = CliDiagnostic::error(&format!("{}", self));

        if let HcsCtlError::ApiError {
            kind: Some(kind), ..
        } = self
        {
            diag = diag.detail(&format!("kind: {:?}", kind));
        }

        for suggestion in self.suggestions() {
            diag = diag.tip(&suggestion, &[]);
        }

        diag.print();
    }

    /// Process exit code: 130 for Ctrl-C, 1 for everything else
    pub fn exit_code(&self) -> i32 {
        match self {
            HcsCtlError::Cancelled => 130,
            _ => 1,
        }
    }
}

impl From<serde_json::Error> for HcsCtlError {
    fn from(err: serde_json::Error) -> Self {
        HcsCtlError::OutputError {
            message: format!("JSON error: {}", err),
        }
    }
}

impl From<std::io::Error> for HcsCtlError {
    fn from(err: std::io::Error) -> Self {
        HcsCtlError::OutputError {
            message: format!("IO error: {}", err),
        }
    }
}

impl From<anyhow::Error> for HcsCtlError {
    fn from(err: anyhow::Error) -> Self {
        HcsCtlError::Config(err.to_string())
    }
}

impl From<ConfigError> for HcsCtlError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::ProfileNotFound { name } => HcsCtlError::ProfileNotFound { name },
            ConfigError::NoProfiles { .. } => HcsCtlError::NoProfileConfigured,
            ConfigError::CredentialError(message) => HcsCtlError::MissingCredentials { message },
            other => HcsCtlError::Config(other.to_string()),
        }
    }
}

impl From<CoreError> for HcsCtlError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Credential(message) => HcsCtlError::MissingCredentials { message },
            CoreError::Configuration(message) => HcsCtlError::Config(message),
            CoreError::Config(config_err) => HcsCtlError::from(config_err),
            CoreError::Auth { .. } => HcsCtlError::AuthenticationFailed {
                message: err.to_string(),
            },
            CoreError::ReadOnlyViolation { .. } => HcsCtlError::ReadOnly {
                message: err.to_string(),
            },
            CoreError::Network { .. } => HcsCtlError::ConnectionError {
                message: err.to_string(),
            },
            CoreError::JobFailed { .. } => HcsCtlError::JobFailed {
                message: err.to_string(),
            },
            CoreError::JobTimedOut { .. } => HcsCtlError::Timeout {
                message: err.to_string(),
            },
            CoreError::Cancelled => HcsCtlError::Cancelled,
            CoreError::Api { .. } if err.is_not_found() => HcsCtlError::NotFound {
                message: err.to_string(),
            },
            CoreError::Api { .. } | CoreError::Protocol { .. } | CoreError::Json(_) => {
                HcsCtlError::ApiError {
                    kind: err.kind(),
                    message: err.to_string(),
                }
            }
        }
    }
}
