//! Core error types for gatewarden

use std::path::PathBuf;
use thiserror::Error;

/// Failures while obtaining credential material for a user
#[derive(Error, Debug)]
pub enum CredentialError {
    /// No private key is provisioned for the user
    #[error("No usable private key for user {0}")]
    NoPrivateKey(String),

    /// The key exists but could not be read
    #[error("Failed to read private key {path:?}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The identity backend refused to hand out credentials
    #[error("Credential lookup failed: {0}")]
    Provider(String),
}

/// Session lifecycle errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// The transport could not use the supplied credential
    #[error("No usable credential")]
    NoCredential,

    /// Credential rejected by the target host
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Network or transport failure
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Target host key was unknown (strict checking) or changed
    #[error("Host key rejected: {0}")]
    HostKeyRejected(String),

    /// Local terminal could not be driven
    #[error("Terminal error: {0}")]
    Terminal(#[source] std::io::Error),

    /// Killed before the interactive session was running
    #[error("Session killed by {0}")]
    Killed(String),

    /// Lifecycle operation not provided by this transport kind
    #[error("{0} is not implemented for this transport")]
    NotImplemented(&'static str),

    /// Operation requires an established transport connection
    #[error("Transport is not connected")]
    NotConnected,

    /// Credential lookup failed for a reason other than a missing key
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// Password prompt failed or was aborted
    #[error("Password prompt failed: {0}")]
    Prompt(#[source] std::io::Error),

    /// Audit sniffer could not be started or written
    #[error("Sniffer error: {0}")]
    Sniffer(#[source] std::io::Error),
}

/// Identity provider errors
#[derive(Error, Debug)]
pub enum IdentityError {
    /// User is not known to the provider
    #[error("Unknown user: {0}")]
    UnknownUser(String),

    /// Allow-list file could not be read
    #[error("Failed to read allow-list {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Allow-list file is malformed
    #[error("Invalid allow-list: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
