//! gw-core: Core abstractions and configuration for gatewarden
//!
//! This crate provides the domain types, error taxonomy, configuration
//! structures and collaborator traits shared by the session layer and
//! the interactive browser.

pub mod config;
pub mod error;
pub mod identity;
pub mod traits;
pub mod types;

pub use error::{ConfigError, CredentialError, IdentityError, SessionError};
pub use types::{HostEntry, SessionId, SessionInfo, TerminalSize};
