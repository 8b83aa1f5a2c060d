//! Identity provider traits

use async_trait::async_trait;

use crate::error::{CredentialError, IdentityError};
use crate::types::HostEntry;

/// Source of truth for who may reach which hosts, and with what key
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Hosts the user is allowed to reach, in display order
    ///
    /// `force` bypasses any cache the provider keeps.
    async fn allowed_hosts(
        &self,
        username: &str,
        force: bool,
    ) -> Result<Vec<HostEntry>, IdentityError>;

    /// Private key material (OpenSSH format) for the user
    ///
    /// Returns `CredentialError::NoPrivateKey` when nothing is provisioned,
    /// which callers treat as "fall back to a password".
    fn private_key(&self, username: &str) -> Result<String, CredentialError>;
}
