//! russh client handler: server host key verification

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use russh::client;
use russh_keys::key::PublicKey;

/// Host key rejection recorded by the handler
pub(crate) type Rejection = Arc<Mutex<Option<String>>>;

/// Verifies target host keys against the user's known_hosts
pub(crate) struct ClientHandler {
    host: String,
    port: u16,
    strict: bool,
    rejection: Rejection,
}

impl ClientHandler {
    pub(crate) fn new(host: &str, port: u16, strict: bool, rejection: Rejection) -> Self {
        Self {
            host: host.to_string(),
            port,
            strict,
            rejection,
        }
    }

    fn reject(&self, message: String) -> bool {
        tracing::error!("{}", message);
        *self.rejection.lock().unwrap_or_else(PoisonError::into_inner) = Some(message);
        false
    }
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = anyhow::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint();
        tracing::debug!("Host key for {}:{}: {}", self.host, self.port, fingerprint);

        match russh_keys::check_known_hosts(&self.host, self.port, server_public_key) {
            Ok(true) => Ok(true),
            Ok(false) if self.strict => Ok(self.reject(format!(
                "Host key for {} is not in known_hosts ({})",
                self.host, fingerprint
            ))),
            Ok(false) => {
                tracing::warn!(
                    "Accepting unknown host key for {}:{} ({})",
                    self.host,
                    self.port,
                    fingerprint
                );
                Ok(true)
            }
            Err(e) => Ok(self.reject(format!(
                "Host key verification failed for {}: {}",
                self.host, e
            ))),
        }
    }
}
