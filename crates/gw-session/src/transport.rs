//! Transport capability used by interactive sessions

use async_trait::async_trait;

use gw_core::traits::Sniffer;
use gw_core::{SessionError, TerminalSize};

use crate::credential::Credential;
use crate::kill::{KillHandle, KillSignal};

/// Kinds of transport a session can be built over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Interactive shell over SSH
    Ssh,
}

/// How an interactive session came to an end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The remote side closed the channel
    Closed { exit_status: Option<u32> },
    /// The hosting environment killed the session
    Killed(KillSignal),
}

/// Connection machinery a session drives
///
/// A transport owns at most one live connection. The connection exists
/// from a successful [`connect`](Transport::connect) until
/// [`disconnect`](Transport::disconnect).
#[async_trait]
pub trait Transport: Send {
    fn kind(&self) -> TransportKind;

    /// Whether a connection is currently held
    fn is_connected(&self) -> bool;

    /// Open the network connection to the target
    async fn connect(
        &mut self,
        host: &str,
        port: u16,
        src_port: Option<u16>,
        size: TerminalSize,
    ) -> Result<(), SessionError>;

    /// Authenticate and run the interactive session until it ends
    ///
    /// Must fail with `SessionError::NoCredential` when the credential
    /// cannot be used at all, as opposed to being rejected.
    async fn start_session(
        &mut self,
        username: &str,
        credential: Credential,
        kill: &KillHandle,
    ) -> Result<SessionEnd, SessionError> {
        let _ = (username, credential, kill);
        Err(SessionError::NotImplemented("start_session"))
    }

    /// Start forwarding traffic to an (already started) sniffer
    fn attach_sniffer(&mut self, sniffer: Box<dyn Sniffer>) -> Result<(), SessionError>;

    /// Stop and drop the attached sniffer, if any
    fn stop_sniffer(&mut self) -> Result<(), SessionError>;

    /// Drop the connection; a no-op when not connected
    async fn disconnect(&mut self);
}
