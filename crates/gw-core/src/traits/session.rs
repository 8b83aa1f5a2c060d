//! Session traits

use std::io;

use crate::error::CredentialError;
use crate::types::SessionInfo;

/// The owning context a session reports back to
///
/// Implemented by the gateway orchestrator. A session holds a shared
/// reference to it for its whole lifetime.
pub trait SessionContext: Send + Sync {
    /// Acting username on target hosts
    fn username(&self) -> &str;

    /// Local source port for outbound connections (None = ephemeral)
    fn src_port(&self) -> Option<u16>;

    /// Private key material for the acting user
    fn get_priv_key(&self) -> Result<String, CredentialError>;

    /// Called exactly once when a session ends, normally or by kill
    fn session_end_callback(&self, session: &SessionInfo);
}

/// Traffic direction seen by a sniffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Operator keystrokes sent to the target
    Input,
    /// Target output shown to the operator
    Output,
}

/// Audit component observing session traffic
pub trait Sniffer: Send {
    /// Begin capturing for a session
    fn start(&mut self, session: &SessionInfo) -> io::Result<()>;

    /// Record a chunk of traffic
    fn capture(&mut self, direction: Direction, data: &[u8]) -> io::Result<()>;

    /// Flush and stop capturing
    fn stop(&mut self) -> io::Result<()>;
}
