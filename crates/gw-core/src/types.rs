//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A selectable target host in the allow-list
///
/// Entries are immutable once built; the whole list is rebuilt when the
/// allow-list is refreshed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostEntry {
    hostname: String,
    port: u16,
}

impl HostEntry {
    /// Create a new host entry
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
        }
    }

    /// Build entries for a list of hostnames sharing one port
    pub fn from_hostnames<I, S>(hostnames: I, port: u16) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        hostnames.into_iter().map(|h| Self::new(h, port)).collect()
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for HostEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hostname, self.port)
    }
}

/// Terminal dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSize {
    /// Number of rows
    pub rows: u16,
    /// Number of columns
    pub cols: u16,
}

impl TerminalSize {
    /// Create a new terminal size
    pub fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self { rows: 24, cols: 80 }
    }
}

/// Unique identifier for an interactive session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a fresh random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SessionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Identity of a session as seen by its owning context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Session identifier
    pub id: SessionId,
    /// Target hostname
    pub host: String,
    /// Target port
    pub port: u16,
    /// Acting username on the target
    pub username: String,
    /// Local source port, if pinned
    pub src_port: Option<u16>,
}

impl fmt::Display for SessionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{} ({})", self.username, self.host, self.port, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_entry_display() {
        let host = HostEntry::new("db1.internal", 2222);
        assert_eq!(host.to_string(), "db1.internal:2222");
        assert_eq!(host.hostname(), "db1.internal");
        assert_eq!(host.port(), 2222);
    }

    #[test]
    fn test_host_entries_from_hostnames_keep_order() {
        let hosts = HostEntry::from_hostnames(["b", "a", "c"], 22);
        let names: Vec<_> = hosts.iter().map(|h| h.hostname()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert!(hosts.iter().all(|h| h.port() == 22));
    }

    #[test]
    fn test_session_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn test_session_info_display() {
        let id = SessionId::from(Uuid::nil());
        let info = SessionInfo {
            id,
            host: "web1".to_string(),
            port: 22,
            username: "alice".to_string(),
            src_port: None,
        };
        assert_eq!(
            info.to_string(),
            "alice@web1:22 (00000000-0000-0000-0000-000000000000)"
        );
    }
}
