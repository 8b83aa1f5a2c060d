//! Gateway configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::timeout_secs;

/// Configuration for the gateway front-end
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Default SSH port for allow-listed hosts
    pub ssh_port: u16,

    /// Local source port for outbound connections (unset = ephemeral)
    pub src_port: Option<u16>,

    /// Connection timeout
    #[serde(with = "timeout_secs")]
    pub connect_timeout: Duration,

    /// Reject hosts whose key is not in known_hosts
    pub strict_host_key_checking: bool,

    /// TERM value requested for the remote PTY
    pub term: String,

    /// Log file (the terminal is owned by the browser)
    pub log_file: PathBuf,

    /// Record every session's traffic for audit
    pub record_sessions: bool,

    /// Include operator keystrokes in recordings
    pub record_input: bool,

    /// Directory for session recordings
    pub session_log_dir: PathBuf,

    /// Identity provider settings
    pub identity: IdentityConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let config_dir = super::default_config_dir();

        Self {
            ssh_port: 22,
            src_port: None,
            connect_timeout: Duration::from_secs(30),
            strict_host_key_checking: false,
            term: "xterm-256color".to_string(),
            log_file: config_dir.join("gatewarden.log"),
            record_sessions: true,
            record_input: true,
            session_log_dir: config_dir.join("sessions"),
            identity: IdentityConfig::default(),
        }
    }
}

/// File-backed identity provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Allow-list file mapping users and hosts to groups
    pub hosts_file: PathBuf,

    /// Directory holding one private key per user, named after the user
    pub key_dir: PathBuf,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        let config_dir = super::default_config_dir();

        Self {
            hosts_file: config_dir.join("hosts.toml"),
            key_dir: config_dir.join("keys"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
ssh_port = 2222
connect_timeout = 5

[identity]
hosts_file = "/etc/gatewarden/hosts.toml"
"#,
        )
        .unwrap();

        assert_eq!(config.ssh_port, 2222);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.src_port, None);
        assert_eq!(config.term, "xterm-256color");
        assert!(config.record_sessions);
        assert_eq!(
            config.identity.hosts_file,
            PathBuf::from("/etc/gatewarden/hosts.toml")
        );
        assert!(config.identity.key_dir.ends_with("keys"));
    }
}
