//! Gateway orchestration
//!
//! Ties the operator's identity, the allow-list and the configuration to
//! the browser: it builds an [`InteractiveSession`] for a chosen host,
//! drives it through connect, recording and authentication, and reports
//! completion back to the browser.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use gw_core::config::GatewayConfig;
use gw_core::traits::{IdentityProvider, SessionContext};
use gw_core::{CredentialError, HostEntry, IdentityError, SessionError, SessionInfo, TerminalSize};
use gw_session::{
    InteractiveSession, KillHandle, KillSignal, SessionEnd, SessionRecorder, SshOptions,
    SshTransport, TerminalPrompt, Transport,
};

use crate::output::print_info;
use crate::tui::{Orchestrator, SessionEnded};

/// Kill handle of the session currently holding the terminal
#[derive(Debug, Clone, Default)]
pub struct ActiveSession(Arc<Mutex<Option<KillHandle>>>);

impl ActiveSession {
    fn set(&self, handle: KillHandle) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// Post `signal` to the active session; false when there is none
    pub fn kill(&self, signal: KillSignal) -> bool {
        match self.0.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            Some(handle) => {
                handle.kill(signal);
                true
            }
            None => false,
        }
    }
}

/// Per-session view of the gateway handed to [`InteractiveSession`]
struct GatewayContext {
    username: String,
    src_port: Option<u16>,
    provider: Arc<dyn IdentityProvider>,
    completions: mpsc::UnboundedSender<SessionEnded>,
}

impl SessionContext for GatewayContext {
    fn username(&self) -> &str {
        &self.username
    }

    fn src_port(&self) -> Option<u16> {
        self.src_port
    }

    fn get_priv_key(&self) -> Result<String, CredentialError> {
        self.provider.private_key(&self.username)
    }

    fn session_end_callback(&self, session: &SessionInfo) {
        tracing::info!("Session {} ended", session);
        if self
            .completions
            .send(SessionEnded {
                session: session.clone(),
            })
            .is_err()
        {
            tracing::debug!("Browser gone, completion of {} dropped", session.id);
        }
    }
}

/// Operator-facing gateway core
pub struct Gateway {
    config: GatewayConfig,
    username: String,
    provider: Arc<dyn IdentityProvider>,
    hosts: Vec<HostEntry>,
    completions: mpsc::UnboundedSender<SessionEnded>,
    active: ActiveSession,
}

impl Gateway {
    /// Load the operator's allow-list and set up the completion channel
    pub async fn new(
        config: GatewayConfig,
        username: impl Into<String>,
        provider: Arc<dyn IdentityProvider>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEnded>), IdentityError> {
        let username = username.into();
        let hosts = provider.allowed_hosts(&username, false).await?;
        tracing::info!("User {} may reach {} host(s)", username, hosts.len());

        let (tx, rx) = mpsc::unbounded_channel();
        let gateway = Self {
            config,
            username,
            provider,
            hosts,
            completions: tx,
            active: ActiveSession::default(),
        };
        Ok((gateway, rx))
    }

    /// Shared handle for posting kills to whichever session is running
    pub fn active_session(&self) -> ActiveSession {
        self.active.clone()
    }

    fn context(&self) -> Arc<GatewayContext> {
        Arc::new(GatewayContext {
            username: self.username.clone(),
            src_port: self.config.src_port,
            provider: Arc::clone(&self.provider),
            completions: self.completions.clone(),
        })
    }
}

/// Audit recorder for one session, as configured
fn recorder(config: &GatewayConfig) -> SessionRecorder {
    SessionRecorder::new(&config.session_log_dir).with_input(config.record_input)
}

async fn drive<T: Transport>(
    session: &mut InteractiveSession<T>,
    size: TerminalSize,
    config: &GatewayConfig,
) -> Result<SessionEnd, SessionError> {
    session.connect(size).await?;
    if config.record_sessions {
        session.attach_sniffer(Box::new(recorder(config)))?;
    }
    session.start_session().await
}

#[async_trait]
impl Orchestrator for Gateway {
    fn username(&self) -> &str {
        &self.username
    }

    fn allowed_hosts(&self) -> &[HostEntry] {
        &self.hosts
    }

    async fn refresh_allowed_hosts(&mut self, force: bool) -> Result<(), IdentityError> {
        let hosts = self.provider.allowed_hosts(&self.username, force).await?;
        tracing::debug!("Allow-list for {}: {} host(s)", self.username, hosts.len());
        self.hosts = hosts;
        Ok(())
    }

    async fn init_connection(&mut self, host: &HostEntry, size: TerminalSize) -> Result<(), SessionError> {
        let transport = SshTransport::new(SshOptions::from_config(&self.config));
        let mut session =
            InteractiveSession::new(self.context(), host, transport, Box::new(TerminalPrompt));
        tracing::info!("Session {} starting", session.info());
        print_info(&format!("Connecting to {} as {}...", host, self.username));

        self.active.set(session.kill_handle());
        let result = drive(&mut session, size, &self.config).await;
        self.active.clear();

        if session.is_connected() {
            if let Err(e) = session.stop_sniffer() {
                tracing::warn!("Stopping recorder for {} failed: {}", session.id(), e);
            }
        }
        session.disconnect().await;
        session.close_session();

        match result {
            Ok(end) => {
                tracing::debug!("Session {} finished: {:?}", session.id(), end);
                Ok(())
            }
            Err(SessionError::Killed(signal)) => {
                tracing::info!("Session {} killed by {} before it started", session.id(), signal);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Forward SIGHUP/SIGTERM to the active session
///
/// With no session running the browser itself is shut down through
/// `shutdown`.
#[cfg(unix)]
pub fn spawn_signal_watcher(
    active: ActiveSession,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let (mut hangup, mut terminate) =
            match (signal(SignalKind::hangup()), signal(SignalKind::terminate())) {
                (Ok(h), Ok(t)) => (h, t),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::warn!("Signal watcher unavailable: {}", e);
                    return;
                }
            };

        loop {
            let name = tokio::select! {
                Some(()) = hangup.recv() => "SIGHUP",
                Some(()) = terminate.recv() => "SIGTERM",
                _ = shutdown.cancelled() => break,
                else => break,
            };

            if active.kill(KillSignal::new(name)) {
                tracing::info!("{} received, killing active session", name);
            } else {
                tracing::info!("{} received with no active session, shutting down", name);
                shutdown.cancel();
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gw_core::identity::FileIdentityProvider;
    use gw_core::traits::{Direction, Sniffer};
    use gw_core::SessionId;

    const ALLOW_LIST: &str = r#"
[[hosts]]
name = "db1.internal"
groups = ["dba"]

[[hosts]]
name = "web1.internal"
port = 2222
groups = ["web"]

[users.alice]
groups = ["dba", "web"]
"#;

    fn provider(dir: &std::path::Path) -> Arc<dyn IdentityProvider> {
        let hosts_file = dir.join("hosts.toml");
        std::fs::write(&hosts_file, ALLOW_LIST).unwrap();
        Arc::new(FileIdentityProvider::new(hosts_file, dir.join("keys"), 22))
    }

    #[tokio::test]
    async fn test_new_loads_allow_list() {
        let dir = tempfile::tempdir().unwrap();
        let (gateway, _rx) = Gateway::new(GatewayConfig::default(), "alice", provider(dir.path()))
            .await
            .unwrap();

        assert_eq!(gateway.username(), "alice");
        assert_eq!(
            gateway.allowed_hosts(),
            [HostEntry::new("db1.internal", 22), HostEntry::new("web1.internal", 2222)]
        );
    }

    #[tokio::test]
    async fn test_unknown_user_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Gateway::new(GatewayConfig::default(), "mallory", provider(dir.path())).await;
        assert!(matches!(result, Err(IdentityError::UnknownUser(_))));
    }

    #[tokio::test]
    async fn test_refresh_picks_up_changes() {
        let dir = tempfile::tempdir().unwrap();
        let (mut gateway, _rx) = Gateway::new(GatewayConfig::default(), "alice", provider(dir.path()))
            .await
            .unwrap();

        std::fs::write(
            dir.path().join("hosts.toml"),
            "[[hosts]]\nname = \"db2.internal\"\ngroups = [\"dba\"]\n\n[users.alice]\ngroups = [\"dba\"]\n",
        )
        .unwrap();
        gateway.refresh_allowed_hosts(true).await.unwrap();
        assert_eq!(gateway.allowed_hosts(), [HostEntry::new("db2.internal", 22)]);
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_hosts() {
        let dir = tempfile::tempdir().unwrap();
        let (mut gateway, _rx) = Gateway::new(GatewayConfig::default(), "alice", provider(dir.path()))
            .await
            .unwrap();

        std::fs::write(dir.path().join("hosts.toml"), "not [valid").unwrap();
        assert!(gateway.refresh_allowed_hosts(true).await.is_err());
        assert_eq!(gateway.allowed_hosts().len(), 2);
    }

    #[tokio::test]
    async fn test_context_reports_completion_and_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let config = GatewayConfig {
            src_port: Some(40022),
            ..Default::default()
        };
        let (gateway, mut rx) = Gateway::new(config, "alice", provider(dir.path()))
            .await
            .unwrap();
        let ctx = gateway.context();

        assert_eq!(ctx.username(), "alice");
        assert_eq!(ctx.src_port(), Some(40022));
        assert!(matches!(ctx.get_priv_key(), Err(CredentialError::NoPrivateKey(_))));

        let info = SessionInfo {
            id: SessionId::new(),
            host: "db1.internal".to_string(),
            port: 22,
            username: "alice".to_string(),
            src_port: Some(40022),
        };
        ctx.session_end_callback(&info);
        assert_eq!(rx.try_recv().unwrap().session.id, info.id);
    }

    #[test]
    fn test_recorder_captures_operator_input_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = GatewayConfig {
            session_log_dir: dir.path().join("sessions"),
            ..Default::default()
        };
        let info = SessionInfo {
            id: SessionId::new(),
            host: "db1.internal".to_string(),
            port: 22,
            username: "alice".to_string(),
            src_port: None,
        };

        let mut rec = recorder(&config);
        rec.start(&info).unwrap();
        rec.capture(Direction::Input, b"sudo -l\r").unwrap();
        rec.capture(Direction::Output, b"may run: ALL\r\n").unwrap();
        rec.stop().unwrap();

        let content = std::fs::read_to_string(rec.path().unwrap()).unwrap();
        assert!(content.contains("sudo -l\r"));
        assert!(content.contains("may run: ALL"));
    }

    #[test]
    fn test_recorder_can_skip_input() {
        let dir = tempfile::tempdir().unwrap();
        let config = GatewayConfig {
            session_log_dir: dir.path().to_path_buf(),
            record_input: false,
            ..Default::default()
        };
        let info = SessionInfo {
            id: SessionId::new(),
            host: "db1.internal".to_string(),
            port: 22,
            username: "alice".to_string(),
            src_port: None,
        };

        let mut rec = recorder(&config);
        rec.start(&info).unwrap();
        rec.capture(Direction::Input, b"hunter2\r").unwrap();
        rec.stop().unwrap();

        let content = std::fs::read_to_string(rec.path().unwrap()).unwrap();
        assert!(!content.contains("hunter2"));
    }

    #[test]
    fn test_active_session_kill() {
        let active = ActiveSession::default();
        assert!(!active.kill(KillSignal::new("SIGTERM")));

        let handle = KillHandle::new();
        active.set(handle.clone());
        assert!(active.kill(KillSignal::new("SIGHUP")));
        assert!(handle.is_killed());

        active.clear();
        assert!(!active.kill(KillSignal::new("SIGHUP")));
    }
}
