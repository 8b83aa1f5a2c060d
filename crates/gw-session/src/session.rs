//! Interactive session lifecycle
//!
//! # Authentication
//!
//! [`InteractiveSession::start_session`] asks the owning context for the
//! user's private key. When none is provisioned, or the transport reports
//! the key as unusable, it falls back to a password typed at the terminal;
//! the operator is asked at most once. Any other credential failure is
//! returned untouched. The credential is then handed to the transport,
//! which runs the session until it closes or is killed.
//!
//! A kill posted while connecting or prompting ends the session at that
//! point instead of carrying on to authentication.
//!
//! # Completion
//!
//! The owning context's `session_end_callback` fires exactly once per
//! session, from whichever of normal close, kill, or explicit
//! [`close_session`](InteractiveSession::close_session) gets there first.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use gw_core::traits::{SessionContext, Sniffer};
use gw_core::{CredentialError, HostEntry, SessionError, SessionId, SessionInfo, TerminalSize};

use crate::credential::Credential;
use crate::kill::{KillHandle, KillSignal};
use crate::prompt::PasswordPrompt;
use crate::transport::{SessionEnd, Transport};

const PASSWORD_PROMPT: &str = "Password: ";

/// One operator session against one target host
pub struct InteractiveSession<T: Transport> {
    ctx: Arc<dyn SessionContext>,
    info: SessionInfo,
    transport: T,
    prompt: Box<dyn PasswordPrompt>,
    kill: KillHandle,
    closed: AtomicBool,
}

impl<T: Transport> InteractiveSession<T> {
    /// Create a session for `host`, acting as the context's user
    pub fn new(
        ctx: Arc<dyn SessionContext>,
        host: &HostEntry,
        transport: T,
        prompt: Box<dyn PasswordPrompt>,
    ) -> Self {
        let info = SessionInfo {
            id: SessionId::new(),
            host: host.hostname().to_string(),
            port: host.port(),
            username: ctx.username().to_string(),
            src_port: ctx.src_port(),
        };
        tracing::debug!("Session {} created ({:?} transport)", info.id, transport.kind());

        Self {
            ctx,
            info,
            transport,
            prompt,
            kill: KillHandle::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn id(&self) -> SessionId {
        self.info.id
    }

    /// Handle the hosting environment uses to kill this session
    pub fn kill_handle(&self) -> KillHandle {
        self.kill.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Start `sniffer` and let the transport feed it
    pub fn attach_sniffer(&mut self, mut sniffer: Box<dyn Sniffer>) -> Result<(), SessionError> {
        if !self.transport.is_connected() {
            return Err(SessionError::NotConnected);
        }
        sniffer.start(&self.info).map_err(SessionError::Sniffer)?;
        self.transport.attach_sniffer(sniffer)
    }

    pub fn stop_sniffer(&mut self) -> Result<(), SessionError> {
        if !self.transport.is_connected() {
            return Err(SessionError::NotConnected);
        }
        self.transport.stop_sniffer()
    }

    /// Open the connection to the target with the given geometry
    ///
    /// A kill posted before the connection is up abandons it and ends the
    /// session with `SessionError::Killed`.
    pub async fn connect(&mut self, size: TerminalSize) -> Result<(), SessionError> {
        tracing::debug!(
            "Session {} connecting to {}:{} ({}x{})",
            self.info.id,
            self.info.host,
            self.info.port,
            size.cols,
            size.rows
        );
        let connect = self
            .transport
            .connect(&self.info.host, self.info.port, self.info.src_port, size);
        match or_killed(&self.kill, connect).await {
            Ok(result) => result,
            Err(signal) => {
                self.kill_session(signal.clone());
                Err(SessionError::Killed(signal.name))
            }
        }
    }

    /// Authenticate and run the session until it ends
    ///
    /// An unusable private key falls back to a single password prompt. On
    /// return the completion callback has fired.
    pub async fn start_session(&mut self) -> Result<SessionEnd, SessionError> {
        let credential = match or_killed(
            &self.kill,
            obtain_credential(self.ctx.as_ref(), self.prompt.as_mut()),
        )
        .await
        {
            Ok(credential) => credential?,
            Err(signal) => return Ok(self.finish(SessionEnd::Killed(signal))),
        };

        let had_key = matches!(credential, Credential::PrivateKey(_));
        let end = match self.run_transport(credential).await {
            Err(SessionError::NoCredential) if had_key => {
                tracing::warn!(
                    "Private key for {} is unusable, prompting for password",
                    self.info.username
                );
                match or_killed(&self.kill, read_password(self.prompt.as_mut())).await {
                    Ok(password) => self.run_transport(password?).await?,
                    Err(signal) => SessionEnd::Killed(signal),
                }
            }
            other => other?,
        };
        Ok(self.finish(end))
    }

    async fn run_transport(&mut self, credential: Credential) -> Result<SessionEnd, SessionError> {
        if self.kill.is_killed() {
            return Ok(SessionEnd::Killed(self.kill.killed().await));
        }
        tracing::debug!(
            "Session {} authenticating {} via {}",
            self.info.id,
            self.info.username,
            credential.method()
        );
        self.transport
            .start_session(&self.info.username, credential, &self.kill)
            .await
    }

    fn finish(&self, end: SessionEnd) -> SessionEnd {
        match &end {
            SessionEnd::Closed { exit_status } => {
                tracing::debug!("Session {} closed (exit status {:?})", self.info.id, exit_status);
                self.close_session();
            }
            SessionEnd::Killed(signal) => self.kill_session(signal.clone()),
        }
        end
    }

    /// Report completion to the owning context (at most once)
    pub fn close_session(&self) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Session {} already closed", self.info.id);
            return;
        }
        tracing::debug!("Session {} ended", self.info.id);
        self.ctx.session_end_callback(&self.info);
    }

    /// Out-of-band termination; routes into [`close_session`](Self::close_session)
    pub fn kill_session(&self, signal: KillSignal) {
        tracing::info!("Session {} killed by {}", self.info.id, signal);
        self.close_session();
    }

    /// Drop the transport connection
    pub async fn disconnect(&mut self) {
        self.transport.disconnect().await;
    }
}

/// Run `fut` unless a kill is (or gets) posted first
async fn or_killed<F: Future>(kill: &KillHandle, fut: F) -> Result<F::Output, KillSignal> {
    tokio::select! {
        biased;
        signal = kill.killed() => Err(signal),
        output = fut => Ok(output),
    }
}

async fn obtain_credential(
    ctx: &dyn SessionContext,
    prompt: &mut dyn PasswordPrompt,
) -> Result<Credential, SessionError> {
    match ctx.get_priv_key() {
        Ok(key) => Ok(Credential::PrivateKey(key)),
        Err(CredentialError::NoPrivateKey(user)) => {
            tracing::debug!("No private key for {}, prompting for password", user);
            read_password(prompt).await
        }
        Err(e) => Err(e.into()),
    }
}

async fn read_password(prompt: &mut dyn PasswordPrompt) -> Result<Credential, SessionError> {
    let password = prompt
        .read_password(PASSWORD_PROMPT)
        .await
        .map_err(SessionError::Prompt)?;
    Ok(Credential::Password(password))
}
