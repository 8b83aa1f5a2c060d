//! Interactive SSH transport
//!
//! Opens a TCP connection (optionally from a fixed local port), performs the
//! SSH handshake, authenticates as the operator and then pumps the local
//! terminal to a remote PTY shell until the channel closes or the session is
//! killed.

use std::io::{self, Write};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use crossterm::event::{self, Event, KeyEventKind};
use russh::client::{self, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio::sync::mpsc;

use gw_core::config::GatewayConfig;
use gw_core::traits::{Direction, Sniffer};
use gw_core::{SessionError, TerminalSize};

use super::handler::{ClientHandler, Rejection};
use super::keys::key_to_bytes;
use crate::credential::Credential;
use crate::kill::KillHandle;
use crate::terminal::{RawModeGuard, StopOnDrop, TERMINAL_POLL_INTERVAL};
use crate::transport::{SessionEnd, Transport, TransportKind};

/// Terminal events buffered between the blocking reader and the pump
const TERMINAL_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Settings for outbound SSH connections
#[derive(Debug, Clone)]
pub struct SshOptions {
    /// Limit for TCP connect and SSH handshake, each
    pub connect_timeout: Duration,
    /// Refuse hosts missing from known_hosts
    pub strict_host_key_checking: bool,
    /// TERM requested for the remote PTY
    pub term: String,
}

impl SshOptions {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            strict_host_key_checking: config.strict_host_key_checking,
            term: config.term.clone(),
        }
    }
}

impl Default for SshOptions {
    fn default() -> Self {
        Self::from_config(&GatewayConfig::default())
    }
}

/// [`Transport`] that runs an interactive shell over SSH
pub struct SshTransport {
    options: SshOptions,
    handle: Option<Handle<ClientHandler>>,
    rejection: Rejection,
    size: TerminalSize,
    sniffer: Option<Box<dyn Sniffer>>,
}

impl SshTransport {
    pub fn new(options: SshOptions) -> Self {
        Self {
            options,
            handle: None,
            rejection: Arc::new(Mutex::new(None)),
            size: TerminalSize::default(),
            sniffer: None,
        }
    }

    async fn open_stream(
        options: &SshOptions,
        host: &str,
        port: u16,
        src_port: Option<u16>,
    ) -> Result<TcpStream, SessionError> {
        let addrs = lookup_host((host, port))
            .await
            .map_err(|e| SessionError::ConnectionFailed(format!("{}: {}", host, e)))?;

        let mut last_error = None;
        for addr in addrs {
            match tokio::time::timeout(
                options.connect_timeout,
                connect_from(addr, src_port),
            )
            .await
            {
                Ok(Ok(stream)) => return Ok(stream),
                Ok(Err(e)) => {
                    tracing::debug!("Connect to {} failed: {}", addr, e);
                    last_error = Some(e.to_string());
                }
                Err(_) => {
                    tracing::debug!("Connect to {} timed out", addr);
                    last_error = Some(format!(
                        "timed out after {}s",
                        options.connect_timeout.as_secs()
                    ));
                }
            }
        }

        Err(SessionError::ConnectionFailed(format!(
            "{}:{}: {}",
            host,
            port,
            last_error.unwrap_or_else(|| "no addresses resolved".to_string())
        )))
    }
}

impl Default for SshTransport {
    fn default() -> Self {
        Self::new(SshOptions::default())
    }
}

async fn connect_from(addr: SocketAddr, src_port: Option<u16>) -> io::Result<TcpStream> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };

    if let Some(port) = src_port {
        let local: SocketAddr = if addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, port).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, port).into()
        };
        socket.set_reuseaddr(true)?;
        socket.bind(local)?;
    }

    let stream = socket.connect(addr).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Prefer a recorded host key rejection over the generic russh error
fn handshake_error(rejection: &Rejection, context: &str, err: impl std::fmt::Display) -> SessionError {
    match rejection.lock().unwrap_or_else(PoisonError::into_inner).take() {
        Some(message) => SessionError::HostKeyRejected(message),
        None => SessionError::ConnectionFailed(format!("{}: {}", context, err)),
    }
}

#[async_trait]
impl Transport for SshTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Ssh
    }

    fn is_connected(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_closed())
    }

    async fn connect(
        &mut self,
        host: &str,
        port: u16,
        src_port: Option<u16>,
        size: TerminalSize,
    ) -> Result<(), SessionError> {
        if self.handle.is_some() {
            self.disconnect().await;
        }

        let stream = Self::open_stream(&self.options, host, port, src_port).await?;
        tracing::debug!(
            "TCP connected to {}:{} from {:?}",
            host,
            port,
            stream.local_addr().ok()
        );

        let handler = ClientHandler::new(
            host,
            port,
            self.options.strict_host_key_checking,
            Arc::clone(&self.rejection),
        );
        let config = Arc::new(client::Config::default());

        let handle = tokio::time::timeout(
            self.options.connect_timeout,
            client::connect_stream(config, stream, handler),
        )
        .await
        .map_err(|_| SessionError::ConnectionFailed(format!("SSH handshake with {} timed out", host)))?
        .map_err(|e| handshake_error(&self.rejection, host, e))?;

        self.handle = Some(handle);
        self.size = size;
        Ok(())
    }

    async fn start_session(
        &mut self,
        username: &str,
        credential: Credential,
        kill: &KillHandle,
    ) -> Result<SessionEnd, SessionError> {
        let rejection = Arc::clone(&self.rejection);
        let handle = self.handle.as_mut().ok_or(SessionError::NotConnected)?;
        let term = self.options.term.as_str();
        let size = self.size;

        let setup = async move {
            let method = credential.method();
            let authenticated = match credential {
                Credential::PrivateKey(pem) => {
                    let key = russh_keys::decode_secret_key(&pem, None).map_err(|e| {
                        tracing::warn!("Private key for {} could not be decoded: {}", username, e);
                        SessionError::NoCredential
                    })?;
                    handle.authenticate_publickey(username, Arc::new(key)).await
                }
                Credential::Password(password) => {
                    handle.authenticate_password(username, password).await
                }
            }
            .map_err(|e| handshake_error(&rejection, "authentication", e))?;

            if !authenticated {
                return Err(SessionError::AuthenticationFailed(format!(
                    "{} rejected for {}",
                    method, username
                )));
            }
            tracing::info!("Authenticated {} via {}", username, method);

            let mut channel = handle
                .channel_open_session()
                .await
                .map_err(|e| SessionError::ConnectionFailed(format!("open channel: {}", e)))?;
            channel
                .request_pty(
                    false,
                    term,
                    u32::from(size.cols),
                    u32::from(size.rows),
                    0,
                    0,
                    &[],
                )
                .await
                .map_err(|e| SessionError::ConnectionFailed(format!("request pty: {}", e)))?;
            channel
                .request_shell(true)
                .await
                .map_err(|e| SessionError::ConnectionFailed(format!("request shell: {}", e)))?;
            Ok::<_, SessionError>(channel)
        };

        // a kill during authentication or channel setup ends the session there
        let mut channel = tokio::select! {
            biased;
            signal = kill.killed() => return Ok(SessionEnd::Killed(signal)),
            channel = setup => channel?,
        };

        let end = pump(&mut channel, &mut self.sniffer, kill).await?;
        if let SessionEnd::Killed(_) = end {
            let _ = channel.close().await;
        }
        Ok(end)
    }

    fn attach_sniffer(&mut self, sniffer: Box<dyn Sniffer>) -> Result<(), SessionError> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        self.sniffer = Some(sniffer);
        Ok(())
    }

    fn stop_sniffer(&mut self) -> Result<(), SessionError> {
        match self.sniffer.take() {
            Some(mut sniffer) => sniffer.stop().map_err(SessionError::Sniffer),
            None => Ok(()),
        }
    }

    async fn disconnect(&mut self) {
        self.sniffer = None;
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle
                .disconnect(Disconnect::ByApplication, "session ended", "en")
                .await
            {
                tracing::debug!("Disconnect: {}", e);
            }
        }
    }
}

fn read_terminal(tx: mpsc::Sender<Event>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::Relaxed) {
        match event::poll(TERMINAL_POLL_INTERVAL) {
            Ok(true) => match event::read() {
                Ok(evt) => {
                    if tx.blocking_send(evt).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("Terminal read failed: {}", e);
                    break;
                }
            },
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("Terminal poll failed: {}", e);
                break;
            }
        }
    }
}

fn capture(sniffer: &mut Option<Box<dyn Sniffer>>, direction: Direction, data: &[u8]) {
    if let Some(s) = sniffer.as_mut() {
        if let Err(e) = s.capture(direction, data) {
            tracing::warn!("Sniffer capture failed: {}", e);
        }
    }
}

/// Shuttle bytes between the local terminal and the remote channel
async fn pump(
    channel: &mut Channel<Msg>,
    sniffer: &mut Option<Box<dyn Sniffer>>,
    kill: &KillHandle,
) -> Result<SessionEnd, SessionError> {
    let _raw = RawModeGuard::enable().map_err(SessionError::Terminal)?;
    let mut stdout = io::stdout();

    let (event_tx, mut event_rx) = mpsc::channel::<Event>(TERMINAL_EVENT_CHANNEL_CAPACITY);
    let stop = StopOnDrop::new();
    let reader = tokio::task::spawn_blocking({
        let flag = stop.flag();
        move || read_terminal(event_tx, flag)
    });

    let mut exit_status = None;
    let result = loop {
        tokio::select! {
            signal = kill.killed() => break Ok(SessionEnd::Killed(signal)),

            msg = channel.wait() => match msg {
                Some(ChannelMsg::Data { data }) | Some(ChannelMsg::ExtendedData { data, .. }) => {
                    if let Err(e) = stdout.write_all(&data).and_then(|_| stdout.flush()) {
                        break Err(SessionError::Terminal(e));
                    }
                    capture(sniffer, Direction::Output, &data);
                }
                Some(ChannelMsg::ExitStatus { exit_status: status }) => exit_status = Some(status),
                Some(ChannelMsg::Close) | None => break Ok(SessionEnd::Closed { exit_status }),
                Some(_) => {}
            },

            Some(evt) = event_rx.recv() => {
                let input = match evt {
                    Event::Key(key) if key.kind != KeyEventKind::Release => {
                        key_to_bytes(key.code, key.modifiers)
                    }
                    Event::Paste(text) => text.into_bytes(),
                    Event::Resize(cols, rows) => {
                        if let Err(e) = channel.window_change(u32::from(cols), u32::from(rows), 0, 0).await {
                            tracing::debug!("Window change failed: {}", e);
                        }
                        continue;
                    }
                    _ => continue,
                };
                if input.is_empty() {
                    continue;
                }
                capture(sniffer, Direction::Input, &input);
                if let Err(e) = channel.data(&input[..]).await {
                    break Err(SessionError::ConnectionFailed(format!("send: {}", e)));
                }
            }
        }
    };

    drop(stop);
    drop(event_rx);
    if let Err(e) = reader.await {
        tracing::debug!("Terminal reader task failed: {}", e);
    }
    result
}
