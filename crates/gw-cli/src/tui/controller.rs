//! Host browser state machine and event loop
//!
//! The controller owns the terminal surface, the search filter and the
//! popup. Key presses are handled one at a time. Choosing a host pauses the
//! surface and hands the terminal to the orchestrator until the session is
//! over; completion notices arrive on a channel and are applied only once
//! the handoff has returned, so rendering is never re-entered mid-session.

use anyhow::{Context, Result};
use async_trait::async_trait;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use gw_core::{HostEntry, IdentityError, SessionError, SessionInfo, TerminalSize};

use super::popup::PopupState;
use super::search::SearchFilter;
use super::surface::{Surface, View, CHROME_ROWS};

/// Browser states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserState {
    /// Host list visible, search box focused
    Browsing,
    /// Popup shown over the list; input still reaches the list
    PopupVisible,
    /// A session owns the terminal
    HandingOff,
    /// Loop finished; terminal is torn down
    Exiting,
}

/// Follow-up work requested by a key press
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    None,
    Handoff(HostEntry),
    Refresh,
    Exit,
}

/// Completion notice for a session started by the browser
#[derive(Debug, Clone)]
pub struct SessionEnded {
    pub session: SessionInfo,
}

/// What the browser needs from the gateway core
#[async_trait]
pub trait Orchestrator: Send {
    /// Operator the browser is running for
    fn username(&self) -> &str;

    /// Hosts the operator may reach, in display order
    fn allowed_hosts(&self) -> &[HostEntry];

    /// Re-fetch the allow-list from the identity provider
    ///
    /// On failure the previous list is kept.
    async fn refresh_allowed_hosts(&mut self, force: bool) -> Result<(), IdentityError>;

    /// Run a full session against `host`; returns once it is over
    async fn init_connection(&mut self, host: &HostEntry, size: TerminalSize) -> Result<(), SessionError>;
}

/// Interactive host browser
pub struct BrowserController<O, S> {
    orchestrator: O,
    surface: S,
    completions: mpsc::UnboundedReceiver<SessionEnded>,
    shutdown: CancellationToken,
    state: BrowserState,
    filter: SearchFilter,
    popup: PopupState,
    selected: usize,
}

impl<O: Orchestrator, S: Surface> BrowserController<O, S> {
    /// Start in `Browsing` with the full allow-list
    pub fn new(orchestrator: O, surface: S, completions: mpsc::UnboundedReceiver<SessionEnded>) -> Self {
        let filter = SearchFilter::new(orchestrator.allowed_hosts());
        Self {
            orchestrator,
            surface,
            completions,
            shutdown: CancellationToken::new(),
            state: BrowserState::Browsing,
            filter,
            popup: PopupState::default(),
            selected: 0,
        }
    }

    /// Stop the loop when `token` is cancelled
    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn state(&self) -> BrowserState {
        self.state
    }

    pub fn filter(&self) -> &SearchFilter {
        &self.filter
    }

    pub fn popup(&self) -> &PopupState {
        &self.popup
    }

    pub fn selected_host(&self) -> Option<&HostEntry> {
        self.filter.matches().get(self.selected)
    }

    pub fn into_parts(self) -> (O, S) {
        (self.orchestrator, self.surface)
    }

    /// Run until the operator quits or shutdown is requested
    pub async fn run(&mut self) -> Result<()> {
        while self.state != BrowserState::Exiting {
            self.draw()?;

            let event = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Shutdown requested, leaving browser");
                    self.state = BrowserState::Exiting;
                    break;
                }
                event = self.surface.next_event() => event.context("Failed to read terminal input")?,
            };

            let Event::Key(key) = event else {
                continue;
            };
            if key.kind == KeyEventKind::Release {
                continue;
            }

            match self.handle_key(key) {
                Transition::None | Transition::Exit => {}
                Transition::Refresh => self.refresh().await,
                Transition::Handoff(host) => self.hand_off(host).await,
            }
        }
        Ok(())
    }

    /// Apply one key press to the browser state
    pub fn handle_key(&mut self, key: KeyEvent) -> Transition {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        if key.code == KeyCode::F(9) || (ctrl && key.code == KeyCode::Char('c')) {
            return self.quit();
        }
        if matches!(self.state, BrowserState::HandingOff | BrowserState::Exiting) {
            return Transition::None;
        }
        if self.popup.is_open() {
            self.popup.dismiss();
            self.settle();
        }

        match key.code {
            KeyCode::F(5) => return Transition::Refresh,
            KeyCode::Enter => {
                if let Some(host) = self.selected_host().cloned() {
                    self.state = BrowserState::HandingOff;
                    return Transition::Handoff(host);
                }
            }
            KeyCode::Esc => self.edit(|filter, hosts| filter.clear(hosts)),
            KeyCode::Backspace => self.edit(|filter, hosts| filter.pop(hosts)),
            KeyCode::Char(c) if !ctrl && !key.modifiers.contains(KeyModifiers::ALT) => {
                self.edit(|filter, hosts| filter.push(c, hosts))
            }
            KeyCode::Up => self.select(self.selected.saturating_sub(1)),
            KeyCode::Down => self.select(self.selected.saturating_add(1)),
            KeyCode::PageUp => self.select(self.selected.saturating_sub(self.page_size())),
            KeyCode::PageDown => self.select(self.selected.saturating_add(self.page_size())),
            KeyCode::Home => self.select(0),
            KeyCode::End => self.select(usize::MAX),
            _ => {}
        }
        Transition::None
    }

    /// Session completion: take the terminal back, keeping the search
    pub fn on_session_end(&mut self, ended: SessionEnded) {
        tracing::debug!("Session {} completed", ended.session.id);
        if self.state == BrowserState::HandingOff {
            self.settle();
        }
    }

    /// Re-fetch the allow-list and re-run the current search
    ///
    /// The provider may answer from its cache when the allow-list is
    /// unchanged.
    pub async fn refresh(&mut self) {
        tracing::info!("User {} refreshing host list", self.orchestrator.username());
        match self.orchestrator.refresh_allowed_hosts(false).await {
            Ok(()) => {
                self.filter.recompute(self.orchestrator.allowed_hosts());
                self.select(self.selected);
                self.popup.show("Hosts refreshed");
            }
            Err(e) => {
                tracing::warn!("Host refresh failed, keeping previous list: {}", e);
                self.popup.show(format!("Refresh failed: {}", e));
            }
        }
        self.settle();
    }

    async fn hand_off(&mut self, host: HostEntry) {
        tracing::info!("User {} chose {}", self.orchestrator.username(), host);

        if let Err(e) = self.surface.pause() {
            tracing::error!("Failed to release terminal for {}: {}", host, e);
            self.popup.show(format!("Failed to release terminal: {}", e));
            self.settle();
            return;
        }
        let size = self.surface.size();
        let result = self.orchestrator.init_connection(&host, size).await;
        let resumed = self.surface.resume();

        while let Ok(ended) = self.completions.try_recv() {
            self.on_session_end(ended);
        }

        if let Err(e) = result {
            tracing::error!("Session to {} failed: {}", host, e);
            self.popup.show(format!("{}: {}", host.hostname(), e));
        }
        if let Err(e) = resumed {
            tracing::error!("Failed to restore terminal: {}", e);
            self.popup.show(format!("Failed to restore terminal: {}", e));
        }
        if self.state == BrowserState::HandingOff {
            tracing::warn!("Session to {} returned without completion notice", host);
        }
        self.settle();
    }

    fn quit(&mut self) -> Transition {
        tracing::info!("User {} logging out", self.orchestrator.username());
        self.state = BrowserState::Exiting;
        Transition::Exit
    }

    fn edit(&mut self, f: impl FnOnce(&mut SearchFilter, &[HostEntry])) {
        f(&mut self.filter, self.orchestrator.allowed_hosts());
        self.selected = 0;
        self.settle();
    }

    fn select(&mut self, index: usize) {
        let last = self.filter.matches().len().saturating_sub(1);
        self.selected = index.min(last);
    }

    fn page_size(&self) -> usize {
        usize::from(self.surface.size().rows.saturating_sub(CHROME_ROWS).max(1))
    }

    /// Leave transient states for Browsing or PopupVisible
    fn settle(&mut self) {
        if self.state == BrowserState::Exiting {
            return;
        }
        self.state = if self.popup.is_open() {
            BrowserState::PopupVisible
        } else {
            BrowserState::Browsing
        };
    }

    fn draw(&mut self) -> Result<()> {
        let view = View {
            username: self.orchestrator.username(),
            query: self.filter.query(),
            hosts: self.filter.matches(),
            total: self.orchestrator.allowed_hosts().len(),
            selected: self.selected,
            popup: self.popup.message(),
        };
        self.surface.draw(&view).context("Failed to draw browser")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gw_core::SessionId;
    use std::collections::VecDeque;
    use std::io;

    struct FakeOrchestrator {
        hosts: Vec<HostEntry>,
        refreshed: Option<Result<Vec<HostEntry>, ()>>,
        fail_connect: bool,
        connections: Vec<HostEntry>,
        completions: mpsc::UnboundedSender<SessionEnded>,
    }

    #[async_trait]
    impl Orchestrator for FakeOrchestrator {
        fn username(&self) -> &str {
            "alice"
        }

        fn allowed_hosts(&self) -> &[HostEntry] {
            &self.hosts
        }

        async fn refresh_allowed_hosts(&mut self, force: bool) -> Result<(), IdentityError> {
            assert!(!force);
            match self.refreshed.take() {
                Some(Ok(hosts)) => {
                    self.hosts = hosts;
                    Ok(())
                }
                Some(Err(())) | None => Err(IdentityError::UnknownUser("alice".to_string())),
            }
        }

        async fn init_connection(&mut self, host: &HostEntry, size: TerminalSize) -> Result<(), SessionError> {
            assert_eq!(size, TerminalSize::new(30, 100));
            self.connections.push(host.clone());
            let session = SessionInfo {
                id: SessionId::new(),
                host: host.hostname().to_string(),
                port: host.port(),
                username: "alice".to_string(),
                src_port: None,
            };
            let _ = self.completions.send(SessionEnded { session });
            if self.fail_connect {
                Err(SessionError::ConnectionFailed("connection refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct FakeSurface {
        events: VecDeque<Event>,
        draws: usize,
        paused: bool,
        handoffs: usize,
        fail_pause: bool,
    }

    #[async_trait]
    impl Surface for FakeSurface {
        fn draw(&mut self, _view: &View<'_>) -> io::Result<()> {
            assert!(!self.paused, "drawing while the terminal is handed off");
            self.draws += 1;
            Ok(())
        }

        async fn next_event(&mut self) -> io::Result<Event> {
            match self.events.pop_front() {
                Some(event) => Ok(event),
                None => std::future::pending().await,
            }
        }

        fn pause(&mut self) -> io::Result<()> {
            if self.fail_pause {
                return Err(io::Error::other("not a tty"));
            }
            self.paused = true;
            self.handoffs += 1;
            Ok(())
        }

        fn resume(&mut self) -> io::Result<()> {
            self.paused = false;
            Ok(())
        }

        fn size(&self) -> TerminalSize {
            TerminalSize::new(30, 100)
        }
    }

    fn hosts(names: &[&str]) -> Vec<HostEntry> {
        HostEntry::from_hostnames(names.iter().copied(), 22)
    }

    fn controller_with(
        orchestrator: impl FnOnce(&mut FakeOrchestrator),
        events: Vec<Event>,
    ) -> BrowserController<FakeOrchestrator, FakeSurface> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut fake = FakeOrchestrator {
            hosts: hosts(&["db1.internal", "db2.internal", "web1.internal"]),
            refreshed: None,
            fail_connect: false,
            connections: Vec::new(),
            completions: tx,
        };
        orchestrator(&mut fake);
        let surface = FakeSurface {
            events: events.into(),
            ..Default::default()
        };
        BrowserController::new(fake, surface, rx)
    }

    fn controller() -> BrowserController<FakeOrchestrator, FakeSurface> {
        controller_with(|_| {}, Vec::new())
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(c: &mut BrowserController<FakeOrchestrator, FakeSurface>, text: &str) {
        for ch in text.chars() {
            assert_eq!(c.handle_key(key(KeyCode::Char(ch))), Transition::None);
        }
    }

    fn names(c: &BrowserController<FakeOrchestrator, FakeSurface>) -> Vec<String> {
        c.filter().matches().iter().map(|h| h.hostname().to_string()).collect()
    }

    fn session_ended(host: &str) -> SessionEnded {
        SessionEnded {
            session: SessionInfo {
                id: SessionId::new(),
                host: host.to_string(),
                port: 22,
                username: "alice".to_string(),
                src_port: None,
            },
        }
    }

    #[test]
    fn test_starts_browsing_full_list() {
        let c = controller();
        assert_eq!(c.state(), BrowserState::Browsing);
        assert_eq!(names(&c), ["db1.internal", "db2.internal", "web1.internal"]);
        assert_eq!(c.selected_host().unwrap().hostname(), "db1.internal");
    }

    #[test]
    fn test_select_handoff_and_completion_keeps_search() {
        let mut c = controller();
        type_text(&mut c, "db");
        assert_eq!(names(&c), ["db1.internal", "db2.internal"]);

        let transition = c.handle_key(key(KeyCode::Enter));
        assert_eq!(transition, Transition::Handoff(HostEntry::new("db1.internal", 22)));
        assert_eq!(c.state(), BrowserState::HandingOff);

        c.on_session_end(session_ended("db1.internal"));
        assert_eq!(c.state(), BrowserState::Browsing);
        assert_eq!(c.filter().query(), "db");
        assert_eq!(names(&c), ["db1.internal", "db2.internal"]);
    }

    #[test]
    fn test_quit_from_any_state() {
        let mut browsing = controller();
        assert_eq!(browsing.handle_key(key(KeyCode::F(9))), Transition::Exit);
        assert_eq!(browsing.state(), BrowserState::Exiting);

        let mut searching = controller();
        type_text(&mut searching, "web");
        searching.handle_key(key(KeyCode::F(9)));
        assert_eq!(searching.state(), BrowserState::Exiting);

        let mut popup = controller();
        popup.popup.show("Hosts refreshed");
        popup.settle();
        assert_eq!(popup.state(), BrowserState::PopupVisible);
        popup.handle_key(key(KeyCode::F(9)));
        assert_eq!(popup.state(), BrowserState::Exiting);

        let mut handing_off = controller();
        handing_off.handle_key(key(KeyCode::Enter));
        handing_off.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert_eq!(handing_off.state(), BrowserState::Exiting);
    }

    #[test]
    fn test_escape_clears_query() {
        let mut c = controller();
        type_text(&mut c, "web");
        assert_eq!(names(&c), ["web1.internal"]);

        c.handle_key(key(KeyCode::Esc));
        assert_eq!(c.filter().query(), "");
        assert_eq!(names(&c).len(), 3);
        assert_eq!(c.state(), BrowserState::Browsing);
    }

    #[test]
    fn test_backspace_edits_query() {
        let mut c = controller();
        type_text(&mut c, "db2x");
        assert!(names(&c).is_empty());
        c.handle_key(key(KeyCode::Backspace));
        assert_eq!(names(&c), ["db2.internal"]);
    }

    #[test]
    fn test_enter_with_no_match_does_nothing() {
        let mut c = controller();
        type_text(&mut c, "nope");
        assert_eq!(c.handle_key(key(KeyCode::Enter)), Transition::None);
        assert_eq!(c.state(), BrowserState::Browsing);
    }

    #[test]
    fn test_navigation_is_clamped() {
        let mut c = controller();
        c.handle_key(key(KeyCode::Up));
        assert_eq!(c.selected_host().unwrap().hostname(), "db1.internal");
        c.handle_key(key(KeyCode::Down));
        assert_eq!(c.selected_host().unwrap().hostname(), "db2.internal");
        c.handle_key(key(KeyCode::PageDown));
        assert_eq!(c.selected_host().unwrap().hostname(), "web1.internal");
        c.handle_key(key(KeyCode::Home));
        assert_eq!(c.selected_host().unwrap().hostname(), "db1.internal");
        c.handle_key(key(KeyCode::End));
        assert_eq!(c.selected_host().unwrap().hostname(), "web1.internal");
        c.handle_key(key(KeyCode::PageUp));
        assert_eq!(c.selected_host().unwrap().hostname(), "db1.internal");
    }

    #[tokio::test]
    async fn test_refresh_reapplies_query_and_shows_popup() {
        let mut c = controller_with(
            |o| o.refreshed = Some(Ok(hosts(&["db1.internal", "db7.internal", "web1.internal"]))),
            Vec::new(),
        );
        type_text(&mut c, "db");
        assert_eq!(c.handle_key(key(KeyCode::F(5))), Transition::Refresh);

        c.refresh().await;
        assert_eq!(c.state(), BrowserState::PopupVisible);
        assert_eq!(c.popup().message(), Some("Hosts refreshed"));
        assert_eq!(names(&c), ["db1.internal", "db7.internal"]);

        // next key dismisses the popup and still edits the search
        c.handle_key(key(KeyCode::Char('7')));
        assert!(!c.popup().is_open());
        assert_eq!(c.state(), BrowserState::Browsing);
        assert_eq!(names(&c), ["db7.internal"]);
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_stale_list() {
        let mut c = controller_with(|o| o.refreshed = Some(Err(())), Vec::new());
        c.refresh().await;

        assert_eq!(c.state(), BrowserState::PopupVisible);
        assert!(c.popup().message().unwrap().starts_with("Refresh failed"));
        assert_eq!(names(&c).len(), 3);
    }

    #[tokio::test]
    async fn test_run_hands_off_and_resumes() {
        let events = vec![
            Event::Key(key(KeyCode::Char('d'))),
            Event::Key(key(KeyCode::Char('b'))),
            Event::Key(key(KeyCode::Down)),
            Event::Key(key(KeyCode::Enter)),
            Event::Key(key(KeyCode::F(9))),
        ];
        let mut c = controller_with(|_| {}, events);
        c.run().await.unwrap();

        assert_eq!(c.state(), BrowserState::Exiting);
        assert_eq!(c.filter().query(), "db");
        let (orchestrator, surface) = c.into_parts();
        assert_eq!(orchestrator.connections, vec![HostEntry::new("db2.internal", 22)]);
        assert_eq!(surface.handoffs, 1);
        assert!(!surface.paused);
    }

    #[tokio::test]
    async fn test_failed_session_is_reported_in_popup() {
        let events = vec![Event::Key(key(KeyCode::Enter)), Event::Key(key(KeyCode::F(9)))];
        let mut c = controller_with(|o| o.fail_connect = true, events);
        c.run().await.unwrap();

        assert_eq!(c.state(), BrowserState::Exiting);
        let message = c.popup().message().unwrap();
        assert_eq!(message, "db1.internal: Connection failed: connection refused");
    }

    #[tokio::test]
    async fn test_terminal_release_failure_keeps_browsing() {
        let events = vec![
            Event::Key(key(KeyCode::Enter)),
            Event::Key(key(KeyCode::Char('w'))),
            Event::Key(key(KeyCode::F(9))),
        ];
        let mut c = controller_with(|_| {}, events);
        c.surface.fail_pause = true;

        // Enter fails to hand off; 'w' dismisses the popup and keeps searching
        c.run().await.unwrap();
        assert_eq!(c.state(), BrowserState::Exiting);
        assert_eq!(c.filter().query(), "w");
        let (orchestrator, surface) = c.into_parts();
        assert!(orchestrator.connections.is_empty());
        assert_eq!(surface.handoffs, 0);
    }

    #[tokio::test]
    async fn test_terminal_release_failure_is_shown() {
        let mut c = controller();
        c.surface.fail_pause = true;

        c.hand_off(HostEntry::new("db1.internal", 22)).await;
        assert_eq!(c.state(), BrowserState::PopupVisible);
        assert_eq!(
            c.popup().message(),
            Some("Failed to release terminal: not a tty")
        );
    }

    #[tokio::test]
    async fn test_shutdown_token_stops_loop() {
        let token = CancellationToken::new();
        token.cancel();
        let mut c = controller().with_shutdown_token(token);
        c.run().await.unwrap();
        assert_eq!(c.state(), BrowserState::Exiting);
    }
}
