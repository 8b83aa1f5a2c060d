//! Full-screen terminal surface for the host browser

use std::io::{self, Stdout};

use async_trait::async_trait;
use crossterm::event::{self, Event};
use crossterm::execute;
use crossterm::terminal::{
    self, disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::{Frame, Terminal};

use gw_core::{HostEntry, TerminalSize};

/// Rows taken by header, search line, separator and footer
pub const CHROME_ROWS: u16 = 4;

const FOOTER: &str =
    "Move: Up,Down,PgUp,PgDn  Select: Enter  Clear: Esc  Refresh: F5  Quit: F9";

/// Everything the browser exposes for one frame
#[derive(Debug, Clone, Copy)]
pub struct View<'a> {
    pub username: &'a str,
    pub query: &'a str,
    pub hosts: &'a [HostEntry],
    pub total: usize,
    pub selected: usize,
    pub popup: Option<&'a str>,
}

/// Render target and input source owned by the browser
#[async_trait]
pub trait Surface: Send {
    fn draw(&mut self, view: &View<'_>) -> io::Result<()>;

    /// Wait for the next terminal event
    async fn next_event(&mut self) -> io::Result<Event>;

    /// Give the terminal back (cooked mode, main screen) for a handoff
    fn pause(&mut self) -> io::Result<()>;

    /// Take the terminal again after a handoff
    fn resume(&mut self) -> io::Result<()>;

    fn size(&self) -> TerminalSize;
}

/// [`Surface`] drawing with ratatui on the alternate screen
pub struct CrosstermSurface {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    list_state: ListState,
    active: bool,
}

impl CrosstermSurface {
    /// Enter raw mode and the alternate screen
    pub fn enter() -> io::Result<Self> {
        let mut surface = Self {
            terminal: Terminal::new(CrosstermBackend::new(io::stdout()))?,
            list_state: ListState::default(),
            active: false,
        };
        surface.acquire()?;
        Ok(surface)
    }

    fn acquire(&mut self) -> io::Result<()> {
        if self.active {
            return Ok(());
        }
        enable_raw_mode()?;
        execute!(self.terminal.backend_mut(), EnterAlternateScreen)?;
        self.terminal.hide_cursor()?;
        // the session wrote over the screen; force a full repaint
        self.terminal.clear()?;
        self.active = true;
        Ok(())
    }

    fn release(&mut self) -> io::Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        self.terminal.show_cursor()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        disable_raw_mode()
    }
}

impl Drop for CrosstermSurface {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

#[async_trait]
impl Surface for CrosstermSurface {
    fn draw(&mut self, view: &View<'_>) -> io::Result<()> {
        let Self {
            terminal,
            list_state,
            ..
        } = self;
        terminal.draw(|frame| render(frame, view, list_state))?;
        Ok(())
    }

    async fn next_event(&mut self) -> io::Result<Event> {
        tokio::task::spawn_blocking(event::read)
            .await
            .map_err(io::Error::other)?
    }

    fn pause(&mut self) -> io::Result<()> {
        self.release()
    }

    fn resume(&mut self) -> io::Result<()> {
        self.acquire()
    }

    fn size(&self) -> TerminalSize {
        terminal::size()
            .map(|(cols, rows)| TerminalSize::new(rows, cols))
            .unwrap_or_default()
    }
}

/// Lay out one browser frame
///
/// `state` carries the list scroll position from frame to frame.
fn render(frame: &mut Frame, view: &View<'_>, state: &mut ListState) {
    let area = frame.size();
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(1),
        ])
        .split(area);

    let header = format!(
        " gatewarden  User: {}  Hosts: {}/{}",
        view.username,
        view.hosts.len(),
        view.total
    );
    frame.render_widget(
        Paragraph::new(header).style(Style::default().add_modifier(Modifier::REVERSED)),
        rows[0],
    );

    let search = Line::from(vec![
        Span::styled(" Type to search: ", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(view.query),
    ]);
    frame.render_widget(Paragraph::new(search), rows[1]);

    let block = Block::default().borders(Borders::TOP);
    if view.hosts.is_empty() {
        state.select(None);
        frame.render_widget(Paragraph::new("  (no matching hosts)").block(block), rows[2]);
    } else {
        state.select(Some(view.selected.min(view.hosts.len() - 1)));
        let items: Vec<ListItem> = view
            .hosts
            .iter()
            .map(|h| ListItem::new(h.hostname().to_string()))
            .collect();
        let list = List::new(items)
            .block(block)
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
            .highlight_symbol("> ");
        frame.render_stateful_widget(list, rows[2], state);
    }

    frame.render_widget(
        Paragraph::new(FOOTER).style(Style::default().add_modifier(Modifier::DIM)),
        rows[3],
    );

    if let Some(message) = view.popup {
        let popup = centered(area, message.chars().count() as u16 + 4, 3);
        frame.render_widget(Clear, popup);
        frame.render_widget(
            Paragraph::new(message)
                .wrap(Wrap { trim: true })
                .block(Block::default().borders(Borders::ALL)),
            popup,
        );
    }
}

/// A `width` x `height` box in the middle of `area`, clipped to it
fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

/// Restore cooked mode and the main screen, e.g. from a panic hook
pub fn restore_terminal() {
    let _ = execute!(io::stdout(), crossterm::cursor::Show, LeaveAlternateScreen);
    let _ = disable_raw_mode();
}

/// Restore the terminal before the default panic output is printed
pub fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        restore_terminal();
        previous(info);
    }));
}
