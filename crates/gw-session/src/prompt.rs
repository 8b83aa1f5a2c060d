//! Echo-suppressed password prompt

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::terminal::{RawModeGuard, StopOnDrop, TERMINAL_POLL_INTERVAL};

/// Source of operator passwords
#[async_trait]
pub trait PasswordPrompt: Send {
    /// Show `prompt` and read a password without echoing it
    ///
    /// Dropping the returned future abandons the prompt.
    async fn read_password(&mut self, prompt: &str) -> io::Result<String>;
}

/// Reads a password from the controlling terminal
///
/// Runs while the browser is paused, so it owns the terminal. The read
/// happens on a blocking thread so the runtime keeps serving signals;
/// raw mode is used to keep keystrokes off the screen and is always
/// restored.
#[derive(Debug, Default)]
pub struct TerminalPrompt;

#[async_trait]
impl PasswordPrompt for TerminalPrompt {
    async fn read_password(&mut self, prompt: &str) -> io::Result<String> {
        let prompt = prompt.to_string();
        let stop = StopOnDrop::new();
        let flag = stop.flag();

        let result = tokio::task::spawn_blocking(move || read_blocking(&prompt, &flag))
            .await
            .map_err(io::Error::other)?;
        drop(stop);
        result
    }
}

fn read_blocking(prompt: &str, stop: &AtomicBool) -> io::Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "{}", prompt)?;
    stdout.flush()?;

    let mut password = String::new();
    let step = {
        let _raw = RawModeGuard::enable()?;
        loop {
            if stop.load(Ordering::Relaxed) {
                break PromptStep::Abort;
            }
            if !event::poll(TERMINAL_POLL_INTERVAL)? {
                continue;
            }
            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match apply_key(&mut password, key) {
                PromptStep::Continue => {}
                done => break done,
            }
        }
    };

    write!(stdout, "\r\n")?;
    stdout.flush()?;
    match step {
        PromptStep::Done => Ok(password),
        _ => Err(io::Error::new(
            io::ErrorKind::Interrupted,
            "password entry aborted",
        )),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum PromptStep {
    Continue,
    Done,
    Abort,
}

fn apply_key(buf: &mut String, key: KeyEvent) -> PromptStep {
    match key.code {
        KeyCode::Enter => PromptStep::Done,
        KeyCode::Esc => PromptStep::Abort,
        KeyCode::Char('c') | KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            PromptStep::Abort
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            buf.clear();
            PromptStep::Continue
        }
        KeyCode::Backspace => {
            buf.pop();
            PromptStep::Continue
        }
        KeyCode::Char(c) => {
            buf.push(c);
            PromptStep::Continue
        }
        _ => PromptStep::Continue,
    }
}
