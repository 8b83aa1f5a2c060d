//! Session recording sniffer
//!
//! Writes the remote output of a session (and optionally the operator's
//! keystrokes) to a per-session log file for later audit or replay.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use gw_core::traits::{Direction, Sniffer};
use gw_core::SessionInfo;

/// Sniffer that records session traffic to disk
pub struct SessionRecorder {
    dir: PathBuf,
    record_input: bool,
    path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
    bytes_out: u64,
    bytes_in: u64,
}

impl SessionRecorder {
    /// Record into `dir`; the file is created when the session starts
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            record_input: false,
            path: None,
            writer: None,
            bytes_out: 0,
            bytes_in: 0,
        }
    }

    /// Also record operator keystrokes
    pub fn with_input(mut self, record_input: bool) -> Self {
        self.record_input = record_input;
        self
    }

    /// Path of the active recording
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn file_name(session: &SessionInfo) -> String {
        let clean = |s: &str| -> String {
            s.chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
                .collect()
        };
        format!(
            "{}-{}-{}.log",
            clean(&session.username),
            clean(&session.host),
            session.id
        )
    }
}

impl Sniffer for SessionRecorder {
    fn start(&mut self, session: &SessionInfo) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(Self::file_name(session));
        let mut writer = BufWriter::new(File::create(&path)?);

        let started = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        writeln!(writer, "# session {} started {} ({})", session.id, started, session)?;
        writer.flush()?;

        tracing::info!("Recording session {} to {:?}", session.id, path);
        self.path = Some(path);
        self.writer = Some(writer);
        Ok(())
    }

    fn capture(&mut self, direction: Direction, data: &[u8]) -> io::Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        match direction {
            Direction::Output => {
                self.bytes_out += data.len() as u64;
                writer.write_all(data)
            }
            Direction::Input => {
                self.bytes_in += data.len() as u64;
                if self.record_input {
                    writer.write_all(data)
                } else {
                    Ok(())
                }
            }
        }
    }

    fn stop(&mut self) -> io::Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            tracing::debug!(
                bytes_out = self.bytes_out,
                bytes_in = self.bytes_in,
                "Recording stopped: {:?}",
                self.path
            );
        }
        Ok(())
    }
}

impl Drop for SessionRecorder {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
