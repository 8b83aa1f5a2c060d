//! Out-of-band session termination
//!
//! The hosting environment (signal watcher, supervisor) posts a kill to a
//! session's [`KillHandle`]. The transport observes it inside its I/O pump
//! and the session forwards it into the normal close path, so completion
//! is still reported exactly once.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

/// Why a session was killed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillSignal {
    /// Name of the signal or event, e.g. "SIGHUP"
    pub name: String,
}

impl KillSignal {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for KillSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Cloneable handle used to terminate a running session
#[derive(Debug, Clone, Default)]
pub struct KillHandle {
    token: CancellationToken,
    signal: Arc<Mutex<Option<KillSignal>>>,
}

impl KillHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request termination; only the first signal is kept
    pub fn kill(&self, signal: KillSignal) {
        {
            let mut slot = self.signal.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                *slot = Some(signal);
            }
        }
        self.token.cancel();
    }

    pub fn is_killed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until a kill is posted and return its signal
    pub async fn killed(&self) -> KillSignal {
        self.token.cancelled().await;
        self.signal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| KillSignal::new("unknown"))
    }
}
