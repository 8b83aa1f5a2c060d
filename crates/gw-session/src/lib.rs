//! gw-session: Interactive session lifecycle for gatewarden
//!
//! An [`InteractiveSession`] drives one operator connection: it obtains
//! credentials (falling back to a password prompt), hands the terminal to
//! a [`Transport`], and reports completion to its owning context exactly
//! once, whether the session ended normally or was killed.

pub mod credential;
pub mod kill;
pub mod prompt;
pub mod recorder;
pub mod session;
pub mod ssh;
mod terminal;
pub mod transport;

pub use credential::Credential;
pub use kill::{KillHandle, KillSignal};
pub use prompt::{PasswordPrompt, TerminalPrompt};
pub use recorder::SessionRecorder;
pub use session::InteractiveSession;
pub use ssh::{SshOptions, SshTransport};
pub use transport::{SessionEnd, Transport, TransportKind};
