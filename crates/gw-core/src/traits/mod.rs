//! Core trait definitions

mod identity;
mod session;

pub use identity::IdentityProvider;
pub use session::{Direction, SessionContext, Sniffer};
