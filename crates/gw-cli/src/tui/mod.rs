//! Interactive host browser

mod controller;
mod popup;
mod search;
mod surface;

pub use controller::{BrowserController, BrowserState, Orchestrator, SessionEnded, Transition};
pub use popup::PopupState;
pub use search::SearchFilter;
pub use surface::{install_panic_hook, restore_terminal, CrosstermSurface, Surface, View};
