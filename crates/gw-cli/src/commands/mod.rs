//! CLI command implementations

mod config;
mod list;

pub use config::{config_init, config_path, config_show};
pub use list::list_command;
