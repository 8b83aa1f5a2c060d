//! gatewarden: interactive front-end of an SSH bastion
//!
//! Lets an authenticated operator browse the hosts they are allowed to
//! reach, pick one, and hands the terminal to an audited SSH session.

pub mod commands;
pub mod gateway;
pub mod output;
pub mod tui;
