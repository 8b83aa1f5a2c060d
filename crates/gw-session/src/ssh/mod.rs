//! SSH transport built on russh

mod client;
mod handler;
mod keys;

pub use client::{SshOptions, SshTransport};
pub use keys::key_to_bytes;
