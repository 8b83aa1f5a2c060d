//! List command implementation

use anyhow::{Context, Result};

use gw_core::config::GatewayConfig;
use gw_core::identity::FileIdentityProvider;
use gw_core::traits::IdentityProvider;

use crate::output::format_hosts;

/// Print the hosts `username` may reach
pub async fn list_command(config: &GatewayConfig, username: &str, long: bool) -> Result<()> {
    let provider = FileIdentityProvider::from_config(&config.identity, config.ssh_port);
    let hosts = provider
        .allowed_hosts(username, true)
        .await
        .with_context(|| format!("Failed to load allowed hosts for {}", username))?;

    println!("Allowed hosts for {}:", username);
    println!("{}", format_hosts(&hosts, long));
    Ok(())
}
