//! Config command implementations

use std::path::Path;

use anyhow::{Context, Result};

use crate::output::{print_error, print_info, print_success, print_warning};
use gw_core::config::{self, GatewayConfig};

/// Show the effective configuration (file merged over defaults)
pub fn config_show(path: &Path) -> Result<()> {
    if path.exists() {
        print_info(&format!("Configuration file: {:?}", path));
    } else {
        print_warning(&format!("No configuration file at {:?}, showing defaults", path));
    }
    println!();

    let config: GatewayConfig = config::load_or_default(path)
        .with_context(|| format!("Failed to load config from {:?}", path))?;
    let rendered = toml::to_string_pretty(&config).context("Failed to render config")?;
    println!("{}", rendered);
    Ok(())
}

/// Print the configuration directory
pub fn config_path() {
    println!("{}", config::default_config_dir().display());
}

/// Write a default configuration file and a sample allow-list
pub fn config_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        print_error(&format!("Config file already exists: {:?}", path));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    let config = config_beside(path);
    config::save_config(path, &config)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;
    print_success(&format!("Created configuration file: {:?}", path));

    let hosts_file = &config.identity.hosts_file;
    if !hosts_file.exists() {
        if let Some(parent) = hosts_file.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
        std::fs::write(hosts_file, SAMPLE_ALLOW_LIST)
            .with_context(|| format!("Failed to write allow-list: {:?}", hosts_file))?;
        print_success(&format!("Created sample allow-list: {:?}", hosts_file));
    }

    print_info(&format!(
        "Place each user's OpenSSH private key at {:?}/<username>",
        config.identity.key_dir
    ));
    Ok(())
}

/// Defaults with every data path placed next to the config file
fn config_beside(path: &Path) -> GatewayConfig {
    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    let mut config = GatewayConfig::default();
    config.log_file = dir.join("gatewarden.log");
    config.session_log_dir = dir.join("sessions");
    config.identity.hosts_file = dir.join("hosts.toml");
    config.identity.key_dir = dir.join("keys");
    config
}

const SAMPLE_ALLOW_LIST: &str = r#"# gatewarden allow-list
#
# A user may reach every host sharing at least one group with them.

[[hosts]]
name = "db1.internal"
groups = ["dba"]

[[hosts]]
name = "web1.internal"
# port = 2222
groups = ["web"]

[users.alice]
groups = ["dba", "web"]
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_allow_list_parses() {
        let table: toml::Table = toml::from_str(SAMPLE_ALLOW_LIST).unwrap();
        assert_eq!(table["hosts"].as_array().unwrap().len(), 2);
        assert!(table["users"].get("alice").is_some());
    }

    #[test]
    fn test_init_writes_config_and_allow_list_together() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gw").join("config.toml");

        config_init(&path, false).unwrap();

        let config: GatewayConfig = config::load_config(&path).unwrap();
        assert_eq!(config.identity.hosts_file, dir.path().join("gw").join("hosts.toml"));
        assert!(config.identity.hosts_file.exists());
        assert_eq!(config.session_log_dir, dir.path().join("gw").join("sessions"));
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "ssh_port = 2200\n").unwrap();

        config_init(&path, false).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "ssh_port = 2200\n");
    }
}
