//! File-backed identity provider
//!
//! Reads a TOML allow-list that maps users and hosts onto shared groups:
//!
//! ```toml
//! [[hosts]]
//! name = "db1.internal"
//! groups = ["dba"]
//!
//! [[hosts]]
//! name = "web1.internal"
//! port = 2222
//! groups = ["web"]
//!
//! [users.alice]
//! groups = ["dba", "web"]
//! ```
//!
//! A user may reach every host that shares at least one group with them.
//! Private keys live in a directory, one OpenSSH key file per username.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::IdentityConfig;
use crate::error::{CredentialError, IdentityError};
use crate::traits::IdentityProvider;
use crate::types::HostEntry;

#[derive(Debug, Clone, Default, Deserialize)]
struct AllowList {
    #[serde(default)]
    hosts: Vec<HostRecord>,
    #[serde(default)]
    users: HashMap<String, UserRecord>,
}

#[derive(Debug, Clone, Deserialize)]
struct HostRecord {
    name: String,
    port: Option<u16>,
    #[serde(default)]
    groups: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct UserRecord {
    #[serde(default)]
    groups: Vec<String>,
}

impl AllowList {
    fn hosts_for(&self, username: &str, default_port: u16) -> Result<Vec<HostEntry>, IdentityError> {
        let user = self
            .users
            .get(username)
            .ok_or_else(|| IdentityError::UnknownUser(username.to_string()))?;

        let mut seen = std::collections::HashSet::new();
        Ok(self
            .hosts
            .iter()
            .filter(|h| h.groups.iter().any(|g| user.groups.contains(g)))
            .filter(|h| seen.insert(h.name.clone()))
            .map(|h| HostEntry::new(h.name.clone(), h.port.unwrap_or(default_port)))
            .collect())
    }
}

struct Cached {
    modified: Option<SystemTime>,
    list: AllowList,
}

/// Identity provider backed by an allow-list file and a key directory
pub struct FileIdentityProvider {
    hosts_file: PathBuf,
    key_dir: PathBuf,
    default_port: u16,
    cache: Mutex<Option<Cached>>,
}

impl FileIdentityProvider {
    /// Create a provider; nothing is read until hosts are requested
    pub fn new(hosts_file: impl Into<PathBuf>, key_dir: impl Into<PathBuf>, default_port: u16) -> Self {
        Self {
            hosts_file: hosts_file.into(),
            key_dir: key_dir.into(),
            default_port,
            cache: Mutex::new(None),
        }
    }

    /// Create a provider from the identity section of the gateway config
    pub fn from_config(config: &IdentityConfig, default_port: u16) -> Self {
        Self::new(&config.hosts_file, &config.key_dir, default_port)
    }

    pub fn hosts_file(&self) -> &Path {
        &self.hosts_file
    }

    async fn load(&self, force: bool) -> Result<AllowList, IdentityError> {
        let modified = tokio::fs::metadata(&self.hosts_file)
            .await
            .ok()
            .and_then(|m| m.modified().ok());

        if !force && modified.is_some() {
            let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(cached) = cache.as_ref().filter(|c| c.modified == modified) {
                tracing::debug!("Allow-list unchanged, using cached copy");
                return Ok(cached.list.clone());
            }
        }

        tracing::debug!("Reading allow-list from {:?}", self.hosts_file);
        let content = tokio::fs::read_to_string(&self.hosts_file)
            .await
            .map_err(|source| IdentityError::Read {
                path: self.hosts_file.clone(),
                source,
            })?;
        let list: AllowList = toml::from_str(&content)?;

        *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = Some(Cached {
            modified,
            list: list.clone(),
        });
        Ok(list)
    }
}

#[async_trait]
impl IdentityProvider for FileIdentityProvider {
    async fn allowed_hosts(
        &self,
        username: &str,
        force: bool,
    ) -> Result<Vec<HostEntry>, IdentityError> {
        let list = self.load(force).await?;
        let hosts = list.hosts_for(username, self.default_port)?;
        tracing::debug!("User {} may reach {} hosts", username, hosts.len());
        Ok(hosts)
    }

    fn private_key(&self, username: &str) -> Result<String, CredentialError> {
        if username.is_empty() || username.contains(['/', '\\']) || username.starts_with('.') {
            return Err(CredentialError::Provider(format!(
                "refusing key lookup for username {:?}",
                username
            )));
        }

        let path = self.key_dir.join(username);
        match std::fs::read_to_string(&path) {
            Ok(key) => Ok(key),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CredentialError::NoPrivateKey(username.to_string()))
            }
            Err(source) => Err(CredentialError::Unreadable { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALLOW_LIST: &str = r#"
[[hosts]]
name = "db1.internal"
groups = ["dba"]

[[hosts]]
name = "web1.internal"
port = 2222
groups = ["web"]

[[hosts]]
name = "db2.internal"
groups = ["dba", "web"]

[users.alice]
groups = ["dba"]

[users.bob]
groups = ["web", "dba"]
"#;

    fn provider_with(content: &str) -> (tempfile::TempDir, FileIdentityProvider) {
        let dir = tempfile::tempdir().unwrap();
        let hosts = dir.path().join("hosts.toml");
        std::fs::write(&hosts, content).unwrap();
        let keys = dir.path().join("keys");
        std::fs::create_dir_all(&keys).unwrap();
        let provider = FileIdentityProvider::new(hosts, keys, 22);
        (dir, provider)
    }

    fn names(hosts: &[HostEntry]) -> Vec<&str> {
        hosts.iter().map(|h| h.hostname()).collect()
    }

    #[tokio::test]
    async fn test_hosts_follow_group_membership() {
        let (_dir, provider) = provider_with(ALLOW_LIST);

        let alice = provider.allowed_hosts("alice", false).await.unwrap();
        assert_eq!(names(&alice), vec!["db1.internal", "db2.internal"]);

        let bob = provider.allowed_hosts("bob", false).await.unwrap();
        assert_eq!(
            names(&bob),
            vec!["db1.internal", "web1.internal", "db2.internal"]
        );
        assert_eq!(bob[1].port(), 2222);
        assert_eq!(bob[0].port(), 22);
    }

    #[tokio::test]
    async fn test_unknown_user_is_an_error() {
        let (_dir, provider) = provider_with(ALLOW_LIST);
        let result = provider.allowed_hosts("mallory", false).await;
        assert!(matches!(result, Err(IdentityError::UnknownUser(u)) if u == "mallory"));
    }

    #[tokio::test]
    async fn test_forced_refresh_rereads_file() {
        let (dir, provider) = provider_with(ALLOW_LIST);
        assert_eq!(provider.allowed_hosts("alice", false).await.unwrap().len(), 2);

        std::fs::write(
            dir.path().join("hosts.toml"),
            "[[hosts]]\nname = \"db9\"\ngroups = [\"dba\"]\n[users.alice]\ngroups = [\"dba\"]\n",
        )
        .unwrap();

        let hosts = provider.allowed_hosts("alice", true).await.unwrap();
        assert_eq!(names(&hosts), vec!["db9"]);
    }

    #[tokio::test]
    async fn test_missing_allow_list() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileIdentityProvider::new(dir.path().join("absent.toml"), dir.path(), 22);
        let result = provider.allowed_hosts("alice", false).await;
        assert!(matches!(result, Err(IdentityError::Read { .. })));
    }

    #[test]
    fn test_private_key_missing_is_no_private_key() {
        let (_dir, provider) = provider_with(ALLOW_LIST);
        let result = provider.private_key("alice");
        assert!(matches!(result, Err(CredentialError::NoPrivateKey(u)) if u == "alice"));
    }

    #[test]
    fn test_private_key_is_read_from_key_dir() {
        let (dir, provider) = provider_with(ALLOW_LIST);
        std::fs::write(dir.path().join("keys").join("bob"), "KEY MATERIAL").unwrap();
        assert_eq!(provider.private_key("bob").unwrap(), "KEY MATERIAL");
    }

    #[test]
    fn test_private_key_rejects_path_traversal() {
        let (_dir, provider) = provider_with(ALLOW_LIST);
        assert!(matches!(
            provider.private_key("../etc/shadow"),
            Err(CredentialError::Provider(_))
        ));
    }
}
