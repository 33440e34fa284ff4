//! User configuration at `<config_dir>/config.toml`.
//!
//! Holds what a real control plane would answer for lookups: the account,
//! resource group locations, user-assigned identities and a service
//! principal to hand out.
//!
//! ```toml
//! [account]
//! subscription_id = "1234-5678"
//! tenant_id = "tenant-1"
//!
//! [resource_groups]
//! my-rg = "westus2"
//!
//! [identities."/subscriptions/1234-5678/resourceGroups/id/providers/Microsoft.ManagedIdentity/userAssignedIdentities/control"]
//! client_id = "client-1"
//! principal_id = "principal-1"
//!
//! [service_principal]
//! client_id = "sp-1"
//! secret = "hunter2"
//!
//! [workspace]
//! default_id = "/subscriptions/.../workspaces/DefaultWorkspace"
//!
//! [store]
//! dir = "~/clusters"
//! ```

use crate::paths;
use anyhow::{Context, Result, bail};
use clustermodel::is_valid_resource_id;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AksConfig {
    #[serde(default)]
    pub account: AccountConfig,

    /// Resource group name to location.
    #[serde(default)]
    pub resource_groups: BTreeMap<String, String>,

    /// User-assigned identities keyed by full resource id.
    #[serde(default)]
    pub identities: BTreeMap<String, IdentityConfig>,

    #[serde(default)]
    pub service_principal: Option<ServicePrincipalConfig>,

    #[serde(default)]
    pub workspace: WorkspaceConfig,

    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountConfig {
    pub subscription_id: Option<String>,
    pub tenant_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub client_id: String,
    pub principal_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServicePrincipalConfig {
    pub client_id: String,
    pub secret: String,
    /// Sent as a request header when the principal was freshly created.
    #[serde(default)]
    pub aad_session_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Log Analytics workspace used when monitoring is enabled without one.
    pub default_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding stored cluster descriptors.
    pub dir: Option<String>,
}

impl AksConfig {
    /// Path of the default config file.
    pub fn default_path() -> Result<PathBuf> {
        Ok(paths::config_dir()?.join("config.toml"))
    }

    /// Load the config from the default location, or defaults if it does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("Config file {} does not exist, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid TOML format in {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config in {}", path.display()))?;

        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for id in self.identities.keys() {
            if !is_valid_resource_id(id) {
                bail!("identity key '{id}' is not a valid resource id");
            }
        }
        if let Some(id) = &self.workspace.default_id
            && !is_valid_resource_id(id)
        {
            bail!("workspace.default_id '{id}' is not a valid resource id");
        }
        Ok(())
    }

    /// Directory holding stored cluster descriptors.
    pub fn store_dir(&self) -> Result<PathBuf> {
        match &self.store.dir {
            Some(dir) => Ok(paths::expand(dir)),
            None => Ok(paths::state_dir()?.join("clusters")),
        }
    }

    /// Look up an identity, ignoring case as resource ids do.
    pub fn identity(&self, id: &str) -> Option<&IdentityConfig> {
        self.identities
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(id))
            .map(|(_, identity)| identity)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const IDENTITY: &str = "/subscriptions/1234-5678/resourceGroups/id/providers/Microsoft.ManagedIdentity/userAssignedIdentities/control";

    fn write_config(content: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = AksConfig::load_from(&dir.path().join("nope.toml")).unwrap();
        assert!(config.account.subscription_id.is_none());
        assert!(config.identities.is_empty());
    }

    #[test]
    fn test_load_full_config() {
        let (_dir, path) = write_config(&format!(
            r#"
[account]
subscription_id = "1234-5678"
tenant_id = "tenant-1"

[resource_groups]
rg = "westus2"

[identities."{IDENTITY}"]
client_id = "client-1"
principal_id = "principal-1"

[service_principal]
client_id = "sp-1"
secret = "s3cret"

[store]
dir = "/tmp/akscli-store"
"#
        ));
        let config = AksConfig::load_from(&path).unwrap();
        assert_eq!(config.account.subscription_id.as_deref(), Some("1234-5678"));
        assert_eq!(config.resource_groups["rg"], "westus2");
        assert_eq!(
            config.identity(&IDENTITY.to_uppercase()).unwrap().principal_id,
            "principal-1"
        );
        assert_eq!(config.service_principal.unwrap().client_id, "sp-1");
        assert_eq!(
            AksConfig::load_from(&path).unwrap().store_dir().unwrap(),
            PathBuf::from("/tmp/akscli-store")
        );
    }

    #[test]
    fn test_load_rejects_bad_identity_key() {
        let (_dir, path) = write_config(
            r#"
[identities."not-an-id"]
client_id = "c"
principal_id = "p"
"#,
        );
        let err = AksConfig::load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("not a valid resource id"));
    }
}
