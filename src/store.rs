//! File-backed cluster store.
//!
//! Descriptors live as pretty JSON at `<root>/<resource_group>/<name>.json`
//! and stand in for the control plane's copy of each cluster.

use anyhow::{Context, Result, bail};
use clustermodel::ManagedCluster;
use decorator::external::ClusterClient;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub struct FileClusterStore {
    root: PathBuf,
}

impl FileClusterStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a cluster's descriptor file.
    pub fn cluster_path(&self, resource_group: &str, name: &str) -> PathBuf {
        self.root.join(resource_group).join(format!("{name}.json"))
    }

    pub fn exists(&self, resource_group: &str, name: &str) -> bool {
        self.cluster_path(resource_group, name).is_file()
    }

    /// Stored clusters as `(resource_group, name)`, sorted.
    pub fn list(&self) -> Result<Vec<(String, String)>> {
        let mut clusters = Vec::new();
        if !self.root.exists() {
            return Ok(clusters);
        }

        let groups = fs::read_dir(&self.root)
            .with_context(|| format!("Could not read store directory: {}", self.root.display()))?;
        for group in groups {
            let group = group?;
            if !group.file_type()?.is_dir() {
                continue;
            }
            let resource_group = group.file_name().to_string_lossy().into_owned();
            for entry in fs::read_dir(group.path())? {
                let path = entry?.path();
                if path.extension().is_some_and(|ext| ext == "json")
                    && let Some(stem) = path.file_stem()
                {
                    clusters.push((resource_group.clone(), stem.to_string_lossy().into_owned()));
                }
            }
        }
        clusters.sort();
        Ok(clusters)
    }
}

impl ClusterClient for FileClusterStore {
    fn get(&self, resource_group: &str, name: &str) -> Result<ManagedCluster> {
        let path = self.cluster_path(resource_group, name);
        if !path.exists() {
            bail!("cluster '{name}' not found in resource group '{resource_group}'");
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let mc = ManagedCluster::from_json(&content)
            .with_context(|| format!("Invalid cluster descriptor in {}", path.display()))?;
        log::debug!("Loaded cluster descriptor from {}", path.display());
        Ok(mc)
    }

    fn create_or_update(
        &self,
        resource_group: &str,
        name: &str,
        mc: &ManagedCluster,
        headers: &BTreeMap<String, String>,
        no_wait: bool,
    ) -> Result<ManagedCluster> {
        let path = self.cluster_path(resource_group, name);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create store directory: {}", dir.display()))?;
        }
        if !headers.is_empty() {
            log::debug!("request headers: {}", headers.keys().cloned().collect::<Vec<_>>().join(", "));
        }

        let content = mc.to_json_pretty().context("Failed to serialize cluster descriptor")?;
        fs::write(&path, format!("{content}\n"))
            .with_context(|| format!("Failed to write {}", path.display()))?;

        if no_wait {
            log::info!("submitted {name} without waiting");
        }
        log::debug!("Saved cluster descriptor to {}", path.display());
        Ok(mc.clone())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_get_missing_cluster() {
        let dir = TempDir::new().unwrap();
        let store = FileClusterStore::new(dir.path());
        let err = store.get("rg", "aks").unwrap_err();
        assert_eq!(err.to_string(), "cluster 'aks' not found in resource group 'rg'");
    }

    #[test]
    fn test_create_then_get() {
        let dir = TempDir::new().unwrap();
        let store = FileClusterStore::new(dir.path());
        let mc = ManagedCluster {
            dns_prefix: Some("aks-rg".to_string()),
            ..ManagedCluster::new("westus2")
        };

        let saved = store
            .create_or_update("rg", "aks", &mc, &BTreeMap::new(), false)
            .unwrap();
        assert_eq!(saved, mc);
        assert!(store.exists("rg", "aks"));
        assert!(dir.path().join("rg").join("aks.json").is_file());
        assert_eq!(store.get("rg", "aks").unwrap(), mc);
    }

    #[test]
    fn test_list_clusters() {
        let dir = TempDir::new().unwrap();
        let store = FileClusterStore::new(dir.path());
        assert!(store.list().unwrap().is_empty());

        let mc = ManagedCluster::new("westus2");
        store.create_or_update("rg-b", "two", &mc, &BTreeMap::new(), false).unwrap();
        store.create_or_update("rg-a", "one", &mc, &BTreeMap::new(), true).unwrap();
        fs::write(dir.path().join("rg-a").join("notes.txt"), "ignored").unwrap();

        assert_eq!(
            store.list().unwrap(),
            vec![
                ("rg-a".to_string(), "one".to_string()),
                ("rg-b".to_string(), "two".to_string()),
            ]
        );
    }

    #[test]
    fn test_get_rejects_corrupt_descriptor() {
        let dir = TempDir::new().unwrap();
        let store = FileClusterStore::new(dir.path());
        fs::create_dir_all(dir.path().join("rg")).unwrap();
        fs::write(dir.path().join("rg").join("aks.json"), "{not json").unwrap();
        let err = store.get("rg", "aks").unwrap_err();
        assert!(err.to_string().starts_with("Invalid cluster descriptor"));
    }
}
