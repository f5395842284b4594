//! Local filesystem registry.
//!
//! Manifests live at `<root>/<publisher>/<namespace>/<name>/<version>.json`.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::{Registry, RegistryError, Result};
use crate::identifier::DatasetIdentifier;
use crate::manifest::DatasetManifest;

pub struct LocalRegistry {
    root: PathBuf,
}

impl LocalRegistry {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn dataset_dir(&self, id: &DatasetIdentifier) -> PathBuf {
        self.root
            .join(id.publisher())
            .join(id.namespace())
            .join(id.name())
    }

    fn manifest_path(&self, id: &DatasetIdentifier, version: &str) -> PathBuf {
        self.dataset_dir(id).join(format!("{version}.json"))
    }

    /// All published versions for a dataset, oldest first.
    fn versions(&self, id: &DatasetIdentifier) -> Result<Vec<String>> {
        let dir = self.dataset_dir(id);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut versions = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    versions.push(stem.to_string());
                }
            }
        }
        versions.sort_by(|a, b| version_key(a).cmp(&version_key(b)));
        Ok(versions)
    }
}

#[async_trait]
impl Registry for LocalRegistry {
    async fn resolve_version(&self, id: &DatasetIdentifier) -> Result<DatasetIdentifier> {
        if id.version().is_some() {
            return Ok(id.clone());
        }
        let versions = self.versions(id)?;
        let latest = versions
            .last()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        debug!(id = %id, version = %latest, "resolved latest version");
        Ok(id.with_version(latest))
    }

    async fn get_metadata(&self, id: &DatasetIdentifier) -> Result<DatasetManifest> {
        let version = id
            .version()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        let path = self.manifest_path(id, version);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RegistryError::NotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let manifest: DatasetManifest =
            serde_json::from_str(&raw).map_err(|e| RegistryError::InvalidManifest {
                identifier: id.to_string(),
                reason: e.to_string(),
            })?;
        manifest
            .validate()
            .map_err(|e| RegistryError::InvalidManifest {
                identifier: id.to_string(),
                reason: e.to_string(),
            })?;
        Ok(manifest)
    }
}

/// Ordering key for version strings: the sequence of embedded integers
/// (handles `1.0.10`, `2024-01`, and friends), with purely
/// non-numeric versions sorting after numeric ones and ties broken
/// lexicographically.
fn version_key(v: &str) -> (u8, Vec<u64>, String) {
    let mut nums = Vec::new();
    let mut current = String::new();
    for c in v.chars() {
        if c.is_ascii_digit() {
            current.push(c);
        } else if !current.is_empty() {
            nums.push(current.parse().unwrap_or(u64::MAX));
            current.clear();
        }
    }
    if !current.is_empty() {
        nums.push(current.parse().unwrap_or(u64::MAX));
    }
    let rank = if nums.is_empty() { 1 } else { 0 };
    (rank, nums, v.to_string())
}
