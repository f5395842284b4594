//! Remote HTTP registry.
//!
//! Read endpoints:
//! - `GET /api/v1/packages/{id}/{version}`
//! - `GET /api/v1/packages/{id}/latest`
//!
//! Publish, search, and authenticated operations live in the registry
//! service itself and are not part of the pull path.

use async_trait::async_trait;
use tracing::debug;

use super::{Registry, RegistryError, Result};
use crate::identifier::DatasetIdentifier;
use crate::manifest::DatasetManifest;

pub struct RemoteRegistry {
    base_url: String,
    client: reqwest::Client,
}

impl RemoteRegistry {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("datum/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RegistryError::Unreachable(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn fetch_manifest(&self, id: &DatasetIdentifier, version: &str) -> Result<DatasetManifest> {
        let url = format!(
            "{}/api/v1/packages/{}/{}",
            self.base_url,
            id.base(),
            version
        );
        debug!(%url, "registry lookup");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RegistryError::Unreachable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(id.to_string()));
        }
        if !response.status().is_success() {
            return Err(RegistryError::Unreachable(format!(
                "{url} returned {}",
                response.status()
            )));
        }

        let manifest: DatasetManifest =
            response
                .json()
                .await
                .map_err(|e| RegistryError::InvalidManifest {
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

#[async_trait]
impl Registry for RemoteRegistry {
    async fn resolve_version(&self, id: &DatasetIdentifier) -> Result<DatasetIdentifier> {
        if id.version().is_some() {
            return Ok(id.clone());
        }
        let manifest = self.fetch_manifest(id, "latest").await?;
        Ok(id.with_version(&manifest.version))
    }

    async fn get_metadata(&self, id: &DatasetIdentifier) -> Result<DatasetManifest> {
        let version = id
            .version()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        self.fetch_manifest(id, version).await
    }
}
