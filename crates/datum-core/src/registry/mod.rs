//! Registry clients.
//!
//! A registry maps dataset identifiers to manifest documents. The pull
//! engine consumes registries only through the [`Registry`] trait and is
//! agnostic to transport; both a local filesystem layout and a remote
//! HTTP API are provided. Registries may be slow and may fail
//! transiently — retry policy belongs to the client adapters, never to
//! the orchestration logic.

pub mod local;
pub mod remote;

use async_trait::async_trait;

use crate::identifier::DatasetIdentifier;
use crate::manifest::DatasetManifest;

pub use local::LocalRegistry;
pub use remote::RemoteRegistry;

/// Errors from registry lookups.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("dataset not found in registry: {0}")]
    NotFound(String),

    #[error("registry unreachable: {0}")]
    Unreachable(String),

    #[error("registry served an invalid manifest for {identifier}: {reason}")]
    InvalidManifest { identifier: String, reason: String },

    #[error("registry io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

/// The two lookups the pull engine depends on.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Resolve an unversioned identifier to its latest published version.
    /// Identifiers that already carry a version are returned unchanged.
    async fn resolve_version(&self, id: &DatasetIdentifier) -> Result<DatasetIdentifier>;

    /// Fetch the manifest for a version-pinned identifier.
    async fn get_metadata(&self, id: &DatasetIdentifier) -> Result<DatasetManifest>;
}

#[async_trait]
impl Registry for Box<dyn Registry> {
    async fn resolve_version(&self, id: &DatasetIdentifier) -> Result<DatasetIdentifier> {
        (**self).resolve_version(id).await
    }

    async fn get_metadata(&self, id: &DatasetIdentifier) -> Result<DatasetManifest> {
        (**self).get_metadata(id).await
    }
}
