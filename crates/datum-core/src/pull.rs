//! The pull engine.
//!
//! Orchestrates one pull request: resolve the identifier, fetch the
//! manifest, then for each declared source either skip (the working
//! file already exists), serve from the cache, or fetch, verify,
//! promote, and materialize. Sources are independent and are processed
//! concurrently; each gets its own staging path and the cache's
//! verify-then-rename commit keeps concurrent promotion safe.
//!
//! Per-source failures are collected so siblings keep making progress;
//! whole-pull failures (unresolvable version, unavailable metadata,
//! cache io) abort immediately.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::cache::{CacheError, FsCache};
use crate::fetch::{FetchError, Fetcher};
use crate::identifier::DatasetIdentifier;
use crate::manifest::SourceDescriptor;
use crate::registry::{Registry, RegistryError};

/// Whole-pull errors. Any of these aborts the request before or during
/// source processing.
#[derive(Debug, thiserror::Error)]
pub enum PullError {
    #[error("could not resolve a version for {identifier}: {source}")]
    UnresolvedVersion {
        identifier: String,
        source: RegistryError,
    },

    #[error("metadata unavailable for {identifier}: {source}")]
    MetadataUnavailable {
        identifier: String,
        source: RegistryError,
    },

    /// Cache consistency can no longer be assumed (disk full,
    /// permissions); no further sources are processed.
    #[error("cache failure: {0}")]
    Cache(#[from] CacheError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why one source failed while its siblings carried on.
#[derive(Debug, thiserror::Error)]
pub enum SourceFailure {
    /// Fetched bytes did not match the declared checksum or size.
    /// Never retried automatically: retrying an untrustworthy source
    /// without operator awareness is unsafe.
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    #[error(transparent)]
    Transfer(#[from] FetchError),
}

/// Outcome for a single source.
#[derive(Debug)]
pub enum SourceStatus {
    /// The working file already existed and `force` was not set; no
    /// cache or network I/O happened.
    Skipped,
    /// Materialized from an existing cache entry without any fetch.
    FromCache,
    /// Fetched from the source URL, verified, promoted, materialized.
    Fetched,
    Failed(SourceFailure),
}

impl SourceStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped => f.write_str("already present, skipped"),
            Self::FromCache => f.write_str("served from cache"),
            Self::Fetched => f.write_str("fetched and cached"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Per-source line in a pull report.
#[derive(Debug)]
pub struct SourceReport {
    pub url: String,
    pub file_name: String,
    pub target: PathBuf,
    pub status: SourceStatus,
}

/// Result of one pull request. The pull succeeded only if every source
/// materialized; partial success is observable, never swallowed.
#[derive(Debug)]
pub struct PullReport {
    pub id: DatasetIdentifier,
    pub title: String,
    pub output_dir: PathBuf,
    pub sources: Vec<SourceReport>,
}

impl PullReport {
    pub fn succeeded(&self) -> bool {
        self.sources.iter().all(|s| !s.status.is_failure())
    }

    pub fn failures(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.iter().filter(|s| s.status.is_failure())
    }
}

/// Pull request options.
#[derive(Debug, Clone)]
pub struct PullOptions {
    /// Directory the dataset's files are materialized into.
    pub output_dir: PathBuf,
    /// Re-materialize working files that already exist. Cache entries
    /// are still honored, but re-verified before reuse.
    pub force: bool,
}

/// Ties registry, fetcher, and cache together. The cache is an explicit
/// store object so multiple roots can coexist (and tests can point one
/// at a scratch directory).
pub struct PullEngine<R, F> {
    registry: R,
    fetcher: F,
    cache: FsCache,
}

impl<R, F> PullEngine<R, F>
where
    R: Registry,
    F: Fetcher,
{
    pub fn new(registry: R, fetcher: F, cache: FsCache) -> Self {
        Self {
            registry,
            fetcher,
            cache,
        }
    }

    pub fn cache(&self) -> &FsCache {
        &self.cache
    }

    /// Execute one pull request.
    pub async fn pull(
        &self,
        id: &DatasetIdentifier,
        options: &PullOptions,
    ) -> Result<PullReport, PullError> {
        let resolved = if id.version().is_some() {
            id.clone()
        } else {
            self.registry
                .resolve_version(id)
                .await
                .map_err(|source| PullError::UnresolvedVersion {
                    identifier: id.to_string(),
                    source,
                })?
        };

        let manifest = self
            .registry
            .get_metadata(&resolved)
            .await
            .map_err(|source| PullError::MetadataUnavailable {
                identifier: resolved.to_string(),
                source,
            })?;

        info!(id = %resolved, sources = manifest.sources.len(), "pulling dataset");

        fs::create_dir_all(&options.output_dir)?;
        // Download staging lives outside the cache root; dropped (and
        // deleted) when the pull finishes, whatever the outcome.
        let staging = tempfile::tempdir()?;

        let tasks = manifest.sources.iter().enumerate().map(|(index, source)| {
            self.process_source(index, source, options, staging.path())
        });

        let mut reports = Vec::with_capacity(manifest.sources.len());
        for outcome in join_all(tasks).await {
            reports.push(outcome?);
        }

        Ok(PullReport {
            id: resolved,
            title: manifest.title,
            output_dir: options.output_dir.clone(),
            sources: reports,
        })
    }

    /// Process one source through the skip / cache / fetch ladder.
    ///
    /// Integrity and transfer problems become a `Failed` status; only
    /// cache io errors escape, failing the whole pull.
    async fn process_source(
        &self,
        index: usize,
        source: &SourceDescriptor,
        options: &PullOptions,
        staging_dir: &Path,
    ) -> Result<SourceReport, PullError> {
        let file_name = derive_file_name(&source.url, index, &source.format);
        let target = options.output_dir.join(&file_name);

        let report = |status| SourceReport {
            url: source.url.clone(),
            file_name: file_name.clone(),
            target: target.clone(),
            status,
        };

        // Skip rule: evaluated before any cache or network access, so a
        // populated working directory costs nothing on repeated pulls.
        if target.exists() && !options.force {
            debug!(file = %file_name, "working file present, skipping");
            return Ok(report(SourceStatus::Skipped));
        }

        if let Some(cached) = self.usable_cache_entry(source, options.force)? {
            fs::copy(&cached, &target)?;
            debug!(file = %file_name, "materialized from cache");
            return Ok(report(SourceStatus::FromCache));
        }

        // Distinct staging path per source keeps concurrent fetches
        // within one pull isolated.
        let temp_path = staging_dir.join(format!("source-{index}"));
        match self.fetcher.fetch(&source.url, &temp_path).await {
            Ok(bytes) => debug!(url = %source.url, bytes, "fetched to staging"),
            Err(e) => {
                warn!(url = %source.url, error = %e, "fetch failed");
                return Ok(report(SourceStatus::Failed(e.into())));
            }
        }

        match self.cache.put(&temp_path, &source.checksum, source.size) {
            Ok(entry) => {
                fs::copy(&entry.stored_at, &target)?;
                Ok(report(SourceStatus::Fetched))
            }
            Err(e @ (CacheError::ChecksumMismatch { .. } | CacheError::SizeMismatch { .. })) => {
                warn!(url = %source.url, error = %e, "integrity violation, source rejected");
                Ok(report(SourceStatus::Failed(SourceFailure::IntegrityViolation(
                    e.to_string(),
                ))))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Cache lookup honoring the force-refresh re-verification choice:
    /// a forced pull re-hashes the stored bytes before trusting them,
    /// and treats a tampered entry as a miss.
    fn usable_cache_entry(
        &self,
        source: &SourceDescriptor,
        force: bool,
    ) -> Result<Option<PathBuf>, CacheError> {
        if !self.cache.has(&source.checksum) {
            return Ok(None);
        }
        let path = self.cache.get(&source.checksum)?;
        if force {
            match source.checksum.verify_file(&path) {
                Ok(true) => {}
                Ok(false) => {
                    warn!(
                        digest = source.checksum.digest(),
                        "cache entry failed re-verification, evicting and refetching"
                    );
                    self.cache.evict(&source.checksum)?;
                    return Ok(None);
                }
                Err(e) => return Err(CacheError::Io(e)),
            }
        }
        Ok(Some(path))
    }
}

/// Derive the working file name from the URL path's last segment,
/// falling back to `source_<index>.<format>` when the URL has no
/// usable path.
fn derive_file_name(raw_url: &str, index: usize, format: &str) -> String {
    let fallback = || format!("source_{index}.{format}");
    let Ok(parsed) = url::Url::parse(raw_url) else {
        return fallback();
    };
    match parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
    {
        Some(name) => name.to_string(),
        None => fallback(),
    }
}
