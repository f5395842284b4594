//! datum Core Library
//!
//! Resolves dataset identifiers against a registry, fetches source
//! files, verifies them against publisher-declared checksums, and
//! deduplicates identical content across datasets through a local
//! content-addressable cache.

pub mod cache;
pub mod fetch;
pub mod identifier;
pub mod manifest;
pub mod pull;
pub mod registry;
pub mod telemetry;
pub mod util;

pub use cache::{CacheEntry, CacheError, CacheStats, FsCache};
pub use fetch::{FetchError, Fetcher, HttpFetcher};
pub use identifier::{DatasetIdentifier, ParseError};
pub use manifest::{
    Checksum, ChecksumAlgorithm, ChecksumError, DatasetManifest, ManifestError, PublisherInfo,
    SourceDescriptor,
};
pub use pull::{
    PullEngine, PullError, PullOptions, PullReport, SourceFailure, SourceReport, SourceStatus,
};
pub use registry::{LocalRegistry, Registry, RegistryError, RemoteRegistry};
pub use telemetry::init_tracing;
pub use util::fmt_size;

/// datum version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
