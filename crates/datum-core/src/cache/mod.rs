//! Content-addressable cache.
//!
//! Verified bytes are stored once per checksum digest, regardless of how
//! many datasets or versions reference them. The cache is the integrity
//! and dedup boundary: nothing enters it without passing a full
//! recompute-and-compare against the publisher-declared checksum, and
//! once an entry is committed its bytes never change.

pub mod fs;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use fs::FsCache;

/// Errors from cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Fetched bytes do not hash to the declared digest. The staged file
    /// has been discarded; the cache holds no entry for this digest.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Fetched byte count differs from the publisher-declared size.
    #[error("size mismatch: declared {declared} bytes, got {actual}")]
    SizeMismatch { declared: u64, actual: u64 },

    #[error("cache entry not found for digest {0}")]
    NotFound(String),

    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// A committed cache entry. One entry exists per unique digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Hex digest this entry is addressed by.
    pub checksum: String,
    pub size_bytes: u64,
    /// Stable on-disk location of the verified bytes.
    pub stored_at: PathBuf,
    pub last_verified: DateTime<Utc>,
}

/// Aggregate cache accounting, recomputed by enumeration so it stays
/// correct even if entries were added or removed externally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entry_count: u64,
    pub total_bytes: u64,
}
