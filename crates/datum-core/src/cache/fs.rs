//! Filesystem-backed cache with git-style 2-char sharding.
//!
//! Layout: `<root>/objects/<first 2 hex chars>/<remaining hex chars>`
//!
//! Promotion protocol: the candidate file is fully re-hashed and
//! size-checked first, then staged to a temporary name inside the shard
//! directory and atomically renamed into place. The rename is the commit
//! point; concurrent readers never observe a partially written entry,
//! and a second writer racing on the same digest lands the identical
//! bytes, so no cross-process lock is needed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tempfile::NamedTempFile;
use tracing::debug;

use super::{CacheEntry, CacheError, CacheStats, Result};
use crate::manifest::Checksum;

pub struct FsCache {
    root: PathBuf,
    objects_dir: PathBuf,
}

impl FsCache {
    /// Open (or create) a cache rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let objects_dir = root.join("objects");
        fs::create_dir_all(&objects_dir)?;
        Ok(Self { root, objects_dir })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, digest: &str) -> PathBuf {
        self.objects_dir.join(&digest[..2]).join(&digest[2..])
    }

    /// Existence check by digest. Stat only, no content reads.
    pub fn has(&self, checksum: &Checksum) -> bool {
        self.entry_path(checksum.digest()).is_file()
    }

    /// Verify `temp_path` against `checksum` and `declared_size`, then
    /// promote it into the cache.
    ///
    /// The temp file is consumed either way: discarded on mismatch (the
    /// cache is never polluted with unverified content), moved into the
    /// store on success. If the destination already exists after
    /// verification, the call is a successful no-op — the racing writer
    /// committed identical bytes.
    pub fn put(
        &self,
        temp_path: &Path,
        checksum: &Checksum,
        declared_size: u64,
    ) -> Result<CacheEntry> {
        let outcome = self.verify_and_promote(temp_path, checksum, declared_size);
        // Consume the staging file regardless of outcome.
        let _ = fs::remove_file(temp_path);
        outcome
    }

    fn verify_and_promote(
        &self,
        temp_path: &Path,
        checksum: &Checksum,
        declared_size: u64,
    ) -> Result<CacheEntry> {
        let actual_size = fs::metadata(temp_path)?.len();
        if actual_size != declared_size {
            return Err(CacheError::SizeMismatch {
                declared: declared_size,
                actual: actual_size,
            });
        }

        let actual = checksum.algorithm().digest_file(temp_path)?;
        if actual != checksum.digest() {
            return Err(CacheError::ChecksumMismatch {
                expected: checksum.digest().to_string(),
                actual,
            });
        }

        let dest = self.entry_path(checksum.digest());
        if dest.is_file() {
            debug!(digest = checksum.digest(), "cache entry already present");
            return self.entry_for(checksum.digest(), &dest);
        }

        let shard_dir = dest
            .parent()
            .ok_or_else(|| io::Error::other("entry path has no parent"))?;
        fs::create_dir_all(shard_dir)?;

        // Stage inside the shard directory so the final rename is atomic
        // on the same filesystem.
        let staged = NamedTempFile::new_in(shard_dir)?;
        fs::copy(temp_path, staged.path())?;
        staged.persist(&dest).map_err(|e| CacheError::Io(e.error))?;

        debug!(digest = checksum.digest(), size = declared_size, "cache entry committed");
        self.entry_for(checksum.digest(), &dest)
    }

    /// Stable on-disk location of a verified entry.
    pub fn get(&self, checksum: &Checksum) -> Result<PathBuf> {
        let path = self.entry_path(checksum.digest());
        if path.is_file() {
            Ok(path)
        } else {
            Err(CacheError::NotFound(checksum.digest().to_string()))
        }
    }

    /// Aggregate accounting by full enumeration. Staging temp files
    /// (non-hex names) are ignored.
    pub fn stats(&self) -> Result<CacheStats> {
        let mut entry_count = 0u64;
        let mut total_bytes = 0u64;
        for shard in read_dir_or_empty(&self.objects_dir)? {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }
            for entry in fs::read_dir(shard.path())? {
                let entry = entry?;
                if !entry.file_type()?.is_file() || !is_hex_name(&entry.file_name()) {
                    continue;
                }
                entry_count += 1;
                total_bytes += entry.metadata()?.len();
            }
        }
        Ok(CacheStats {
            entry_count,
            total_bytes,
        })
    }

    /// Drop a single entry. Only used when re-verification under
    /// force-refresh finds the stored bytes no longer match their
    /// digest, i.e. the entry was tampered with externally.
    pub fn evict(&self, checksum: &Checksum) -> Result<()> {
        let path = self.entry_path(checksum.digest());
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Bulk-delete every entry and recreate an empty store.
    pub fn clear(&self) -> Result<()> {
        fs::remove_dir_all(&self.objects_dir)?;
        fs::create_dir_all(&self.objects_dir)?;
        Ok(())
    }

    fn entry_for(&self, digest: &str, path: &Path) -> Result<CacheEntry> {
        let meta = fs::metadata(path)?;
        Ok(CacheEntry {
            checksum: digest.to_string(),
            size_bytes: meta.len(),
            stored_at: path.to_path_buf(),
            last_verified: Utc::now(),
        })
    }
}

fn read_dir_or_empty(path: &Path) -> io::Result<fs::ReadDir> {
    fs::create_dir_all(path)?;
    fs::read_dir(path)
}

fn is_hex_name(name: &std::ffi::OsStr) -> bool {
    name.to_str()
        .is_some_and(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit()))
}
