//! datum - dataset package manager CLI
//!
//! ## Commands
//!
//! - `pull`: Download a dataset by identifier, verify checksums, and
//!   deduplicate through the local content-addressable cache
//! - `cache stats`: Show cache entry count and disk usage
//! - `cache clear`: Delete every cached entry

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;

use datum_core::{
    fmt_size, DatasetIdentifier, FsCache, HttpFetcher, LocalRegistry, PullEngine, PullOptions,
    Registry, RemoteRegistry,
};

#[derive(Parser)]
#[command(name = "datum")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Pull datasets by identifier, verified and deduplicated", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Registry location: an http(s) URL for a remote registry, or a
    /// directory path for a local one
    #[arg(long, global = true, env = "DATUM_REGISTRY")]
    registry: Option<String>,

    /// Cache root directory
    #[arg(long, global = true, env = "DATUM_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a dataset by identifier (publisher.namespace.name[:version])
    ///
    /// Omit :version to resolve the latest published version.
    Pull {
        /// Dataset identifier
        identifier: String,

        /// Re-materialize files that already exist locally
        #[arg(short, long)]
        force: bool,

        /// Output directory (default: ./<dataset name>)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Manage the local content-addressable cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show entry count and total disk usage
    Stats,

    /// Delete every cached entry
    Clear {
        /// Skip the confirmation requirement
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    datum_core::init_tracing(cli.json, level);

    let cache = FsCache::open(cache_root(cli.cache_dir.clone())?)
        .context("failed to open the cache")?;

    match cli.command {
        Commands::Pull {
            identifier,
            force,
            output,
        } => cmd_pull(cli.registry.as_deref(), cache, &identifier, force, output).await,
        Commands::Cache { action } => match action {
            CacheAction::Stats => cmd_cache_stats(&cache),
            CacheAction::Clear { yes } => cmd_cache_clear(&cache, yes),
        },
    }
}

fn datum_home() -> Result<PathBuf> {
    let home = dirs::home_dir().context("could not determine the home directory")?;
    Ok(home.join(".datum"))
}

fn cache_root(flag: Option<PathBuf>) -> Result<PathBuf> {
    match flag {
        Some(path) => Ok(path),
        None => Ok(datum_home()?.join("cache")),
    }
}

fn open_registry(flag: Option<&str>) -> Result<Box<dyn Registry>> {
    match flag {
        Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
            let registry = RemoteRegistry::new(url)
                .with_context(|| format!("failed to reach registry at {url}"))?;
            Ok(Box::new(registry))
        }
        Some(path) => Ok(Box::new(LocalRegistry::new(path))),
        None => Ok(Box::new(LocalRegistry::new(datum_home()?.join("registry")))),
    }
}

/// Download a dataset, verify checksums, and materialize it locally.
async fn cmd_pull(
    registry_flag: Option<&str>,
    cache: FsCache,
    raw_identifier: &str,
    force: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let id: DatasetIdentifier = raw_identifier
        .parse()
        .context("expected publisher.namespace.name[:version]")?;

    let registry = open_registry(registry_flag)?;
    let fetcher = HttpFetcher::new().context("failed to build the HTTP client")?;
    let engine = PullEngine::new(registry, fetcher, cache);

    let options = PullOptions {
        output_dir: output.unwrap_or_else(|| PathBuf::from(".").join(id.name())),
        force,
    };

    let report = engine.pull(&id, &options).await?;

    println!("{} ({})", report.id, report.title);
    for source in &report.sources {
        println!("  {:<28} {}", source.file_name, source.status);
    }

    if report.succeeded() {
        println!("Done: {} file(s) in {}", report.sources.len(), report.output_dir.display());
        Ok(())
    } else {
        for failed in report.failures() {
            eprintln!("failed: {} ({})", failed.url, failed.status);
        }
        anyhow::bail!(
            "{} of {} source(s) failed",
            report.failures().count(),
            report.sources.len()
        )
    }
}

/// Show cache entry count and total disk usage.
fn cmd_cache_stats(cache: &FsCache) -> Result<()> {
    let stats = cache.stats().context("failed to enumerate the cache")?;
    println!("Cache:   {}", cache.root().display());
    println!("Entries: {}", stats.entry_count);
    println!("Total:   {}", fmt_size(stats.total_bytes));
    Ok(())
}

/// Delete every cached entry.
fn cmd_cache_clear(cache: &FsCache, yes: bool) -> Result<()> {
    let stats = cache.stats().context("failed to enumerate the cache")?;
    if stats.entry_count == 0 {
        println!("Cache is already empty.");
        return Ok(());
    }
    if !yes {
        anyhow::bail!(
            "refusing to delete {} entries ({}) without --yes",
            stats.entry_count,
            fmt_size(stats.total_bytes)
        );
    }
    cache.clear().context("failed to clear the cache")?;
    println!("Cache cleared ({} freed)", fmt_size(stats.total_bytes));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_clear_requires_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::open(dir.path()).unwrap();

        // Empty cache: nothing to confirm.
        assert!(cmd_cache_clear(&cache, false).is_ok());

        let staged = dir.path().join("staged");
        std::fs::write(&staged, b"entry").unwrap();
        let digest = datum_core::ChecksumAlgorithm::Sha256.digest_bytes(b"entry");
        let checksum =
            datum_core::Checksum::new(datum_core::ChecksumAlgorithm::Sha256, &digest).unwrap();
        cache.put(&staged, &checksum, 5).unwrap();

        assert!(cmd_cache_clear(&cache, false).is_err());
        assert!(cmd_cache_clear(&cache, true).is_ok());
        assert_eq!(cache.stats().unwrap().entry_count, 0);
    }

    #[test]
    fn registry_flag_selects_backend() {
        assert!(open_registry(Some("https://registry.example")).is_ok());
        assert!(open_registry(Some("/tmp/registry")).is_ok());
    }
}
