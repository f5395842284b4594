//! The dataset manifest document served by registries.
//!
//! A manifest describes one published version of a dataset: identity,
//! descriptive metadata, and the list of downloadable sources with
//! their publisher-declared sizes and checksums. The pull engine treats
//! manifests as read-only; declared checksums are the verification
//! ground truth and are only ever compared against freshly fetched
//! bytes, never recomputed from the cache.

use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::identifier::DatasetIdentifier;

/// Errors from checksum parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChecksumError {
    #[error("malformed checksum '{0}': expected <algorithm>:<hex-digest>")]
    Malformed(String),

    #[error("unsupported checksum algorithm '{0}': expected sha256 or sha512")]
    UnsupportedAlgorithm(String),

    #[error("invalid {algorithm} digest '{digest}': expected {expected} lowercase hex chars")]
    InvalidDigest {
        algorithm: ChecksumAlgorithm,
        digest: String,
        expected: usize,
    },
}

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChecksumAlgorithm {
    Sha256,
    Sha512,
}

impl ChecksumAlgorithm {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Hex digest length for this algorithm.
    fn hex_len(&self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }

    /// Compute the hex digest of `data`.
    pub fn digest_bytes(&self, data: &[u8]) -> String {
        match self {
            Self::Sha256 => hex::encode(<sha2::Sha256 as sha2::Digest>::digest(data)),
            Self::Sha512 => hex::encode(<sha2::Sha512 as sha2::Digest>::digest(data)),
        }
    }

    /// Compute the hex digest of a file, streaming in 64 KiB chunks.
    pub fn digest_file(&self, path: &Path) -> std::io::Result<String> {
        let mut file = std::fs::File::open(path)?;
        match self {
            Self::Sha256 => hash_reader::<sha2::Sha256>(&mut file),
            Self::Sha512 => hash_reader::<sha2::Sha512>(&mut file),
        }
    }
}

fn hash_reader<D: sha2::Digest>(reader: &mut impl Read) -> std::io::Result<String> {
    let mut hasher = D::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A publisher-declared checksum in `<algorithm>:<hex-digest>` wire form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Checksum {
    algorithm: ChecksumAlgorithm,
    digest: String,
}

impl Checksum {
    pub fn new(algorithm: ChecksumAlgorithm, digest: &str) -> Result<Self, ChecksumError> {
        let digest = digest.to_string();
        if digest.len() != algorithm.hex_len()
            || !digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        {
            return Err(ChecksumError::InvalidDigest {
                algorithm,
                digest,
                expected: algorithm.hex_len(),
            });
        }
        Ok(Self { algorithm, digest })
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    /// The hex digest, without the algorithm prefix.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Recompute this checksum's algorithm over `path` and compare.
    pub fn verify_file(&self, path: &Path) -> std::io::Result<bool> {
        Ok(self.algorithm.digest_file(path)? == self.digest)
    }
}

impl FromStr for Checksum {
    type Err = ChecksumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (algo, digest) = s
            .split_once(':')
            .ok_or_else(|| ChecksumError::Malformed(s.to_string()))?;
        let algorithm = match algo {
            "sha256" => ChecksumAlgorithm::Sha256,
            "sha512" => ChecksumAlgorithm::Sha512,
            other => return Err(ChecksumError::UnsupportedAlgorithm(other.to_string())),
        };
        Self::new(algorithm, digest)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.digest)
    }
}

impl Serialize for Checksum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Checksum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One downloadable file belonging to a dataset version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub url: String,
    pub format: String,
    pub size: u64,
    pub checksum: Checksum,
}

/// Who published the dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Errors from manifest validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManifestError {
    #[error("manifest id '{0}' is not a valid publisher.namespace.name identifier")]
    InvalidId(String),

    #[error("manifest version must not be empty")]
    EmptyVersion,

    #[error("manifest title must not be empty")]
    EmptyTitle,

    #[error("publisher name must not be empty")]
    EmptyPublisherName,

    #[error("manifest declares no sources (at least one is required)")]
    NoSources,

    #[error("source url '{0}' is not a valid http(s) URL")]
    InvalidSourceUrl(String),

    #[error("source format must not be empty (url: {0})")]
    EmptyFormat(String),
}

/// A dataset version's metadata document, as served by a registry.
///
/// `id` is the three-part identifier without a version suffix; the
/// concrete version lives in `version`. Use [`DatasetManifest::identifier`]
/// for the combined form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetManifest {
    pub id: String,
    pub version: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    pub publisher: PublisherInfo,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub sources: Vec<SourceDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
}

impl DatasetManifest {
    /// The version-pinned identifier this manifest describes.
    pub fn identifier(&self) -> Result<DatasetIdentifier, ManifestError> {
        let id: DatasetIdentifier = self
            .id
            .parse()
            .map_err(|_| ManifestError::InvalidId(self.id.clone()))?;
        if id.version().is_some() {
            return Err(ManifestError::InvalidId(self.id.clone()));
        }
        Ok(id.with_version(&self.version))
    }

    /// Check the structural rules a registry must enforce before serving
    /// a manifest.
    pub fn validate(&self) -> Result<(), ManifestError> {
        self.identifier()?;
        if self.version.trim().is_empty() {
            return Err(ManifestError::EmptyVersion);
        }
        if self.title.trim().is_empty() {
            return Err(ManifestError::EmptyTitle);
        }
        if self.publisher.name.trim().is_empty() {
            return Err(ManifestError::EmptyPublisherName);
        }
        if self.sources.is_empty() {
            return Err(ManifestError::NoSources);
        }
        for source in &self.sources {
            if !is_http_url(&source.url) {
                return Err(ManifestError::InvalidSourceUrl(source.url.clone()));
            }
            if source.format.trim().is_empty() {
                return Err(ManifestError::EmptyFormat(source.url.clone()));
            }
        }
        Ok(())
    }
}

fn is_http_url(raw: &str) -> bool {
    match url::Url::parse(raw) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sha256_of(data: &[u8]) -> Checksum {
        let digest = ChecksumAlgorithm::Sha256.digest_bytes(data);
        Checksum::new(ChecksumAlgorithm::Sha256, &digest).unwrap()
    }

    fn manifest() -> DatasetManifest {
        DatasetManifest {
            id: "acme.weather.oslo-hourly".to_string(),
            version: "2024-01".to_string(),
            title: "Oslo hourly weather".to_string(),
            description: Some("Hourly observations".to_string()),
            license: Some("CC-BY-4.0".to_string()),
            publisher: PublisherInfo {
                name: "Acme Data".to_string(),
                url: Some("https://acme.example".to_string()),
            },
            tags: vec!["weather".to_string()],
            sources: vec![SourceDescriptor {
                url: "https://x.example/data.csv".to_string(),
                format: "csv".to_string(),
                size: 1024,
                checksum: sha256_of(b"payload"),
            }],
            created: None,
            updated: None,
        }
    }

    #[test]
    fn checksum_wire_roundtrip() {
        let raw = format!("sha256:{}", "ab".repeat(32));
        let parsed: Checksum = raw.parse().unwrap();
        assert_eq!(parsed.to_string(), raw);
        assert_eq!(parsed.algorithm(), ChecksumAlgorithm::Sha256);
    }

    #[test]
    fn checksum_rejects_md5_and_garbage() {
        assert!(matches!(
            format!("md5:{}", "ab".repeat(16)).parse::<Checksum>(),
            Err(ChecksumError::UnsupportedAlgorithm(_))
        ));
        assert!(matches!(
            "no-separator".parse::<Checksum>(),
            Err(ChecksumError::Malformed(_))
        ));
        assert!(matches!(
            "sha256:short".parse::<Checksum>(),
            Err(ChecksumError::InvalidDigest { .. })
        ));
        // Uppercase hex is not the canonical wire form.
        assert!(format!("sha256:{}", "AB".repeat(32)).parse::<Checksum>().is_err());
    }

    #[test]
    fn checksum_digest_file_matches_digest_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        std::fs::write(&path, b"some file contents").unwrap();

        let from_file = ChecksumAlgorithm::Sha256.digest_file(&path).unwrap();
        let from_bytes = ChecksumAlgorithm::Sha256.digest_bytes(b"some file contents");
        assert_eq!(from_file, from_bytes);
    }

    #[test]
    fn verify_file_detects_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        std::fs::write(&path, b"actual bytes").unwrap();

        assert!(sha256_of(b"actual bytes").verify_file(&path).unwrap());
        assert!(!sha256_of(b"declared bytes").verify_file(&path).unwrap());
    }

    #[test]
    fn manifest_json_roundtrip() {
        let m = manifest();
        let json = serde_json::to_string(&m).unwrap();
        let back: DatasetManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn manifest_checksum_serializes_as_prefixed_string() {
        let json = serde_json::to_value(manifest()).unwrap();
        let checksum = json["sources"][0]["checksum"].as_str().unwrap();
        assert!(checksum.starts_with("sha256:"));
    }

    #[test]
    fn identifier_is_version_pinned() {
        let id = manifest().identifier().unwrap();
        assert_eq!(id.to_string(), "acme.weather.oslo-hourly:2024-01");
    }

    #[test]
    fn validate_accepts_wellformed_manifest() {
        assert!(manifest().validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_documents() {
        let mut m = manifest();
        m.id = "Not.Valid.ID!".to_string();
        assert!(matches!(m.validate(), Err(ManifestError::InvalidId(_))));

        let mut m = manifest();
        m.title = "  ".to_string();
        assert_eq!(m.validate(), Err(ManifestError::EmptyTitle));

        let mut m = manifest();
        m.sources.clear();
        assert_eq!(m.validate(), Err(ManifestError::NoSources));

        let mut m = manifest();
        m.sources[0].url = "ftp://x.example/data.csv".to_string();
        assert!(matches!(m.validate(), Err(ManifestError::InvalidSourceUrl(_))));
    }
}
