//! Dataset identifier parsing.
//!
//! Identifiers follow `publisher.namespace.name[:version]`. Each of the
//! three dot-separated segments is a lowercase slug (letters, digits,
//! hyphens; no leading or trailing hyphen). Omitting `:version` means
//! "resolve to the latest published version".

use std::fmt;
use std::str::FromStr;

/// Errors from identifier parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("malformed identifier '{input}': {reason}")]
    MalformedIdentifier { input: String, reason: String },
}

impl ParseError {
    fn malformed(input: &str, reason: impl Into<String>) -> Self {
        Self::MalformedIdentifier {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// A parsed dataset reference. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetIdentifier {
    publisher: String,
    namespace: String,
    name: String,
    version: Option<String>,
}

impl DatasetIdentifier {
    pub fn publisher(&self) -> &str {
        &self.publisher
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Concrete version, or `None` for "latest".
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// The three-part id without any version suffix.
    pub fn base(&self) -> String {
        format!("{}.{}.{}", self.publisher, self.namespace, self.name)
    }

    /// Copy of this identifier pinned to a concrete version.
    pub fn with_version(&self, version: &str) -> Self {
        Self {
            publisher: self.publisher.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            version: Some(version.to_string()),
        }
    }
}

/// A slug is lowercase letters, digits, and hyphens, with no leading or
/// trailing hyphen.
fn is_slug(s: &str) -> bool {
    if s.is_empty() || s.starts_with('-') || s.ends_with('-') {
        return false;
    }
    s.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

impl FromStr for DatasetIdentifier {
    type Err = ParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (base, version) = match raw.split_once(':') {
            Some((base, version)) => {
                if version.is_empty() {
                    return Err(ParseError::malformed(raw, "empty version after ':'"));
                }
                if version.contains(':') {
                    return Err(ParseError::malformed(raw, "more than one ':' separator"));
                }
                (base, Some(version.to_string()))
            }
            None => (raw, None),
        };

        let segments: Vec<&str> = base.split('.').collect();
        if segments.len() != 3 {
            return Err(ParseError::malformed(
                raw,
                format!(
                    "expected publisher.namespace.name ({} dot-segment(s) found)",
                    segments.len()
                ),
            ));
        }
        for (label, segment) in ["publisher", "namespace", "name"].iter().zip(&segments) {
            if !is_slug(segment) {
                return Err(ParseError::malformed(
                    raw,
                    format!(
                        "{label} segment '{segment}' is not a lowercase slug \
                         (letters, digits, hyphens; no leading/trailing hyphen)"
                    ),
                ));
            }
        }

        Ok(Self {
            publisher: segments[0].to_string(),
            namespace: segments[1].to_string(),
            name: segments[2].to_string(),
            version,
        })
    }
}

impl fmt::Display for DatasetIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.publisher, self.namespace, self.name)?;
        if let Some(version) = &self.version {
            write!(f, ":{version}")?;
        }
        Ok(())
    }
}
