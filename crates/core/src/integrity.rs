//! Integrity strings in the registry's SRI format (`<algo>-<base64>`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Digest algorithms accepted in upstream integrity strings.
///
/// `Sha512` is what the upstream publishes for modern packages; `Sha1`
/// appears only via the legacy `shasum` field of very old versions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha512,
    Sha256,
    Sha1,
}

impl HashAlgorithm {
    /// Canonical lowercase name used as the integrity string prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha512 => "sha512",
            Self::Sha256 => "sha256",
            Self::Sha1 => "sha1",
        }
    }
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        Self::Sha512
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sha512" => Ok(Self::Sha512),
            "sha256" => Ok(Self::Sha256),
            "sha1" => Ok(Self::Sha1),
            other => Err(crate::Error::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// An algorithm-prefixed base64 digest as published in `dist.integrity`.
///
/// Comparison is opaque string equality after canonicalization to
/// `<algo>-<base64>` with a lowercase algorithm prefix. The base64 payload
/// is never decoded; the upstream's encoding is taken as-is.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntegrityString(String);

impl IntegrityString {
    /// Build from an algorithm and a base64 digest payload.
    pub fn new(algorithm: HashAlgorithm, base64_digest: &str) -> Self {
        Self(format!("{}-{}", algorithm.as_str(), base64_digest))
    }

    /// Parse and canonicalize an upstream integrity string.
    ///
    /// An upstream may publish multiple space-separated entries; the first
    /// entry with a supported algorithm wins, strongest first is the
    /// upstream's convention.
    pub fn parse(s: &str) -> crate::Result<Self> {
        for entry in s.split_whitespace() {
            let Some((algo, digest)) = entry.split_once('-') else {
                continue;
            };
            if digest.is_empty() {
                continue;
            }
            if let Ok(algorithm) = algo.parse::<HashAlgorithm>() {
                return Ok(Self::new(algorithm, digest));
            }
        }
        Err(crate::Error::InvalidIntegrity(s.to_string()))
    }

    /// The algorithm declared by the prefix.
    pub fn algorithm(&self) -> HashAlgorithm {
        // The constructor guarantees a supported prefix.
        self.0
            .split_once('-')
            .and_then(|(a, _)| a.parse().ok())
            .unwrap_or_default()
    }

    /// The full canonical `<algo>-<base64>` form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for IntegrityString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IntegrityString({})", self.0)
    }
}

impl fmt::Display for IntegrityString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_sha512() {
        let s = IntegrityString::parse("sha512-abc123==").unwrap();
        assert_eq!(s.algorithm(), HashAlgorithm::Sha512);
        assert_eq!(s.as_str(), "sha512-abc123==");
    }

    #[test]
    fn parse_picks_first_supported_entry() {
        let s = IntegrityString::parse("md5-zzz sha512-abc sha256-def").unwrap();
        assert_eq!(s.algorithm(), HashAlgorithm::Sha512);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(IntegrityString::parse("not an integrity string").is_err());
        assert!(IntegrityString::parse("").is_err());
        assert!(IntegrityString::parse("sha512-").is_err());
    }

    #[test]
    fn canonical_form_is_stable() {
        let a = IntegrityString::parse("sha512-Q2hlY2s=").unwrap();
        let b = IntegrityString::new(HashAlgorithm::Sha512, "Q2hlY2s=");
        assert_eq!(a, b);
    }

    #[test]
    fn algorithm_from_str_case_insensitive() {
        assert_eq!(
            "SHA512".parse::<HashAlgorithm>().unwrap(),
            HashAlgorithm::Sha512
        );
        assert!("md5".parse::<HashAlgorithm>().is_err());
    }
}
