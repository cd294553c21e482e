use super::NpmRange;
use crate::error::{Error, Result};
use semver::Version;
use std::fmt;
use url::Url;

/// What a referrer asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSpec {
    Range(NpmRange),
    /// Absolute `http:`, `https:` or `file:` URL of a package tarball.
    Url(String),
    /// `npm:` alias. Recognized, not supported.
    Alias(String),
}

impl VersionSpec {
    /// Ranges win over URLs, so a bare version is never mistaken for a URL.
    pub fn parse(name: &str, raw: &str) -> Result<Self> {
        let trimmed = raw.trim();

        if trimmed.starts_with("npm:") {
            return Ok(VersionSpec::Alias(trimmed.to_string()));
        }

        if let Some(range) = NpmRange::parse(trimmed) {
            return Ok(VersionSpec::Range(range));
        }

        match Url::parse(trimmed) {
            Ok(url) if matches!(url.scheme(), "http" | "https" | "file") => {
                Ok(VersionSpec::Url(trimmed.to_string()))
            }
            Ok(_) => Err(Error::UnknownProtocol { name: name.to_string(), spec: trimmed.to_string() }),
            Err(_) => Err(Error::InvalidSpec { name: name.to_string(), spec: trimmed.to_string() }),
        }
    }

    pub fn raw(&self) -> &str {
        match self {
            VersionSpec::Range(range) => range.raw(),
            VersionSpec::Url(url) | VersionSpec::Alias(url) => url,
        }
    }

    pub fn as_range(&self) -> Option<&NpmRange> {
        match self {
            VersionSpec::Range(range) => Some(range),
            _ => None,
        }
    }

    /// URLs are satisfied only by themselves; ranges only by semver versions.
    pub fn is_satisfied_by(&self, version: &ResolvedVersion) -> bool {
        match (self, version) {
            (VersionSpec::Range(range), ResolvedVersion::Semver(v)) => range.satisfies(v),
            (VersionSpec::Url(url), ResolvedVersion::Url(resolved)) => url == resolved,
            _ => false,
        }
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.raw())
    }
}

/// A concrete version: a registry semver version or the tarball URL itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResolvedVersion {
    Semver(Version),
    Url(String),
}

impl ResolvedVersion {
    pub fn parse(raw: &str) -> Option<Self> {
        if let Ok(v) = Version::parse(raw) {
            return Some(ResolvedVersion::Semver(v));
        }
        Url::parse(raw).ok().map(|_| ResolvedVersion::Url(raw.to_string()))
    }

    pub fn as_semver(&self) -> Option<&Version> {
        match self {
            ResolvedVersion::Semver(v) => Some(v),
            ResolvedVersion::Url(_) => None,
        }
    }

    pub fn is_url(&self) -> bool {
        matches!(self, ResolvedVersion::Url(_))
    }
}

impl fmt::Display for ResolvedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedVersion::Semver(v) => write!(f, "{v}"),
            ResolvedVersion::Url(url) => f.write_str(url),
        }
    }
}
