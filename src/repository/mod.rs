//! Version resolution, manifests and package content, backed by the registry,
//! an on-disk package-info cache and a content-addressable store (CAS).
//!
//! Every cache directory may be shared between processes. Writers stage into a
//! `<key>.<pid>.part` sibling and rename it into place; readers ignore `.part` keys.

use crate::archive::Archive;
use crate::error::{Error, IoContext, Result};
use crate::fetch::Fetch;
use crate::fs::FileSystem;
use crate::fsutil;
use crate::manifest::{self, Manifest, Packument};
use crate::resolver::{ResolvedVersion, VersionSpec};
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use semver::Version;
use sha2::{Digest, Sha512};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

mod flight;

pub use flight::Flight;

pub const PART_SUFFIX: &str = ".part";

#[derive(Debug, Clone, Default)]
pub struct RepositoryOptions {
    pub registry_url: String,
    pub cas_dir: Option<PathBuf>,
    pub info_dir: Option<PathBuf>,
    /// Names that never touch the CAS (overridden packages).
    pub uncached: BTreeSet<String>,
    /// Manifest key to read dependencies from instead of `dependencies`.
    pub dependencies_key: Option<String>,
}

pub struct Repository {
    fs: Arc<dyn FileSystem>,
    fetch: Arc<dyn Fetch>,
    options: RepositoryOptions,
    info: Flight<String, Arc<Packument>>,
    archives: Flight<String, Arc<Archive>>,
    cas: Flight<String, PathBuf>,
}

/// `@scope/name` becomes `@scope+name`.
pub fn serialize_name(name: &str) -> String {
    name.replace('/', "+")
}

pub fn serialize_version(version: &ResolvedVersion) -> String {
    match version {
        ResolvedVersion::Semver(v) => v.to_string(),
        ResolvedVersion::Url(url) => url.replace(['/', '@', ':'], "+"),
    }
}

/// CAS key of one package version: `<name>@<version>`, both serialized.
pub fn cas_key(name: &str, version: &ResolvedVersion) -> String {
    format!("{}@{}", serialize_name(name), serialize_version(version))
}

impl Repository {
    pub fn new(fs: Arc<dyn FileSystem>, fetch: Arc<dyn Fetch>, options: RepositoryOptions) -> Self {
        Self {
            fs,
            fetch,
            options,
            info: Flight::new(),
            archives: Flight::new(),
            cas: Flight::new(),
        }
    }

    fn cas_dir_for(&self, name: &str) -> Option<&Path> {
        if self.options.uncached.contains(name) {
            return None;
        }
        self.options.cas_dir.as_deref()
    }

    fn info_path(&self, name: &str) -> Option<PathBuf> {
        self.options.info_dir.as_ref().map(|dir| dir.join(serialize_name(name)))
    }

    fn registry_package_url(&self, name: &str) -> String {
        format!("{}/{}", self.options.registry_url.trim_end_matches('/'), name)
    }

    /// Concrete version for a requested spec.
    ///
    /// Ranges prefer a version already in the CAS, then the cached package info,
    /// then the package info fetched fresh once more.
    pub async fn get_satisfying_version(&self, name: &str, spec: &VersionSpec) -> Result<ResolvedVersion> {
        let range = match spec {
            VersionSpec::Range(range) => range,
            VersionSpec::Url(url) => return Ok(ResolvedVersion::Url(url.clone())),
            VersionSpec::Alias(raw) => {
                return Err(Error::UnknownProtocol { name: name.to_string(), spec: raw.clone() })
            }
        };

        if let Some(cas_dir) = self.cas_dir_for(name) {
            let cached = self.cas_versions(cas_dir, name).await?;
            if let Some(v) = range.max_satisfying(&cached) {
                debug!(package = name, range = %range, version = %v, "resolved from cas");
                return Ok(ResolvedVersion::Semver(v.clone()));
            }
        }

        let info = self.package_info(name).await?;
        if let Some(v) = range.max_satisfying(&info.semver_versions()) {
            debug!(package = name, range = %range, version = %v, "resolved from package info");
            return Ok(ResolvedVersion::Semver(v.clone()));
        }

        debug!(package = name, range = %range, "no match in cached info, refetching");
        self.invalidate_package_info(name).await?;
        let info = self.package_info(name).await?;
        match range.max_satisfying(&info.semver_versions()) {
            Some(v) => Ok(ResolvedVersion::Semver(v.clone())),
            None => Err(Error::NotSatisfiable { name: name.to_string(), range: range.to_string() }),
        }
    }

    /// Declared dependencies of one resolved version.
    pub async fn get_version_dependencies(
        &self,
        name: &str,
        version: &ResolvedVersion,
    ) -> Result<BTreeMap<String, String>> {
        let key = self.options.dependencies_key.as_deref();

        if let Some(cas_dir) = self.cas_dir_for(name) {
            let path = cas_dir.join(cas_key(name, version)).join("package.json");
            if fsutil::exists(self.fs.as_ref(), &path).await? {
                let cached = manifest::load(self.fs.as_ref(), &path).await?;
                return Ok(cached.dependency_specs(key));
            }
        }

        match version {
            ResolvedVersion::Url(url) => {
                let archive = self.archive(url).await?;
                let manifest = Manifest::from_slice(archive.manifest_bytes()?, url)?;
                Ok(manifest.dependency_specs(key))
            }
            ResolvedVersion::Semver(v) => {
                let info = self.package_info(name).await?;
                info.manifest(v)?
                    .map(|m| m.dependency_specs(key))
                    .ok_or_else(|| Error::ManifestNotFound { name: name.to_string(), version: v.to_string() })
            }
        }
    }

    /// Materialize one package version at `target` and stamp its installed version.
    pub async fn install(&self, name: &str, version: &ResolvedVersion, target: &Path) -> Result<()> {
        let fs = self.fs.as_ref();
        match self.cas_dir_for(name) {
            Some(cas_dir) => {
                let entry = self.ensure_cas_entry(cas_dir, name, version).await?;
                fsutil::remove_if_exists(fs, target).await?;
                if let Some(parent) = target.parent() {
                    fsutil::ensure_dir(fs, parent).await?;
                }
                fsutil::link_recursive(fs, &entry, target).await?;
            }
            None => {
                let archive = self.package_archive(name, version).await?;
                fsutil::remove_if_exists(fs, target).await?;
                archive.extract(fs, target).await?;
            }
        }
        debug!(package = name, version = %version, target = %target.display(), "installed");
        manifest::stamp_installed_version(fs, target, &version.to_string()).await
    }

    /// Semver versions of `name` present in the CAS.
    async fn cas_versions(&self, cas_dir: &Path, name: &str) -> Result<Vec<Version>> {
        if !fsutil::exists(self.fs.as_ref(), cas_dir).await? {
            return Ok(Vec::new());
        }
        let prefix = format!("{}@", serialize_name(name));
        let entries = self.fs.read_dir(cas_dir).await.at(cas_dir)?;
        Ok(entries
            .iter()
            .filter(|key| !key.ends_with(PART_SUFFIX))
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter_map(|v| Version::parse(v).ok())
            .collect())
    }

    /// Path of the finished CAS entry, downloading it first if needed.
    async fn ensure_cas_entry(&self, cas_dir: &Path, name: &str, version: &ResolvedVersion) -> Result<PathBuf> {
        let key = cas_key(name, version);
        self.cas
            .get_or_try_init(&key, || async {
                let fs = self.fs.as_ref();
                let entry = cas_dir.join(&key);
                if fsutil::exists(fs, &entry).await? {
                    return Ok(entry);
                }
                let archive = self.package_archive(name, version).await?;
                let part = cas_dir.join(fsutil::part_name(&key));
                fsutil::remove_if_exists(fs, &part).await?;
                archive.extract(fs, &part).await?;
                if let Err(e) = fs.rename(&part, &entry).await {
                    // Another writer committed the same key first.
                    if !fsutil::exists(fs, &entry).await? {
                        return Err(Error::io(&entry, e));
                    }
                    debug!(key = %key, "cas entry appeared concurrently, discarding ours");
                    fsutil::remove_if_exists(fs, &part).await?;
                } else {
                    info!(key = %key, "stored in cas");
                }
                Ok::<_, Error>(entry)
            })
            .await
    }

    /// Tarball of one version, verified against the registry's integrity when given.
    async fn package_archive(&self, name: &str, version: &ResolvedVersion) -> Result<Arc<Archive>> {
        let v = match version {
            ResolvedVersion::Url(url) => return self.archive(url).await,
            ResolvedVersion::Semver(v) => v,
        };
        let info = self.package_info(name).await?;
        let dist = info
            .manifest(v)?
            .and_then(|m| m.dist)
            .ok_or_else(|| Error::ManifestNotFound { name: name.to_string(), version: v.to_string() })?;
        let body = self.download(&dist.tarball).await?;
        if let Some(integrity) = &dist.integrity {
            verify_integrity(name, v, integrity, &body)?;
        }
        Ok(Arc::new(Archive::from_tgz(&body, &dist.tarball)?))
    }

    /// Tarball behind a URL spec, downloaded once per repository.
    async fn archive(&self, url: &str) -> Result<Arc<Archive>> {
        self.archives
            .get_or_try_init(&url.to_string(), || async {
                let body = self.download(url).await?;
                Ok::<_, Error>(Arc::new(Archive::from_tgz(&body, url)?))
            })
            .await
    }

    /// Package info for `name`, from the info cache directory or the registry.
    pub async fn package_info(&self, name: &str) -> Result<Arc<Packument>> {
        self.info
            .get_or_try_init(&name.to_string(), || async {
                let fs = self.fs.as_ref();
                let cached = self.info_path(name);
                if let Some(path) = &cached {
                    if fsutil::exists(fs, path).await? {
                        let data = fs.read(path).await.at(path)?;
                        debug!(package = name, path = %path.display(), "package info from disk");
                        return parse_packument(&data, &path.display().to_string());
                    }
                }

                let url = self.registry_package_url(name);
                let body = self.download(&url).await?;
                let info = parse_packument(&body, &url)?;
                if let (Some(path), Some(dir)) = (&cached, self.options.info_dir.as_deref()) {
                    fsutil::ensure_dir(fs, dir).await?;
                    fsutil::write_atomic(fs, path, &body).await?;
                }
                Ok::<_, Error>(info)
            })
            .await
    }

    /// Drop the memoized and on-disk package info for `name`.
    pub async fn invalidate_package_info(&self, name: &str) -> Result<()> {
        self.info.invalidate(&name.to_string());
        if let Some(path) = self.info_path(name) {
            fsutil::remove_if_exists(self.fs.as_ref(), &path).await?;
        }
        Ok(())
    }

    async fn download(&self, url: &str) -> Result<Bytes> {
        debug!(url, "GET");
        let resp = self
            .fetch
            .fetch(url)
            .await
            .map_err(|message| Error::Fetch { url: url.to_string(), message })?;
        if !resp.is_success() {
            warn!(url, status = resp.status, "fetch failed");
            return Err(Error::Http { url: url.to_string(), status: resp.status });
        }
        Ok(resp.body)
    }
}

fn parse_packument(data: &[u8], context: &str) -> Result<Arc<Packument>> {
    serde_json::from_slice(data).map(Arc::new).map_err(|e| Error::json(context, e))
}

/// Check a `sha512-<base64>` SRI string against the downloaded bytes. Other
/// algorithms are accepted unchecked.
fn verify_integrity(name: &str, version: &Version, expected: &str, body: &[u8]) -> Result<()> {
    let Some(encoded) = expected.strip_prefix("sha512-") else {
        debug!(package = name, integrity = expected, "unsupported integrity algorithm, skipped");
        return Ok(());
    };
    let digest = Sha512::digest(body);
    if STANDARD.decode(encoded).ok().as_deref() == Some(&digest[..]) {
        return Ok(());
    }
    Err(Error::IntegrityMismatch {
        name: name.to_string(),
        version: version.to_string(),
        expected: expected.to_string(),
        actual: format!("sha512-{}", STANDARD.encode(digest)),
    })
}
