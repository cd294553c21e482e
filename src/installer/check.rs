use crate::error::Result;
use crate::fs::FileSystem;
use crate::fsutil;
use crate::manifest;
use crate::resolver::VersionSpec;
use semver::Version;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;

/// Quick scan of the project's direct dependencies against what is in
/// `<cwd>/node_modules`. True as soon as one is missing or out of range.
///
/// Ranges are checked against the installed `version`, URLs against the
/// installed-version stamp.
pub async fn needs_install(
    fs: &dyn FileSystem,
    cwd: &Path,
    dependencies: &BTreeMap<String, String>,
    ignore: &BTreeSet<String>,
) -> Result<bool> {
    for (name, raw) in dependencies {
        if ignore.contains(name) {
            continue;
        }
        let path = fsutil::package_dir(cwd, name).join("package.json");
        if !fsutil::exists(fs, &path).await? {
            debug!(package = %name, "not installed");
            return Ok(true);
        }
        let Ok(installed) = manifest::load(fs, &path).await else {
            debug!(package = %name, "unreadable manifest");
            return Ok(true);
        };
        let Ok(spec) = VersionSpec::parse(name, raw) else {
            return Ok(true);
        };
        let current = match &spec {
            VersionSpec::Range(range) => installed
                .version
                .as_deref()
                .and_then(|v| Version::parse(v).ok())
                .is_some_and(|v| range.satisfies(&v)),
            VersionSpec::Url(url) => installed.installed_version.as_deref() == Some(url.as_str()),
            VersionSpec::Alias(_) => true,
        };
        if !current {
            debug!(package = %name, wanted = %spec, installed = ?installed.version, "out of date");
            return Ok(true);
        }
    }
    Ok(false)
}
