use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org/";

/// File in the project directory the CLI reads options from.
pub const CONFIG_FILE: &str = ".nestpm.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Resolving versions and manifests.
    Info,
    Install,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Info => "info",
            Phase::Install => "install",
        })
    }
}

/// Receives `(phase, percent)` whenever a phase's rounded completion changes.
pub type ProgressSink = Arc<dyn Fn(Phase, u8) + Send + Sync>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct InstallOptions {
    pub cwd: PathBuf,
    pub registry_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cas_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info_dir: Option<PathBuf>,
    pub ignore: BTreeSet<String>,
    /// name -> version spec, applied everywhere in the tree.
    #[serde(rename = "override")]
    pub overrides: BTreeMap<String, String>,
    pub dedupe: bool,
    /// Reinstall even packages whose installed version already matches.
    pub full: bool,
    /// Skip everything when the direct dependencies already look installed.
    pub quick: bool,
    /// Remove package directories the tree no longer needs.
    pub clean: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies_key: Option<String>,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            cwd: PathBuf::from("."),
            registry_url: DEFAULT_REGISTRY.to_string(),
            cas_dir: None,
            info_dir: None,
            ignore: BTreeSet::new(),
            overrides: BTreeMap::new(),
            dedupe: true,
            full: false,
            quick: false,
            clean: true,
            dependencies_key: None,
        }
    }
}

impl InstallOptions {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self { cwd: cwd.into(), ..Self::default() }
    }

    /// `path` taken relative to the project directory.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }

    pub fn cas_path(&self) -> Option<PathBuf> {
        self.cas_dir.as_deref().map(|p| self.resolve_path(p))
    }

    pub fn info_path(&self) -> Option<PathBuf> {
        self.info_dir.as_deref().map(|p| self.resolve_path(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_camel_case_config() {
        let json = r#"{
            "registryUrl": "http://localhost:4873",
            "casDir": "/tmp/cas",
            "override": {"left-pad": "https://example.com/left-pad.tgz"},
            "ignore": ["fsevents"],
            "dedupe": false
        }"#;
        let opts: InstallOptions = serde_json::from_str(json).unwrap();
        assert_eq!(opts.registry_url, "http://localhost:4873");
        assert_eq!(opts.cas_path(), Some(PathBuf::from("/tmp/cas")));
        assert_eq!(opts.overrides.len(), 1);
        assert!(opts.ignore.contains("fsevents"));
        assert!(!opts.dedupe);
        assert!(opts.clean, "unset fields keep their defaults");
    }

    #[test]
    fn relative_dirs_resolve_against_cwd() {
        let mut opts = InstallOptions::new("/work/app");
        opts.info_dir = Some(PathBuf::from(".cache/info"));
        assert_eq!(opts.info_path(), Some(PathBuf::from("/work/app/.cache/info")));
        assert_eq!(Phase::Install.to_string(), "install");
    }
}
