//! One install run: CHECK, LOAD, DEDUPE, INSTALL, CLEANUP.
//!
//! `node_modules/.INCOMPLETE` exists from before the first mutation until
//! cleanup has finished, so an interrupted run forces a full reinstall next
//! time. `node_modules/.OVERRIDE` stays while overrides are configured.

use crate::error::{Error, IoContext, Result};
use crate::fetch::Fetch;
use crate::fs::FileSystem;
use crate::fsutil::{self, NODE_MODULES};
use crate::gate::Gate;
use crate::manifest;
use crate::options::{InstallOptions, Phase, ProgressSink};
use crate::repository::{Repository, RepositoryOptions};
use crate::tree::{BuildOptions, DependencyTree, Node, NodeId, TreeBuilder};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

mod check;
mod cleanup;

pub use check::needs_install;
pub use cleanup::remove_unexpected;

pub const INCOMPLETE_MARKER: &str = ".INCOMPLETE";
pub const OVERRIDE_MARKER: &str = ".OVERRIDE";

/// Package installs running at once.
pub const INSTALL_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub success: bool,
    pub warnings: Vec<String>,
    /// Package directories removed by cleanup; `None` when cleanup was off.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed: Option<usize>,
    /// The run stopped at the quick check.
    pub quick: bool,
}

pub struct Installer {
    fs: Arc<dyn FileSystem>,
    fetch: Arc<dyn Fetch>,
    options: InstallOptions,
    progress: Option<ProgressSink>,
}

impl Installer {
    pub fn new(fs: Arc<dyn FileSystem>, fetch: Arc<dyn Fetch>, options: InstallOptions) -> Self {
        Self { fs, fetch, options, progress: None }
    }

    pub fn with_progress(mut self, sink: impl Fn(Phase, u8) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(sink));
        self
    }

    fn node_modules(&self) -> PathBuf {
        self.options.cwd.join(NODE_MODULES)
    }

    pub fn repository(&self) -> Repository {
        let options = RepositoryOptions {
            registry_url: self.options.registry_url.clone(),
            cas_dir: self.options.cas_path(),
            info_dir: self.options.info_path(),
            uncached: self.options.overrides.keys().cloned().collect(),
            dependencies_key: self.options.dependencies_key.clone(),
        };
        Repository::new(self.fs.clone(), self.fetch.clone(), options)
    }

    /// The project's own dependency map. Every name must be a valid package name.
    pub async fn project_dependencies(&self) -> Result<BTreeMap<String, String>> {
        let path = self.options.cwd.join("package.json");
        let project = manifest::load(self.fs.as_ref(), &path).await?;
        let dependencies = project.dependency_specs(self.options.dependencies_key.as_deref());
        if let Some(name) = dependencies.keys().find(|name| !fsutil::is_valid_package_name(name)) {
            return Err(Error::InvalidName { name: name.clone() });
        }
        Ok(dependencies)
    }

    pub async fn run(&self) -> Result<InstallReport> {
        let fs = self.fs.as_ref();
        let node_modules = self.node_modules();
        let incomplete = node_modules.join(INCOMPLETE_MARKER);
        let override_marker = node_modules.join(OVERRIDE_MARKER);
        let dependencies = self.project_dependencies().await?;

        let mut full = self.options.full;
        if fsutil::exists(fs, &incomplete).await? {
            info!("previous install did not finish, reinstalling everything");
            full = true;
        }

        if self.options.quick
            && !full
            && self.options.overrides.is_empty()
            && !fsutil::exists(fs, &override_marker).await?
            && !needs_install(fs, &self.options.cwd, &dependencies, &self.options.ignore).await?
        {
            info!("node_modules up to date");
            return Ok(InstallReport { success: true, warnings: Vec::new(), removed: None, quick: true });
        }

        fsutil::ensure_dir(fs, &node_modules).await?;
        fs.write(&incomplete, b"").await.at(&incomplete)?;
        if !self.options.overrides.is_empty() {
            fs.write(&override_marker, b"").await.at(&override_marker)?;
        }

        let repository = self.repository();
        let (mut tree, warnings) = self.load_tree(&repository, &dependencies).await?;
        if self.options.dedupe {
            let dropped = tree.hoist()?;
            debug!(dropped, remaining = tree.len(), "deduped");
        }

        self.install_tree(&repository, &tree, full).await?;

        let removed = if self.options.clean {
            Some(remove_unexpected(fs, &self.options.cwd, &tree).await?)
        } else {
            None
        };

        fs.remove_file(&incomplete).await.at(&incomplete)?;
        if self.options.overrides.is_empty() {
            fsutil::remove_if_exists(fs, &override_marker).await?;
        }

        info!(packages = tree.len(), warnings = warnings.len(), "install complete");
        Ok(InstallReport { success: true, warnings, removed, quick: false })
    }

    /// Resolve `dependencies` into a tree, without deduping.
    pub async fn load_tree(
        &self,
        repository: &Repository,
        dependencies: &BTreeMap<String, String>,
    ) -> Result<(DependencyTree, Vec<String>)> {
        let options = BuildOptions {
            overrides: self.options.overrides.clone(),
            ignore: self.options.ignore.clone(),
            progress: self.progress.clone(),
            ..BuildOptions::default()
        };
        TreeBuilder::new(repository, options).build(dependencies).await
    }

    /// Install every node, one depth level at a time so a parent directory is
    /// in place before anything is written inside it.
    pub async fn install_tree(&self, repository: &Repository, tree: &DependencyTree, full: bool) -> Result<()> {
        let mut waves: BTreeMap<usize, Vec<NodeId>> = BTreeMap::new();
        for id in tree.pre_order() {
            waves.entry(tree.depth(id)).or_default().push(id);
        }

        let gate = Gate::new(INSTALL_CONCURRENCY);
        let total = tree.len();
        let mut settled = 0;
        let mut reported: Option<u8> = None;
        for wave in waves.into_values() {
            let jobs = wave.into_iter().map(|id| {
                let target = tree.install_path(&self.options.cwd, id);
                self.install_node(repository, &tree[id], target, full)
            });
            gate.run_all(jobs, |_, _| {
                settled += 1;
                let percent = (settled as f64 * 100.0 / total as f64).round() as u8;
                if reported != Some(percent) {
                    reported = Some(percent);
                    if let Some(sink) = &self.progress {
                        sink(Phase::Install, percent);
                    }
                }
            })
            .await?;
        }
        Ok(())
    }

    /// Install one node unless it is already there. Returns whether it installed.
    async fn install_node(&self, repository: &Repository, node: &Node, target: PathBuf, full: bool) -> Result<bool> {
        if !full && self.is_installed(node, &target).await {
            debug!(package = %node.name, version = %node.resolved, "already installed");
            return Ok(false);
        }
        repository.install(&node.name, &node.resolved, &target).await?;
        Ok(true)
    }

    /// An unreadable manifest counts as not installed.
    async fn is_installed(&self, node: &Node, target: &Path) -> bool {
        let stamp = manifest::installed_version(self.fs.as_ref(), target).await.ok().flatten();
        stamp.is_some_and(|v| v == node.resolved.to_string())
    }
}
