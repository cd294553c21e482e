use super::{DependencyTree, Node, NodeId};
use crate::error::Result;
use crate::fsutil;
use crate::gate::Gate;
use crate::options::{Phase, ProgressSink};
use crate::repository::Repository;
use crate::resolver::VersionSpec;
use futures::future::{try_join_all, BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Repository calls allowed in flight while resolving.
pub const RESOLVE_CONCURRENCY: usize = 16;

#[derive(Clone)]
pub struct BuildOptions {
    /// Replaces the requested spec of a name wherever it appears.
    pub overrides: BTreeMap<String, String>,
    pub ignore: BTreeSet<String>,
    pub concurrency: usize,
    pub progress: Option<ProgressSink>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            overrides: BTreeMap::new(),
            ignore: BTreeSet::new(),
            concurrency: RESOLVE_CONCURRENCY,
            progress: None,
        }
    }
}

/// Resolves a project's dependency map into a [`DependencyTree`].
pub struct TreeBuilder<'a> {
    repository: &'a Repository,
    options: BuildOptions,
    gate: Gate,
    tree: Mutex<DependencyTree>,
    warnings: Mutex<Vec<String>>,
    reported: Mutex<Option<u8>>,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(repository: &'a Repository, options: BuildOptions) -> Self {
        Self {
            repository,
            gate: Gate::new(options.concurrency),
            options,
            tree: Mutex::new(DependencyTree::new()),
            warnings: Mutex::new(Vec::new()),
            reported: Mutex::new(None),
        }
    }

    /// Build the full tree below the project root. Returns the tree and the
    /// warnings collected on the way.
    pub async fn build(self, dependencies: &BTreeMap<String, String>) -> Result<(DependencyTree, Vec<String>)> {
        self.load(None, dependencies.clone()).await?;
        Ok((self.tree.into_inner(), self.warnings.into_inner()))
    }

    /// Create every child of `parent` concurrently, attach the ones that
    /// resolved, then load each child's own dependencies.
    fn load(&self, parent: Option<NodeId>, specs: BTreeMap<String, String>) -> BoxFuture<'_, Result<()>> {
        async move {
            let mut creations = Vec::new();
            for (name, raw) in &specs {
                if self.options.ignore.contains(name) {
                    debug!(package = %name, "ignored");
                    continue;
                }
                if self.tree.lock().path_contains(parent, name) {
                    let referrer = self.referrer(parent);
                    self.warn(format!("Circular dependency: {name} in {referrer}"));
                    continue;
                }
                creations.push(self.create(name, raw));
            }
            let created = try_join_all(creations).await?;

            let pending: Vec<(NodeId, BTreeMap<String, String>)> = {
                let mut tree = self.tree.lock();
                let pending = created
                    .into_iter()
                    .flatten()
                    .map(|node| {
                        let specs = node.dependency_specs.clone();
                        (tree.insert(parent, node), specs)
                    })
                    .collect();
                tree.mark_loaded(parent);
                pending
            };
            self.report_progress();

            try_join_all(pending.into_iter().map(|(id, specs)| self.load(Some(id), specs))).await?;
            Ok(())
        }
        .boxed()
    }

    /// Resolve one dependency entry. `None` when the entry is skipped.
    async fn create(&self, name: &str, raw: &str) -> Result<Option<Node>> {
        if !fsutil::is_valid_package_name(name) {
            self.warn(format!("Invalid package name, ignored: {name}"));
            return Ok(None);
        }
        let raw = self.options.overrides.get(name).map(String::as_str).unwrap_or(raw);
        let spec = VersionSpec::parse(name, raw)?;
        if let VersionSpec::Alias(alias) = &spec {
            self.warn(format!("Dependencies with npm: protocol are not supported, ignored: {name}={alias}"));
            return Ok(None);
        }

        let repository = self.repository;
        let resolved = self.gate.run(repository.get_satisfying_version(name, &spec)).await?;
        let dependencies = self.gate.run(repository.get_version_dependencies(name, &resolved)).await?;
        debug!(package = name, spec = %spec, version = %resolved, "resolved");
        Ok(Some(Node::new(name, spec, resolved, dependencies)))
    }

    fn referrer(&self, parent: Option<NodeId>) -> String {
        let tree = self.tree.lock();
        match parent.and_then(|id| tree.get(id)) {
            Some(node) => node.name.clone(),
            None => "project".to_string(),
        }
    }

    fn warn(&self, message: String) {
        warn!("{message}");
        self.warnings.lock().push(message);
    }

    fn report_progress(&self) {
        let Some(sink) = &self.options.progress else { return };
        let value = self.tree.lock().completion(None);
        {
            let mut reported = self.reported.lock();
            if reported.is_some_and(|last| value <= last) {
                return;
            }
            *reported = Some(value);
        }
        sink(Phase::Info, value);
    }
}
