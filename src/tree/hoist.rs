use super::{DependencyTree, NodeId};
use crate::error::{Error, Result};
use crate::resolver::ResolvedVersion;
use tracing::debug;

impl DependencyTree {
    /// Hoist one copy of every package name to the project root and drop the
    /// copies it makes redundant. Returns how many nodes were removed.
    ///
    /// For each name, in pre-order, the version satisfying the most requesters
    /// wins (first seen on a tie) unless the root already holds that name. Nodes
    /// whose spec rejects the winner stay nested.
    pub fn hoist(&mut self) -> Result<usize> {
        let mut names: Vec<String> = Vec::new();
        for id in self.pre_order() {
            let name = &self[id].name;
            if !names.contains(name) {
                names.push(name.clone());
            }
        }

        let before = self.len();
        for name in &names {
            self.hoist_name(name)?;
        }
        Ok(before - self.len())
    }

    fn hoist_name(&mut self, name: &str) -> Result<()> {
        let nodes: Vec<NodeId> = self.pre_order().into_iter().filter(|id| self[*id].name == name).collect();
        if nodes.is_empty() {
            return Ok(());
        }

        let (candidate, chosen) = match self.root_child_named(name) {
            Some(id) => (id, self[id].resolved.clone()),
            None => {
                let chosen = self.most_accepted_version(name, &nodes)?;
                let candidate = nodes.iter().copied().find(|id| self[*id].resolved == chosen);
                match candidate {
                    Some(id) => (id, chosen),
                    None => return Err(Error::Invariant(format!("no node for {name}@{chosen}"))),
                }
            }
        };

        self.reparent_to_root(candidate);
        self[candidate].version_spec = None;
        debug!(package = name, version = %chosen, "hoisted");

        for id in nodes {
            if id == candidate {
                continue;
            }
            if self.get(id).is_some_and(|n| n.accepts(&chosen)) {
                self.remove(id);
            }
        }
        Ok(())
    }

    fn most_accepted_version(&self, name: &str, nodes: &[NodeId]) -> Result<ResolvedVersion> {
        let mut versions: Vec<&ResolvedVersion> = Vec::new();
        for id in nodes {
            let version = &self[*id].resolved;
            if !versions.contains(&version) {
                versions.push(version);
            }
        }

        let mut best: Option<(&ResolvedVersion, usize)> = None;
        for version in versions {
            let count = self.satisfies_count(nodes, version);
            if count == 0 {
                return Err(Error::Invariant(format!("{name}@{version} satisfies none of its requesters")));
            }
            if best.map_or(true, |(_, top)| count > top) {
                best = Some((version, count));
            }
        }
        best.map(|(v, _)| v.clone())
            .ok_or_else(|| Error::Invariant(format!("no versions for {name}")))
    }

    /// How many of `nodes` accept `version`.
    pub fn satisfies_count(&self, nodes: &[NodeId], version: &ResolvedVersion) -> usize {
        nodes.iter().filter(|id| self[**id].accepts(version)).count()
    }
}
