use crate::error::{Error, IoContext, Result};
use crate::fs::FileSystem;
use crate::fsutil::{self, NODE_MODULES};
use crate::tree::DependencyTree;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::info;

/// Remove package directories under `<cwd>/node_modules` that the tree does
/// not install, outermost first. Returns how many were removed.
///
/// Fails if a directory the tree installs is missing.
pub async fn remove_unexpected(fs: &dyn FileSystem, cwd: &Path, tree: &DependencyTree) -> Result<usize> {
    let expected: BTreeSet<PathBuf> = tree.pre_order().into_iter().map(|id| tree.install_path(cwd, id)).collect();
    for path in &expected {
        if !fsutil::exists(fs, path).await? {
            return Err(Error::MissingInstall { path: path.clone() });
        }
    }

    let mut removed = 0;
    let mut pending = vec![cwd.join(NODE_MODULES)];
    while let Some(dir) = pending.pop() {
        if !fsutil::exists(fs, &dir).await? {
            continue;
        }
        for package in package_dirs(fs, &dir).await? {
            if expected.contains(&package) {
                pending.push(package.join(NODE_MODULES));
            } else {
                info!(path = %package.display(), "removing unexpected package");
                fs.remove_all(&package).await.at(&package)?;
                removed += 1;
            }
        }
        remove_empty_scopes(fs, &dir).await?;
    }
    Ok(removed)
}

/// Package directories directly inside one `node_modules`, looking one level
/// into `@scope` directories. Dot entries and loose files are skipped.
async fn package_dirs(fs: &dyn FileSystem, node_modules: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for name in fs.read_dir(node_modules).await.at(node_modules)? {
        if name.starts_with('.') {
            continue;
        }
        let path = node_modules.join(&name);
        if !is_dir(fs, &path).await? {
            continue;
        }
        if !name.starts_with('@') {
            out.push(path);
            continue;
        }
        for scoped in fs.read_dir(&path).await.at(&path)? {
            if scoped.starts_with('.') {
                continue;
            }
            let scoped = path.join(scoped);
            if is_dir(fs, &scoped).await? {
                out.push(scoped);
            }
        }
    }
    Ok(out)
}

async fn remove_empty_scopes(fs: &dyn FileSystem, node_modules: &Path) -> Result<()> {
    for name in fs.read_dir(node_modules).await.at(node_modules)? {
        if !name.starts_with('@') {
            continue;
        }
        let scope = node_modules.join(&name);
        if is_dir(fs, &scope).await? && fs.read_dir(&scope).await.at(&scope)?.is_empty() {
            fs.remove_all(&scope).await.at(&scope)?;
        }
    }
    Ok(())
}

/// Dangling links count as not a directory.
async fn is_dir(fs: &dyn FileSystem, path: &Path) -> Result<bool> {
    match fs.stat(path).await {
        Ok(stat) => Ok(stat.is_dir()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::io(path, e)),
    }
}
