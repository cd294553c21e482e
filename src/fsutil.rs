use crate::error::{IoContext, Result};
use crate::fs::{FileKind, FileSystem};
use std::path::{Path, PathBuf};

pub const NODE_MODULES: &str = "node_modules";

/// `<base>/node_modules/<name>`, splitting scoped names into their two segments.
pub fn package_dir(base: &Path, name: &str) -> PathBuf {
    let mut p = base.join(NODE_MODULES);
    for part in name.split('/') {
        p.push(part);
    }
    p
}

/// npm package name that stays inside its `node_modules`: `name` or
/// `@scope/name`, no empty or dot-leading segments, no separators or drive
/// prefixes.
pub fn is_valid_package_name(name: &str) -> bool {
    let segment_ok = |s: &str| {
        !s.is_empty() && !s.starts_with('.') && !s.contains(['/', '\\', ':', '\0']) && s.trim() == s
    };
    match name.strip_prefix('@') {
        Some(scoped) => scoped.split_once('/').is_some_and(|(scope, base)| segment_ok(scope) && segment_ok(base)),
        None => segment_ok(name),
    }
}

pub async fn exists(fs: &dyn FileSystem, path: &Path) -> Result<bool> {
    fs.exists(path).await.at(path)
}

pub async fn ensure_dir(fs: &dyn FileSystem, path: &Path) -> Result<()> {
    fs.create_dir_all(path).await.at(path)
}

/// Remove `path` if it exists.
pub async fn remove_if_exists(fs: &dyn FileSystem, path: &Path) -> Result<bool> {
    if !exists(fs, path).await? {
        return Ok(false);
    }
    fs.remove_all(path).await.at(path)?;
    Ok(true)
}

/// Recreate the tree at `from` under `to`, hard-linking every file.
pub async fn link_recursive(fs: &dyn FileSystem, from: &Path, to: &Path) -> Result<()> {
    let mut stack = vec![(from.to_path_buf(), to.to_path_buf())];
    while let Some((src, dest)) = stack.pop() {
        let stat = fs.lstat(&src).await.at(&src)?;
        match stat.kind {
            FileKind::Dir => {
                fs.create_dir_all(&dest).await.at(&dest)?;
                for name in fs.read_dir(&src).await.at(&src)? {
                    stack.push((src.join(&name), dest.join(&name)));
                }
            }
            FileKind::File | FileKind::Symlink => {
                fs.hard_link(&src, &dest).await.at(&dest)?;
            }
        }
    }
    Ok(())
}

/// Replace a file with fresh contents without touching other hard links to it.
pub async fn rewrite_file(fs: &dyn FileSystem, path: &Path, data: &[u8]) -> Result<()> {
    if exists(fs, path).await? {
        fs.remove_file(path).await.at(path)?;
    }
    fs.write(path, data).await.at(path)
}

/// Staging name for `name`, private to this process: `<name>.<pid>.part`.
pub fn part_name(name: &str) -> String {
    format!("{name}.{}.part", std::process::id())
}

/// Write through a `.part` sibling and rename into place.
pub async fn write_atomic(fs: &dyn FileSystem, path: &Path, data: &[u8]) -> Result<()> {
    let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let part = path.with_file_name(part_name(&file_name));
    fs.write(&part, data).await.at(&part)?;
    if exists(fs, path).await? {
        fs.remove_file(path).await.at(path)?;
    }
    fs.rename(&part, path).await.at(path)
}
