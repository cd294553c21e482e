use super::{FileKind, FileSystem, Stat};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Entry {
    Dir,
    /// Hard links share the same buffer.
    File(Arc<[u8]>),
}

/// A virtual filesystem kept entirely in memory.
///
/// Paths are normalized lexically (`.` dropped, `..` popped). The root of any
/// path always exists as a directory.
#[derive(Debug, Default)]
pub struct MemoryFs {
    entries: Mutex<BTreeMap<PathBuf, Entry>>,
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn is_root(path: &Path) -> bool {
    path.parent().is_none() || path.as_os_str().is_empty()
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no such file or directory: {}", path.display()))
}

fn already_exists(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::AlreadyExists, format!("already exists: {}", path.display()))
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries (files and directories) currently stored.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// True when both paths are files sharing the same content buffer.
    pub fn same_file(&self, a: &Path, b: &Path) -> bool {
        let entries = self.entries.lock();
        match (entries.get(&normalize(a)), entries.get(&normalize(b))) {
            (Some(Entry::File(x)), Some(Entry::File(y))) => Arc::ptr_eq(x, y),
            _ => false,
        }
    }

    fn kind_of(entries: &BTreeMap<PathBuf, Entry>, path: &Path) -> Option<FileKind> {
        if is_root(path) {
            return Some(FileKind::Dir);
        }
        entries.get(path).map(|e| match e {
            Entry::Dir => FileKind::Dir,
            Entry::File(_) => FileKind::File,
        })
    }

    fn check_parent(entries: &BTreeMap<PathBuf, Entry>, path: &Path) -> io::Result<()> {
        match path.parent() {
            None => Ok(()),
            Some(parent) => match Self::kind_of(entries, parent) {
                Some(FileKind::Dir) => Ok(()),
                Some(_) => Err(io::Error::other(format!("not a directory: {}", parent.display()))),
                None => Err(not_found(parent)),
            },
        }
    }

    /// `PathBuf` orders component-wise, so a path's descendants follow it contiguously.
    fn subtree_keys(entries: &BTreeMap<PathBuf, Entry>, path: &Path) -> Vec<PathBuf> {
        entries
            .range(path.to_path_buf()..)
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(path))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl FileSystem for MemoryFs {
    async fn stat(&self, path: &Path) -> io::Result<Stat> {
        let path = normalize(path);
        let entries = self.entries.lock();
        if is_root(&path) {
            return Ok(Stat { kind: FileKind::Dir, len: 0 });
        }
        match entries.get(&path) {
            Some(Entry::Dir) => Ok(Stat { kind: FileKind::Dir, len: 0 }),
            Some(Entry::File(data)) => Ok(Stat { kind: FileKind::File, len: data.len() as u64 }),
            None => Err(not_found(&path)),
        }
    }

    async fn lstat(&self, path: &Path) -> io::Result<Stat> {
        self.stat(path).await
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let path = normalize(path);
        match self.entries.lock().get(&path) {
            Some(Entry::File(data)) => Ok(data.to_vec()),
            Some(Entry::Dir) => Err(io::Error::other(format!("is a directory: {}", path.display()))),
            None => Err(not_found(&path)),
        }
    }

    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let path = normalize(path);
        let mut entries = self.entries.lock();
        Self::check_parent(&entries, &path)?;
        if let Some(Entry::Dir) = entries.get(&path) {
            return Err(io::Error::other(format!("is a directory: {}", path.display())));
        }
        entries.insert(path, Entry::File(Arc::from(data)));
        Ok(())
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let path = normalize(path);
        let mut entries = self.entries.lock();
        let mut ancestors: Vec<&Path> = path.ancestors().filter(|p| !is_root(p)).collect();
        ancestors.reverse();
        for dir in ancestors {
            match entries.get(dir) {
                Some(Entry::Dir) => {}
                Some(Entry::File(_)) => return Err(already_exists(dir)),
                None => {
                    entries.insert(dir.to_path_buf(), Entry::Dir);
                }
            }
        }
        Ok(())
    }

    async fn read_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        let path = normalize(path);
        let entries = self.entries.lock();
        match Self::kind_of(&entries, &path) {
            Some(FileKind::Dir) => {}
            Some(_) => return Err(io::Error::other(format!("not a directory: {}", path.display()))),
            None => return Err(not_found(&path)),
        }
        let names = entries
            .keys()
            .filter(|k| k.parent() == Some(path.as_path()))
            .filter_map(|k| k.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        Ok(names)
    }

    async fn remove_all(&self, path: &Path) -> io::Result<()> {
        let path = normalize(path);
        let mut entries = self.entries.lock();
        if !entries.contains_key(&path) {
            return Err(not_found(&path));
        }
        for key in Self::subtree_keys(&entries, &path) {
            entries.remove(&key);
        }
        Ok(())
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        let path = normalize(path);
        let mut entries = self.entries.lock();
        match entries.get(&path) {
            Some(Entry::File(_)) => {
                entries.remove(&path);
                Ok(())
            }
            Some(Entry::Dir) => Err(io::Error::other(format!("is a directory: {}", path.display()))),
            None => Err(not_found(&path)),
        }
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let from = normalize(from);
        let to = normalize(to);
        let mut entries = self.entries.lock();
        let source_kind = match entries.get(&from) {
            Some(Entry::Dir) => FileKind::Dir,
            Some(Entry::File(_)) => FileKind::File,
            None => return Err(not_found(&from)),
        };
        Self::check_parent(&entries, &to)?;
        match entries.get(&to) {
            Some(Entry::Dir) => return Err(already_exists(&to)),
            Some(Entry::File(_)) if source_kind == FileKind::Dir => return Err(already_exists(&to)),
            _ => {}
        }
        for key in Self::subtree_keys(&entries, &from) {
            if let Some(entry) = entries.remove(&key) {
                let rel = key.strip_prefix(&from).map(Path::to_path_buf).unwrap_or_default();
                let dest = if rel.as_os_str().is_empty() { to.clone() } else { to.join(rel) };
                entries.insert(dest, entry);
            }
        }
        Ok(())
    }

    async fn hard_link(&self, original: &Path, link: &Path) -> io::Result<()> {
        let original = normalize(original);
        let link = normalize(link);
        let mut entries = self.entries.lock();
        let data = match entries.get(&original) {
            Some(Entry::File(data)) => data.clone(),
            Some(Entry::Dir) => {
                return Err(io::Error::other(format!("hard link to directory: {}", original.display())))
            }
            None => return Err(not_found(&original)),
        };
        Self::check_parent(&entries, &link)?;
        if entries.contains_key(&link) {
            return Err(already_exists(&link));
        }
        entries.insert(link, Entry::File(data));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_requires_parent_directory() {
        let fs = MemoryFs::new();
        let err = fs.write(Path::new("/a/b.txt"), b"x").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        fs.create_dir_all(Path::new("/a")).await.unwrap();
        fs.write(Path::new("/a/b.txt"), b"x").await.unwrap();
        assert_eq!(fs.read(Path::new("/a/./b.txt")).await.unwrap(), b"x");
    }

    #[tokio::test]
    async fn rename_moves_whole_subtree() {
        let fs = MemoryFs::new();
        fs.create_dir_all(Path::new("/cas/pkg@1.0.0.part/lib")).await.unwrap();
        fs.write(Path::new("/cas/pkg@1.0.0.part/lib/index.js"), b"js").await.unwrap();
        fs.rename(Path::new("/cas/pkg@1.0.0.part"), Path::new("/cas/pkg@1.0.0")).await.unwrap();
        assert!(!fs.exists(Path::new("/cas/pkg@1.0.0.part")).await.unwrap());
        assert_eq!(fs.read(Path::new("/cas/pkg@1.0.0/lib/index.js")).await.unwrap(), b"js");
        assert_eq!(fs.read_dir(Path::new("/cas")).await.unwrap(), vec!["pkg@1.0.0".to_string()]);
    }

    #[tokio::test]
    async fn remove_all_leaves_siblings_with_shared_prefix() {
        let fs = MemoryFs::new();
        fs.create_dir_all(Path::new("/nm/a/x")).await.unwrap();
        fs.create_dir_all(Path::new("/nm/a-b")).await.unwrap();
        fs.remove_all(Path::new("/nm/a")).await.unwrap();
        assert!(!fs.exists(Path::new("/nm/a/x")).await.unwrap());
        assert!(fs.exists(Path::new("/nm/a-b")).await.unwrap());
    }

    #[tokio::test]
    async fn hard_links_share_content() {
        let fs = MemoryFs::new();
        fs.create_dir_all(Path::new("/d")).await.unwrap();
        fs.write(Path::new("/d/one"), b"data").await.unwrap();
        fs.hard_link(Path::new("/d/one"), Path::new("/d/two")).await.unwrap();
        assert!(fs.same_file(Path::new("/d/one"), Path::new("/d/two")));
        let err = fs.hard_link(Path::new("/d/one"), Path::new("/d/two")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }
}
