use super::{FileKind, FileSystem, Stat};
use async_trait::async_trait;
use std::fs::Metadata;
use std::io;
use std::path::Path;

/// The host filesystem, through `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFs;

impl OsFs {
    pub fn new() -> Self {
        Self
    }
}

fn to_stat(meta: &Metadata) -> Stat {
    let ft = meta.file_type();
    let kind = if ft.is_symlink() {
        FileKind::Symlink
    } else if ft.is_dir() {
        FileKind::Dir
    } else {
        FileKind::File
    };
    Stat { kind, len: meta.len() }
}

#[async_trait]
impl FileSystem for OsFs {
    async fn stat(&self, path: &Path) -> io::Result<Stat> {
        tokio::fs::metadata(path).await.map(|m| to_stat(&m))
    }

    async fn lstat(&self, path: &Path) -> io::Result<Stat> {
        tokio::fs::symlink_metadata(path).await.map(|m| to_stat(&m))
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        tokio::fs::write(path, data).await
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn read_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        let mut rd = tokio::fs::read_dir(path).await?;
        let mut names = Vec::new();
        while let Some(entry) = rd.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    async fn remove_all(&self, path: &Path) -> io::Result<()> {
        let meta = tokio::fs::symlink_metadata(path).await?;
        if meta.is_dir() {
            tokio::fs::remove_dir_all(path).await
        } else {
            tokio::fs::remove_file(path).await
        }
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        tokio::fs::rename(from, to).await
    }

    async fn hard_link(&self, original: &Path, link: &Path) -> io::Result<()> {
        tokio::fs::hard_link(original, link).await
    }
}
