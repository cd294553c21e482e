//! Path-based filesystem primitive the installer runs against.
//!
//! Everything the installer touches on disk goes through [`FileSystem`], so the
//! same engine can install into the real disk ([`OsFs`]) or into a virtual
//! filesystem ([`MemoryFs`]).

use async_trait::async_trait;
use std::io;
use std::path::Path;

mod memory;
mod os;

pub use memory::MemoryFs;
pub use os::OsFs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Dir,
    Symlink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub kind: FileKind,
    pub len: u64,
}

impl Stat {
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Dir
    }
}

#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Metadata, following symlinks.
    async fn stat(&self, path: &Path) -> io::Result<Stat>;

    /// Metadata of the path itself.
    async fn lstat(&self, path: &Path) -> io::Result<Stat>;

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Create or truncate a file. The parent directory must exist.
    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Names of the direct entries of a directory.
    async fn read_dir(&self, path: &Path) -> io::Result<Vec<String>>;

    /// Remove a file, or a directory and everything below it.
    async fn remove_all(&self, path: &Path) -> io::Result<()>;

    async fn remove_file(&self, path: &Path) -> io::Result<()>;

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    async fn hard_link(&self, original: &Path, link: &Path) -> io::Result<()>;

    async fn exists(&self, path: &Path) -> io::Result<bool> {
        match self.stat(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}
