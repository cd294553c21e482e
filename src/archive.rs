//! In-memory view of a gzipped package tarball.

use crate::error::{Error, IoContext, Result};
use crate::fs::FileSystem;
use bytes::Bytes;
use flate2::read::GzDecoder;
use glob::{MatchOptions, Pattern};
use std::io::Read;
use std::path::{Component, Path};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    /// Links, devices and anything else not extracted.
    Other,
}

#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub name: String,
    pub kind: EntryKind,
    data: Bytes,
}

impl ArchiveEntry {
    pub fn bytes(&self) -> &Bytes {
        &self.data
    }
}

#[derive(Debug, Clone)]
pub struct Archive {
    source: String,
    entries: Vec<ArchiveEntry>,
}

const SINGLE_SEGMENT: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

impl Archive {
    /// Decode a `.tgz`. `source` only labels errors.
    pub fn from_tgz(bytes: &[u8], source: &str) -> Result<Self> {
        let malformed = |e: std::io::Error| Error::Archive { source_url: source.to_string(), message: e.to_string() };
        let mut tar = tar::Archive::new(GzDecoder::new(bytes));
        let mut entries = Vec::new();
        for entry in tar.entries().map_err(malformed)? {
            let mut entry = entry.map_err(malformed)?;
            let raw_name = entry.path().map_err(malformed)?.to_string_lossy().into_owned();
            let name = raw_name.trim_start_matches("./").to_string();
            let header_type = entry.header().entry_type();
            let kind = if header_type.is_dir() {
                EntryKind::Dir
            } else if header_type.is_file() {
                EntryKind::File
            } else {
                EntryKind::Other
            };
            let mut data = Vec::new();
            if kind == EntryKind::File {
                entry.read_to_end(&mut data).map_err(malformed)?;
            }
            entries.push(ArchiveEntry { name, kind, data: Bytes::from(data) });
        }
        Ok(Self { source: source.to_string(), entries })
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// First entry whose name matches `pattern`; `*` never crosses a `/`.
    pub fn find(&self, pattern: &str) -> Option<&ArchiveEntry> {
        let pattern = Pattern::new(pattern).ok()?;
        self.entries().iter().find(|e| pattern.matches_with(&e.name, SINGLE_SEGMENT))
    }

    /// Directory holding the package's `package.json`, whatever the wrapper is called.
    pub fn package_root(&self) -> Result<String> {
        let manifest = self
            .find("package.json")
            .or_else(|| self.find("*/package.json"))
            .ok_or_else(|| Error::Archive {
                source_url: self.source.clone(),
                message: "package.json not found".into(),
            })?;
        Ok(manifest.name.rsplit_once('/').map(|(dir, _)| dir.to_string()).unwrap_or_default())
    }

    pub fn manifest_bytes(&self) -> Result<&Bytes> {
        let root = self.package_root()?;
        let name = if root.is_empty() { "package.json".to_string() } else { format!("{root}/package.json") };
        self.entries()
            .iter()
            .find(|e| e.name == name)
            .map(ArchiveEntry::bytes)
            .ok_or_else(|| Error::Archive { source_url: self.source.clone(), message: "package.json not found".into() })
    }

    /// Write every file below the package root into `target`. Returns the file count.
    pub async fn extract(&self, fs: &dyn FileSystem, target: &Path) -> Result<usize> {
        let root = self.package_root()?;
        let mut written = 0;
        crate::fsutil::ensure_dir(fs, target).await?;
        for entry in self.entries().iter().filter(|e| e.kind == EntryKind::File) {
            let rel = if root.is_empty() {
                entry.name.as_str()
            } else {
                match entry.name.strip_prefix(&root).and_then(|r| r.strip_prefix('/')) {
                    Some(rel) => rel,
                    None => continue,
                }
            };
            let rel = Path::new(rel);
            if rel.as_os_str().is_empty() || rel.components().any(|c| !matches!(c, Component::Normal(_))) {
                continue;
            }
            let dest = target.join(rel);
            if let Some(parent) = dest.parent() {
                crate::fsutil::ensure_dir(fs, parent).await?;
            }
            fs.write(&dest, &entry.data).await.at(&dest)?;
            written += 1;
        }
        Ok(written)
    }
}
