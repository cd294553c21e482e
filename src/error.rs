use std::io;
use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not satisfiable: {name} {range}")]
    NotSatisfiable { name: String, range: String },

    #[error("version spec is not a semver range or url: {name}={spec}")]
    InvalidSpec { name: String, spec: String },

    #[error("not a valid package name: {name}")]
    InvalidName { name: String },

    #[error("unknown dependency protocol: {name}={spec}")]
    UnknownProtocol { name: String, spec: String },

    #[error("can't find package manifest: {name} {version}")]
    ManifestNotFound { name: String, version: String },

    #[error("GET {url} returned status {status}")]
    Http { url: String, status: u16 },

    #[error("fetch {url} failed: {message}")]
    Fetch { url: String, message: String },

    #[error("integrity mismatch for {name}@{version}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        name: String,
        version: String,
        expected: String,
        actual: String,
    },

    #[error("tar archive {source_url} not recognized as npm package: {message}")]
    Archive { source_url: String, message: String },

    #[error("expected install path missing after install: {}", path.display())]
    MissingInstall { path: PathBuf },

    #[error("internal invariant violated: {0}")]
    Invariant(String),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid json in {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Error::Io { path: path.as_ref().to_path_buf(), source }
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        Error::Json { context: context.into(), source }
    }

    /// True for `Io` errors caused by a missing path.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

/// Attach a path to bare `io::Error`s coming out of the filesystem layer.
pub(crate) trait IoContext<T> {
    fn at(self, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn at(self, path: &Path) -> Result<T> {
        self.map_err(|e| Error::io(path, e))
    }
}
