use crate::fetch::{Fetch, FetchResponse};
use crate::fs::{FileSystem, MemoryFs};
use crate::options::InstallOptions;
use crate::repository::{Repository, RepositoryOptions};
use crate::tree::{BuildOptions, DependencyTree, TreeBuilder};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use serde_json::{json, Value};
use sha2::{Digest, Sha512};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const REGISTRY: &str = "https://registry.test";
pub const CWD: &str = "/project";

/// Serves canned responses and counts requests per URL. Unknown URLs get a 404.
#[derive(Default)]
pub struct MemoryFetch {
    routes: Mutex<HashMap<String, FetchResponse>>,
    hits: Mutex<HashMap<String, usize>>,
}

impl MemoryFetch {
    pub fn serve(&self, url: &str, body: impl Into<Bytes>) {
        self.routes.lock().insert(url.to_string(), FetchResponse::ok(body));
    }

    pub fn hits(&self, url: &str) -> usize {
        self.hits.lock().get(url).copied().unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.hits.lock().values().sum()
    }

    /// Requests to URLs ending in `.tgz`.
    pub fn tarball_hits(&self) -> usize {
        self.hits.lock().iter().filter(|(url, _)| url.ends_with(".tgz")).map(|(_, n)| n).sum()
    }
}

#[async_trait]
impl Fetch for MemoryFetch {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, String> {
        *self.hits.lock().entry(url.to_string()).or_default() += 1;
        tokio::task::yield_now().await;
        let route = self.routes.lock().get(url).cloned();
        Ok(route.unwrap_or_else(|| FetchResponse::status(404)))
    }
}

/// Gzipped tarball with every file under `<root>/`.
pub fn tgz(root: &str, files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, format!("{root}/{name}"), *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

pub fn package_json(name: &str, version: &str, deps: &[(&str, &str)]) -> String {
    let deps: BTreeMap<&str, &str> = deps.iter().copied().collect();
    json!({ "name": name, "version": version, "dependencies": deps }).to_string()
}

pub fn package_tgz(name: &str, version: &str, deps: &[(&str, &str)]) -> Vec<u8> {
    let manifest = package_json(name, version, deps);
    let index = format!("module.exports = '{name}@{version}';\n");
    tgz("package", &[("package.json", manifest.as_bytes()), ("index.js", index.as_bytes())])
}

pub fn sri(data: &[u8]) -> String {
    format!("sha512-{}", STANDARD.encode(Sha512::digest(data)))
}

/// A registry living in a [`MemoryFetch`]. Publishing updates the served
/// package info immediately.
pub struct Registry {
    pub fetch: Arc<MemoryFetch>,
    versions: Mutex<BTreeMap<String, BTreeMap<String, Value>>>,
}

impl Registry {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self { fetch: Arc::new(MemoryFetch::default()), versions: Mutex::new(BTreeMap::new()) }
    }

    pub fn tarball_url(name: &str, version: &str) -> String {
        let base = name.rsplit('/').next().unwrap_or(name);
        format!("{REGISTRY}/{name}/-/{base}-{version}.tgz")
    }

    pub fn info_url(name: &str) -> String {
        format!("{REGISTRY}/{name}")
    }

    pub fn publish(&self, name: &str, version: &str, deps: &[(&str, &str)]) -> &Self {
        let tarball = package_tgz(name, version, deps);
        let url = Self::tarball_url(name, version);
        let deps_map: BTreeMap<&str, &str> = deps.iter().copied().collect();
        let entry = json!({
            "name": name,
            "version": version,
            "dependencies": deps_map,
            "dist": { "tarball": url, "integrity": sri(&tarball) },
        });
        self.fetch.serve(&url, tarball);
        self.versions.lock().entry(name.to_string()).or_default().insert(version.to_string(), entry);
        self.refresh(name);
        self
    }

    /// Serve different bytes for an already published tarball.
    pub fn tamper(&self, name: &str, version: &str) {
        let bytes = package_tgz(name, version, &[("evil", "^1.0.0")]);
        self.fetch.serve(&Self::tarball_url(name, version), bytes);
    }

    fn refresh(&self, name: &str) {
        let versions = self.versions.lock().get(name).cloned().unwrap_or_default();
        let latest = versions.keys().last().cloned().unwrap_or_default();
        let info = json!({ "name": name, "dist-tags": { "latest": latest }, "versions": versions });
        self.fetch.serve(&Self::info_url(name), info.to_string());
    }
}

pub fn options() -> InstallOptions {
    let mut options = InstallOptions::new(CWD);
    options.registry_url = REGISTRY.to_string();
    options.cas_dir = Some(PathBuf::from("/cas"));
    options.info_dir = Some(PathBuf::from("/info"));
    options
}

pub async fn write_file(fs: &MemoryFs, path: impl AsRef<Path>, data: &str) {
    let path = path.as_ref();
    fs.create_dir_all(path.parent().unwrap()).await.unwrap();
    fs.write(path, data.as_bytes()).await.unwrap();
}

pub async fn write_project(fs: &MemoryFs, deps: &[(&str, &str)]) {
    write_file(fs, Path::new(CWD).join("package.json"), &package_json("project", "1.0.0", deps)).await;
}

pub async fn read_string(fs: &MemoryFs, path: impl AsRef<Path>) -> String {
    String::from_utf8(fs.read(path.as_ref()).await.unwrap()).unwrap()
}

pub async fn exists(fs: &MemoryFs, path: impl AsRef<Path>) -> bool {
    fs.exists(path.as_ref()).await.unwrap()
}

/// `"version"` and the installed stamp of `<dir>/package.json`.
pub async fn installed(fs: &MemoryFs, dir: impl AsRef<Path>) -> (String, Option<String>) {
    let text = read_string(fs, dir.as_ref().join("package.json")).await;
    let value: Value = serde_json::from_str(&text).unwrap();
    (
        value["version"].as_str().unwrap_or_default().to_string(),
        value["__installedVersion"].as_str().map(str::to_string),
    )
}

pub fn nm(path: &str) -> PathBuf {
    let mut out = PathBuf::from(CWD);
    for name in path.split('>') {
        out.push("node_modules");
        out.extend(name.split('/'));
    }
    out
}

/// Resolve `deps` against `registry` without a CAS or info directory.
pub async fn build_tree(
    registry: &Registry,
    deps: &[(&str, &str)],
    options: BuildOptions,
) -> (DependencyTree, Vec<String>) {
    let repo_options = RepositoryOptions { registry_url: REGISTRY.to_string(), ..RepositoryOptions::default() };
    let repo = Repository::new(Arc::new(MemoryFs::new()), registry.fetch.clone(), repo_options);
    let deps: BTreeMap<String, String> = deps.iter().map(|(n, s)| (n.to_string(), s.to_string())).collect();
    TreeBuilder::new(&repo, options).build(&deps).await.unwrap()
}
