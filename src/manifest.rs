use crate::error::{Error, IoContext, Result};
use crate::fs::FileSystem;
use semver::Version;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Field stamped into installed `package.json` files.
pub const INSTALLED_VERSION_FIELD: &str = "__installedVersion";

/// The parts of a `package.json` the installer reads.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Anything other than an object of strings reads as empty.
    #[serde(default, deserialize_with = "lenient_specs")]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub dist: Option<Dist>,
    #[serde(rename = "__installedVersion", default, skip_serializing_if = "Option::is_none")]
    pub installed_version: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Dist {
    pub tarball: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shasum: Option<String>,
}

fn lenient_specs<'de, D: Deserializer<'de>>(de: D) -> std::result::Result<BTreeMap<String, String>, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::Object(map) => map
            .into_iter()
            .filter_map(|(name, spec)| match spec {
                Value::String(spec) => Some((name, spec)),
                _ => None,
            })
            .collect(),
        _ => BTreeMap::new(),
    })
}

/// `None` for a value that does not fit `T`.
fn lenient<'de, D: Deserializer<'de>, T: DeserializeOwned>(de: D) -> std::result::Result<Option<T>, D::Error> {
    Ok(serde_json::from_value(Value::deserialize(de)?).ok())
}

impl Manifest {
    pub fn from_slice(data: &[u8], context: &str) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| Error::json(context, e))
    }

    pub fn from_value(value: Value, context: &str) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| Error::json(context, e))
    }

    /// Declared dependencies, read from `key` when the manifest has it.
    pub fn dependency_specs(&self, key: Option<&str>) -> BTreeMap<String, String> {
        if let Some(Value::Object(map)) = key.and_then(|k| self.extra.get(k)) {
            return map
                .iter()
                .filter_map(|(name, spec)| spec.as_str().map(|s| (name.clone(), s.to_string())))
                .collect();
        }
        self.dependencies.clone()
    }
}

/// Registry response for one package name.
///
/// Version entries stay raw JSON until one is asked for, so a malformed old
/// release never hides the others.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Packument {
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default)]
    pub versions: BTreeMap<String, Value>,
}

impl Packument {
    pub fn semver_versions(&self) -> Vec<Version> {
        self.versions.keys().filter_map(|v| Version::parse(v).ok()).collect()
    }

    /// The manifest of one version, `None` when the registry does not list it.
    pub fn manifest(&self, version: &Version) -> Result<Option<Manifest>> {
        let Some(value) = self.versions.get(&version.to_string()) else {
            return Ok(None);
        };
        let context = format!("{}@{version}", self.name.as_deref().unwrap_or_default());
        Manifest::from_value(value.clone(), &context).map(Some)
    }
}

pub async fn load(fs: &dyn FileSystem, path: &Path) -> Result<Manifest> {
    let data = fs.read(path).await.at(path)?;
    Manifest::from_slice(&data, &path.display().to_string())
}

/// The installed-version stamp of the package at `dir`, if there is one.
pub async fn installed_version(fs: &dyn FileSystem, dir: &Path) -> Result<Option<String>> {
    let path = dir.join("package.json");
    if !crate::fsutil::exists(fs, &path).await? {
        return Ok(None);
    }
    Ok(load(fs, &path).await?.installed_version)
}

/// Rewrite `<dir>/package.json` with the installed-version stamp, keeping every other field.
pub async fn stamp_installed_version(fs: &dyn FileSystem, dir: &Path, version: &str) -> Result<()> {
    let path = dir.join("package.json");
    let data = fs.read(&path).await.at(&path)?;
    let mut doc: Value =
        serde_json::from_slice(&data).map_err(|e| Error::json(path.display().to_string(), e))?;
    let Value::Object(map) = &mut doc else {
        return Err(Error::Invariant(format!("{} is not a json object", path.display())));
    };
    map.insert(INSTALLED_VERSION_FIELD.to_string(), Value::String(version.to_string()));
    let text = serde_json::to_string_pretty(&doc).map_err(|e| Error::json(path.display().to_string(), e))?;
    crate::fsutil::rewrite_file(fs, &path, text.as_bytes()).await
}
