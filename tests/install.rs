use base64::{engine::general_purpose::STANDARD, Engine};
use flate2::write::GzEncoder;
use flate2::Compression;
use nestpm::fetch::HttpFetch;
use nestpm::fs::OsFs;
use nestpm::{InstallOptions, Installer};
use serde_json::{json, Value};
use sha2::{Digest, Sha512};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use url::Url;

/// Lays out `<dir>/<name>` package documents and `<dir>/-/<name>-<version>.tgz`
/// tarballs so a `file:` URL to `dir` works as a registry.
fn publish(dir: &Path, name: &str, releases: &[(&str, &[(&str, &str)])]) {
    let mut versions = serde_json::Map::new();
    for (version, deps) in releases {
        let deps: serde_json::Map<String, Value> = deps.iter().map(|(n, s)| (n.to_string(), json!(s))).collect();
        let manifest = json!({ "name": name, "version": version, "dependencies": deps });
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (path, data) in [
            ("package/package.json", manifest.to_string()),
            ("package/lib/index.js", format!("module.exports = '{name}@{version}';\n")),
        ] {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, data.as_bytes()).unwrap();
        }
        let tarball = builder.into_inner().unwrap().finish().unwrap();

        let file = dir.join("-").join(format!("{name}-{version}.tgz"));
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, &tarball).unwrap();
        let integrity = format!("sha512-{}", STANDARD.encode(Sha512::digest(&tarball)));
        let mut entry = manifest;
        entry["dist"] = json!({
            "tarball": Url::from_file_path(&file).unwrap().to_string(),
            "integrity": integrity,
        });
        versions.insert(version.to_string(), entry);
    }
    let info = json!({ "name": name, "versions": versions });
    fs::write(dir.join(name), info.to_string()).unwrap();
}

fn project(dir: &Path, deps: Value) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("package.json"), json!({ "name": "app", "dependencies": deps }).to_string()).unwrap();
}

fn installer(options: InstallOptions) -> Installer {
    Installer::new(Arc::new(OsFs::new()), Arc::new(HttpFetch::new().unwrap()), options)
}

#[tokio::test]
async fn installs_from_a_file_registry_into_a_real_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = tmp.path().join("registry");
    publish(&registry, "a", &[("1.0.0", &[]), ("1.0.1", &[("b", "^2.0.0")])]);
    publish(&registry, "b", &[("2.0.0", &[]), ("2.1.0", &[])]);

    let cwd = tmp.path().join("app");
    project(&cwd, json!({ "a": "^1.0.0" }));
    fs::create_dir_all(cwd.join("node_modules/left-over")).unwrap();

    let mut options = InstallOptions::new(&cwd);
    options.registry_url = Url::from_directory_path(&registry).unwrap().to_string();
    options.cas_dir = Some(tmp.path().join("cas"));
    options.info_dir = Some(tmp.path().join("info"));

    let report = installer(options.clone()).run().await.unwrap();
    assert!(report.success);
    assert_eq!(report.removed, Some(1));

    let nm = cwd.join("node_modules");
    let a: Value = serde_json::from_str(&fs::read_to_string(nm.join("a/package.json")).unwrap()).unwrap();
    assert_eq!(a["version"], "1.0.1");
    assert_eq!(a["__installedVersion"], "1.0.1");
    assert_eq!(fs::read_to_string(nm.join("b/lib/index.js")).unwrap(), "module.exports = 'b@2.1.0';\n");
    assert!(!nm.join("a/node_modules/b").exists());
    assert!(!nm.join("left-over").exists());
    assert!(!nm.join(".INCOMPLETE").exists());
    assert!(tmp.path().join("info/a").is_file());

    // Stamping the installed manifest must not reach the stored copy.
    let stored: Value =
        serde_json::from_str(&fs::read_to_string(tmp.path().join("cas/a@1.0.1/package.json")).unwrap()).unwrap();
    assert!(stored.get("__installedVersion").is_none());

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        let installed = fs::metadata(nm.join("b/lib/index.js")).unwrap();
        let stored = fs::metadata(tmp.path().join("cas/b@2.1.0/lib/index.js")).unwrap();
        assert_eq!(installed.ino(), stored.ino());
    }

    options.quick = true;
    let again = installer(options).run().await.unwrap();
    assert!(again.quick);
}

#[tokio::test]
async fn missing_registry_package_fails_and_marks_incomplete() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = tmp.path().join("registry");
    fs::create_dir_all(&registry).unwrap();
    let cwd = tmp.path().join("app");
    project(&cwd, json!({ "ghost": "^1.0.0" }));

    let mut options = InstallOptions::new(&cwd);
    options.registry_url = Url::from_directory_path(&registry).unwrap().to_string();

    let err = installer(options).run().await.unwrap_err();
    assert!(matches!(err, nestpm::Error::Http { status: 404, .. }), "{err}");
    assert!(cwd.join("node_modules/.INCOMPLETE").exists());
}
