use crate::options::{InstallOptions, CONFIG_FILE};
use anyhow::{Context, Result};
use std::io;
use std::path::Path;

/// Options from `<cwd>/.nestpm.json`, or the defaults when there is none.
/// `cwd` always wins over a `cwd` key in the file.
pub async fn load(cwd: &Path) -> Result<InstallOptions> {
    let path = cwd.join(CONFIG_FILE);
    let mut options = match tokio::fs::read_to_string(&path).await {
        Ok(text) => serde_json::from_str::<InstallOptions>(&text)
            .with_context(|| format!("parse {}", path.display()))?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => InstallOptions::default(),
        Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
    };
    options.cwd = cwd.to_path_buf();
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let options = load(dir.path()).await.unwrap();
        assert_eq!(options, InstallOptions::new(dir.path()));
    }

    #[tokio::test]
    async fn file_values_are_read() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"cwd": "/elsewhere", "quick": true, "casDir": "cas"}"#,
        )
        .unwrap();
        let options = load(dir.path()).await.unwrap();
        assert_eq!(options.cwd, dir.path());
        assert!(options.quick);
        assert_eq!(options.cas_path(), Some(dir.path().join("cas")));
    }
}
