//! Locating and loading labbook.toml

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use labbook_lock::ExperimentConfig;

const FILE_NAME: &str = "labbook.toml";

/// Find the experiment layout file.
///
/// Search order:
/// 1. `--config` path (must exist)
/// 2. ./labbook.toml (current directory)
/// 3. ~/.config/labbook/labbook.toml
pub fn locate(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if !path.is_file() {
            anyhow::bail!("config file not found: {}", path.display());
        }
        return Ok(path.to_path_buf());
    }

    let local = PathBuf::from(FILE_NAME);
    if local.is_file() {
        return Ok(local);
    }

    if let Some(dirs) = directories::ProjectDirs::from("", "", "labbook") {
        let user = dirs.config_dir().join(FILE_NAME);
        if user.is_file() {
            return Ok(user);
        }
    }

    anyhow::bail!("no {FILE_NAME} in the current directory or user config dir; pass --config")
}

/// Locate and parse the experiment layout.
pub fn load(explicit: Option<&Path>) -> Result<ExperimentConfig> {
    let path = locate(explicit)?;
    let config = ExperimentConfig::from_file(&path)
        .with_context(|| format!("invalid experiment layout: {}", path.display()))?;
    log::debug!("loaded layout from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[corpus]\n[sample]\nname = \"s\"\n[config]\n[experiment]\n",
        )
        .unwrap();
        assert_eq!(locate(Some(&path)).unwrap(), path);
        let config = load(Some(&path)).unwrap();
        assert_eq!(config.sample.name, "s");
        assert_eq!(config.root, dir.path().join("."));
    }

    #[test]
    fn explicit_missing_path_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = locate(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn invalid_layout_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labbook.toml");
        std::fs::write(&path, "[corpus]\n").unwrap();
        let err = load(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("labbook.toml"));
    }
}
