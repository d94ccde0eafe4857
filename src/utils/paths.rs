use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};

/// Project-local working directory.
pub const WORKSPACE_DIR_NAME: &str = ".multi-platform";

pub const PLUGINS_DIR_NAME: &str = "plugins";
pub const REGISTRY_FILE_NAME: &str = "_registry.yaml";
pub const CONFIG_FILE_NAME: &str = "config.yaml";
pub const MANIFEST_FILE_NAME: &str = "manifest.json";
pub const BACKUP_DIR_NAME: &str = "backup";

pub fn get_workspace_dir(base: &Path) -> PathBuf {
    base.join(WORKSPACE_DIR_NAME)
}

pub fn get_config_path(base: &Path) -> PathBuf {
    get_workspace_dir(base).join(CONFIG_FILE_NAME)
}

pub fn get_requirements_dir(base: &Path) -> PathBuf {
    get_workspace_dir(base).join("requirements")
}

pub fn get_output_dir(base: &Path) -> PathBuf {
    get_workspace_dir(base).join("output")
}

pub fn get_cache_dir(base: &Path) -> PathBuf {
    get_workspace_dir(base).join("cache")
}

pub fn get_reports_dir(base: &Path) -> PathBuf {
    get_workspace_dir(base).join("reports")
}

pub fn get_i18n_dir(base: &Path) -> PathBuf {
    get_workspace_dir(base).join("i18n")
}

/// The fixed directory skeleton created by `init`.
pub fn workspace_skeleton(base: &Path) -> [PathBuf; 5] {
    [
        get_requirements_dir(base),
        get_output_dir(base),
        get_cache_dir(base),
        get_reports_dir(base),
        get_i18n_dir(base),
    ]
}

pub fn get_plugins_dir(base: &Path) -> PathBuf {
    base.join(PLUGINS_DIR_NAME)
}

pub fn get_registry_path(base: &Path) -> PathBuf {
    get_plugins_dir(base).join(REGISTRY_FILE_NAME)
}

pub fn get_manifest_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(MANIFEST_FILE_NAME)
}

pub fn get_backup_root(cache_dir: &Path) -> PathBuf {
    cache_dir.join(BACKUP_DIR_NAME)
}

/// Log files live outside the project tree so they never show up in output.
pub fn get_logs_dir() -> Result<PathBuf> {
    let data_dir =
        dirs::data_local_dir().ok_or_else(|| anyhow!("Could not find local data directory"))?;
    Ok(data_dir.join("multi-platform").join("logs"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_layout() {
        let base = Path::new("/project");
        assert_eq!(get_workspace_dir(base), PathBuf::from("/project/.multi-platform"));
        assert_eq!(
            get_config_path(base),
            PathBuf::from("/project/.multi-platform/config.yaml")
        );
        assert!(get_output_dir(base).ends_with("output"));
        assert!(get_i18n_dir(base).ends_with("i18n"));
    }

    #[test]
    fn test_skeleton_is_five_distinct_dirs_under_workspace() {
        let base = Path::new("/project");
        let skeleton = workspace_skeleton(base);
        for dir in &skeleton {
            assert!(dir.starts_with(get_workspace_dir(base)));
        }
        let mut names: Vec<_> = skeleton.iter().filter_map(|d| d.file_name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 5);
    }

    #[test]
    fn test_registry_path() {
        let path = get_registry_path(Path::new("/project"));
        assert_eq!(path, PathBuf::from("/project/plugins/_registry.yaml"));
    }

    #[test]
    fn test_logs_dir_outside_project() {
        let dir = get_logs_dir().unwrap();
        assert!(dir.to_string_lossy().contains("multi-platform"));
        assert!(dir.ends_with("logs"));
    }
}
