use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{IoContext, StoreError, StoreResult};
use crate::plugin::installer::{DEFAULT_FETCH_TIMEOUT, DEFAULT_GIT_BASE_URL};
use crate::utils::fs::write_atomic;
use crate::utils::paths::get_config_path;

pub const DEFAULT_PLATFORMS: [&str; 4] = ["android", "ios", "wechat-mp", "h5"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectSection {
    #[serde(default = "default_project_name")]
    pub name: String,
    #[serde(default = "default_project_version")]
    pub version: String,
}

fn default_project_name() -> String {
    "my-app".to_string()
}

fn default_project_version() -> String {
    "1.0.0".to_string()
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            name: default_project_name(),
            version: default_project_version(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlatformsSection {
    /// Platform codes targeted when `transform` is run without `--platforms`
    #[serde(default = "default_enabled_platforms")]
    pub enabled: Vec<String>,
}

fn default_enabled_platforms() -> Vec<String> {
    DEFAULT_PLATFORMS.iter().map(|p| p.to_string()).collect()
}

impl Default for PlatformsSection {
    fn default() -> Self {
        Self {
            enabled: default_enabled_platforms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputSection {
    #[serde(default = "default_output_directory")]
    pub directory: String,
    #[serde(default = "default_true")]
    pub include_tests: bool,
    #[serde(default = "default_true")]
    pub include_docs: bool,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_output_directory() -> String {
    ".multi-platform/output".to_string()
}

fn default_true() -> bool {
    true
}

fn default_language() -> String {
    "zh-CN".to_string()
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
            include_tests: true,
            include_docs: true,
            language: default_language(),
        }
    }
}

/// How plugin repositories are fetched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PluginsConfig {
    #[serde(default = "default_git_base_url")]
    pub git_base_url: String,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

fn default_git_base_url() -> String {
    DEFAULT_GIT_BASE_URL.to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT.as_secs()
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            git_base_url: default_git_base_url(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

impl PluginsConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }
}

/// `.multi-platform/config.yaml`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProjectConfig {
    #[serde(default)]
    pub project: ProjectSection,

    #[serde(default)]
    pub platforms: PlatformsSection,

    /// Per-platform overrides handed to the generator verbatim
    #[serde(default)]
    pub tech_stack: IndexMap<String, serde_yaml::Value>,

    #[serde(default)]
    pub output: OutputSection,

    #[serde(default)]
    pub plugins: PluginsConfig,
}

impl ProjectConfig {
    /// Load the project's config, falling back to defaults if it is absent.
    pub fn load(base: &Path) -> StoreResult<Self> {
        let config_path = get_config_path(base);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .io_context(|| format!("Failed to read {:?}", config_path))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&content).map_err(|source| StoreError::CorruptConfig {
            path: config_path,
            source,
        })
    }

    pub fn save(&self, base: &Path) -> StoreResult<()> {
        let config_path = get_config_path(base);
        let content = serde_yaml::to_string(self).map_err(|e| StoreError::Serialize {
            what: "configuration",
            message: e.to_string(),
        })?;
        write_atomic(&config_path, content.as_bytes())
            .io_context(|| format!("Failed to write {:?}", config_path))?;
        Ok(())
    }

    /// Tech-stack override for `code`, if any.
    pub fn tech_stack_for(&self, code: &str) -> Option<&serde_yaml::Value> {
        self.tech_stack.get(code)
    }

    /// Output root resolved against the project base path.
    pub fn output_dir(&self, base: &Path) -> PathBuf {
        let dir = Path::new(&self.output.directory);
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            base.join(dir)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ProjectConfig::default();
        assert_eq!(config.project.name, "my-app");
        assert_eq!(config.platforms.enabled, vec!["android", "ios", "wechat-mp", "h5"]);
        assert!(config.tech_stack.is_empty());
        assert_eq!(config.output.directory, ".multi-platform/output");
        assert!(config.output.include_tests);
        assert!(config.output.include_docs);
        assert_eq!(config.output.language, "zh-CN");
        assert_eq!(config.plugins.git_base_url, "https://github.com");
    }

    #[test]
    fn test_load_missing_uses_defaults() {
        let temp = TempDir::new().unwrap();
        assert_eq!(ProjectConfig::load(temp.path()).unwrap(), ProjectConfig::default());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let temp = TempDir::new().unwrap();
        let path = get_config_path(temp.path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            r#"
project:
  name: shop
platforms:
  enabled: [harmony, flutter]
tech_stack:
  flutter:
    state: riverpod
"#,
        )
        .unwrap();

        let config = ProjectConfig::load(temp.path()).unwrap();
        assert_eq!(config.project.name, "shop");
        assert_eq!(config.project.version, "1.0.0");
        assert_eq!(config.platforms.enabled, vec!["harmony", "flutter"]);
        assert_eq!(
            config.tech_stack_for("flutter").unwrap()["state"],
            serde_yaml::Value::from("riverpod")
        );
        assert!(config.tech_stack_for("harmony").is_none());
        assert_eq!(config.output.language, "zh-CN");
    }

    #[test]
    fn test_malformed_config_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let path = get_config_path(temp.path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "platforms: [android").unwrap();

        let err = ProjectConfig::load(temp.path()).unwrap_err();
        assert!(matches!(err, StoreError::CorruptConfig { .. }));
    }

    #[test]
    fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let mut config = ProjectConfig::default();
        config.platforms.enabled = vec!["ios".to_string()];
        config.save(temp.path()).unwrap();

        assert_eq!(ProjectConfig::load(temp.path()).unwrap(), config);
    }

    #[test]
    fn test_output_dir_resolution() {
        let mut config = ProjectConfig::default();
        let base = Path::new("/project");
        assert_eq!(
            config.output_dir(base),
            PathBuf::from("/project/.multi-platform/output")
        );

        config.output.directory = "/elsewhere/out".to_string();
        assert_eq!(config.output_dir(base), PathBuf::from("/elsewhere/out"));
    }
}
