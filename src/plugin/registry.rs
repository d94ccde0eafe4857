//! Durable plugin registry (`plugins/_registry.yaml`).
//!
//! The file on disk is the single source of truth: every mutation is a
//! locked read-modify-write of the whole document.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{IoContext, StoreError, StoreResult};
use crate::storage::StoreLock;
use crate::utils::fs::write_atomic;

pub const DEFAULT_REGISTRY_VERSION: &str = "1.0.0";
pub const DEFAULT_PLUGIN_VERSION: &str = "1.0.0";

/// Marker stored in `source` for plugins copied from a local directory.
pub const LOCAL_SOURCE: &str = "local";

/// Registry entry for one installed plugin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PluginRecord {
    #[serde(default)]
    pub name: String,

    #[serde(default = "default_plugin_version")]
    pub version: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub enabled: bool,

    /// Shipped with the tool; install and update refuse to replace it
    #[serde(default)]
    pub builtin: bool,

    /// Named integration points this plugin participates in
    #[serde(default)]
    pub hooks: Vec<String>,

    #[serde(default)]
    pub config: IndexMap<String, serde_yaml::Value>,

    /// Repository reference, [`LOCAL_SOURCE`], or empty
    #[serde(default)]
    pub source: String,
}

fn default_plugin_version() -> String {
    DEFAULT_PLUGIN_VERSION.to_string()
}

impl PluginRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: default_plugin_version(),
            description: String::new(),
            enabled: false,
            builtin: false,
            hooks: Vec::new(),
            config: IndexMap::new(),
            source: String::new(),
        }
    }

    /// Whether `update` can re-fetch this plugin.
    pub fn is_updatable(&self) -> bool {
        !self.source.is_empty() && self.source != LOCAL_SOURCE
    }

    pub fn has_hook(&self, hook: &str) -> bool {
        self.hooks.iter().any(|h| h == hook)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Registry {
    #[serde(default = "default_registry_version")]
    pub version: String,

    /// Insertion order is kept so listings are deterministic.
    #[serde(default)]
    pub plugins: IndexMap<String, PluginRecord>,
}

fn default_registry_version() -> String {
    DEFAULT_REGISTRY_VERSION.to_string()
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            version: default_registry_version(),
            plugins: IndexMap::new(),
        }
    }
}

/// Exclusive owner of one registry file.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    path: PathBuf,
}

impl RegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the registry, or a fresh one if the file does not exist.
    pub fn load(&self) -> StoreResult<Registry> {
        if !self.path.exists() {
            return Ok(Registry::default());
        }

        let content = fs::read_to_string(&self.path)
            .io_context(|| format!("Failed to read registry {:?}", self.path))?;
        if content.trim().is_empty() {
            return Ok(Registry::default());
        }

        let mut registry: Registry =
            serde_yaml::from_str(&content).map_err(|source| StoreError::CorruptRegistry {
                path: self.path.clone(),
                source,
            })?;

        for (key, record) in registry.plugins.iter_mut() {
            if record.name.is_empty() {
                record.name = key.clone();
            }
        }

        Ok(registry)
    }

    /// Rewrite the whole registry file.
    pub fn save(&self, registry: &Registry) -> StoreResult<()> {
        let content = serde_yaml::to_string(registry).map_err(|e| StoreError::Serialize {
            what: "plugin registry",
            message: e.to_string(),
        })?;
        write_atomic(&self.path, content.as_bytes())
            .io_context(|| format!("Failed to write registry {:?}", self.path))?;
        Ok(())
    }

    /// Take the store lock for a longer cycle than a single `update`.
    ///
    /// Only `load` and `save` may be called while the guard is alive;
    /// `update` and `upsert` would wait on it forever.
    pub fn lock(&self) -> StoreResult<StoreLock> {
        let lock = StoreLock::acquire(&self.path)
            .io_context(|| format!("Failed to lock registry {:?}", self.path))?;
        Ok(lock)
    }

    /// Run `mutate` against the current on-disk registry under the store lock.
    ///
    /// The registry is saved only when `mutate` succeeds; on error the file is
    /// left untouched.
    pub fn update<T, E, F>(&self, mutate: F) -> Result<T, E>
    where
        F: FnOnce(&mut Registry) -> Result<T, E>,
        E: From<StoreError>,
    {
        let _lock = self.lock()?;

        let mut registry = self.load()?;
        let out = mutate(&mut registry)?;
        self.save(&registry)?;
        Ok(out)
    }

    /// Insert or fully replace the record for `name`.
    pub fn upsert(&self, name: &str, record: PluginRecord) -> StoreResult<()> {
        self.update(|registry| {
            registry.plugins.insert(name.to_string(), record);
            Ok::<(), StoreError>(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn store() -> (TempDir, RegistryStore) {
        let temp = TempDir::new().unwrap();
        let store = RegistryStore::new(temp.path().join("plugins").join("_registry.yaml"));
        (temp, store)
    }

    #[test]
    fn test_load_missing_returns_fresh_registry() {
        let (_temp, store) = store();
        let registry = store.load().unwrap();
        assert_eq!(registry.version, "1.0.0");
        assert!(registry.plugins.is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_load_empty_file_is_fresh() {
        let (_temp, store) = store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "").unwrap();
        assert_eq!(store.load().unwrap(), Registry::default());
    }

    #[test]
    fn test_load_malformed_is_corrupt() {
        let (_temp, store) = store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "plugins: [unclosed").unwrap();

        let err = store.load().unwrap_err();
        assert!(matches!(err, StoreError::CorruptRegistry { .. }));
    }

    #[test]
    fn test_load_fills_defaults_and_names() {
        let (_temp, store) = store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(
            store.path(),
            r#"
version: "2.0.0"
plugins:
  figma-import:
    enabled: true
    hooks: [pre-transform]
"#,
        )
        .unwrap();

        let registry = store.load().unwrap();
        assert_eq!(registry.version, "2.0.0");
        let record = &registry.plugins["figma-import"];
        assert_eq!(record.name, "figma-import");
        assert_eq!(record.version, "1.0.0");
        assert!(record.enabled);
        assert!(!record.builtin);
        assert!(record.has_hook("pre-transform"));
    }

    #[test]
    fn test_upsert_persists_and_replaces() {
        let (_temp, store) = store();

        let mut record = PluginRecord::new("alpha");
        record.source = "acme/alpha".to_string();
        store.upsert("alpha", record.clone()).unwrap();
        store.upsert("beta", PluginRecord::new("beta")).unwrap();

        record.description = "replaced".to_string();
        store.upsert("alpha", record).unwrap();

        let registry = store.load().unwrap();
        let names: Vec<_> = registry.plugins.keys().cloned().collect();
        assert_eq!(names, vec!["alpha", "beta"]);
        assert_eq!(registry.plugins["alpha"].description, "replaced");
    }

    #[test]
    fn test_failed_update_does_not_write() {
        let (_temp, store) = store();
        store.upsert("alpha", PluginRecord::new("alpha")).unwrap();
        let before = fs::read(store.path()).unwrap();

        let result: Result<(), StoreError> = store.update(|registry| {
            registry.plugins.clear();
            Err(StoreError::Serialize {
                what: "test",
                message: "abort".to_string(),
            })
        });

        assert!(result.is_err());
        assert_eq!(fs::read(store.path()).unwrap(), before);
    }

    #[test]
    fn test_is_updatable() {
        let mut record = PluginRecord::new("x");
        assert!(!record.is_updatable());
        record.source = LOCAL_SOURCE.to_string();
        assert!(!record.is_updatable());
        record.source = "owner/x".to_string();
        assert!(record.is_updatable());
    }
}
