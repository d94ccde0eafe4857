//! Plugin lifecycle: install, update, enable, disable, and queries.
//!
//! Every operation is a locked read-modify-write on the registry file, so
//! the on-disk registry always reflects the last completed operation.

use std::path::{Path, PathBuf};

use crate::config::PluginsConfig;
use crate::error::{PluginError, PluginResult};
use crate::plugin::installer::{
    GitFetcher, InstalledTree, SourceFetcher, expand_home, install_local, install_repository,
};
use crate::plugin::registry::{LOCAL_SOURCE, PluginRecord, RegistryStore};
use crate::plugin::source::InstallSource;
use crate::utils::paths::{get_plugins_dir, get_registry_path};

/// Result of a successful install or update.
#[derive(Debug, Clone)]
pub struct InstallResult {
    pub plugin_name: String,
    pub version: String,
    pub path: PathBuf,
}

pub struct PluginLifecycleManager {
    plugins_dir: PathBuf,
    store: RegistryStore,
    fetcher: Box<dyn SourceFetcher>,
}

impl PluginLifecycleManager {
    /// Manager for `<base>/plugins` fetching repositories with `git`.
    pub fn new(base: &Path, config: &PluginsConfig) -> Self {
        let fetcher = GitFetcher::new(config.git_base_url.clone(), config.fetch_timeout());
        Self::with_fetcher(base, Box::new(fetcher))
    }

    pub fn with_fetcher(base: &Path, fetcher: Box<dyn SourceFetcher>) -> Self {
        Self {
            plugins_dir: get_plugins_dir(base),
            store: RegistryStore::new(get_registry_path(base)),
            fetcher,
        }
    }

    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    pub fn store(&self) -> &RegistryStore {
        &self.store
    }

    /// Install a plugin from a repository reference or a local directory.
    ///
    /// A fresh install is disabled, not built in, and carries only the hooks
    /// and config its `PLUGIN.md` declares.
    pub fn install(&self, source: &str) -> PluginResult<InstallResult> {
        tracing::info!("Installing plugin from: {}", source);
        let _lock = self.store.lock()?;
        self.install_locked(InstallSource::classify(source), None)
    }

    /// Re-fetch a repository-installed plugin in place.
    ///
    /// `enabled`, `hooks` and `config` survive the update unless the fetched
    /// `PLUGIN.md` declares new hooks or config.
    pub fn update(&self, name: &str) -> PluginResult<InstallResult> {
        // Held across the fetch so a concurrent enable/disable waits instead
        // of being overwritten by the stale record.
        let _lock = self.store.lock()?;
        let registry = self.store.load()?;
        let record = registry
            .plugins
            .get(name)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))?;

        if !record.is_updatable() {
            return Err(PluginError::NotUpdatable(name.to_string()));
        }

        tracing::info!("Updating plugin '{}' from {}", name, record.source);
        let source = InstallSource::classify(&record.source);
        self.install_locked(source, Some(record))
    }

    pub fn enable(&self, name: &str) -> PluginResult<()> {
        self.set_enabled(name, true)
    }

    pub fn disable(&self, name: &str) -> PluginResult<()> {
        self.set_enabled(name, false)
    }

    /// Records in registry order; disabled ones only with `include_disabled`.
    pub fn list_plugins(&self, include_disabled: bool) -> PluginResult<Vec<PluginRecord>> {
        let registry = self.store.load()?;
        Ok(registry
            .plugins
            .into_values()
            .filter(|p| include_disabled || p.enabled)
            .collect())
    }

    /// Enabled records that participate in `hook`.
    pub fn plugins_for_hook(&self, hook: &str) -> PluginResult<Vec<PluginRecord>> {
        let registry = self.store.load()?;
        Ok(registry
            .plugins
            .into_values()
            .filter(|p| p.enabled && p.has_hook(hook))
            .collect())
    }

    pub fn get(&self, name: &str) -> PluginResult<Option<PluginRecord>> {
        Ok(self.store.load()?.plugins.get(name).cloned())
    }

    fn set_enabled(&self, name: &str, enabled: bool) -> PluginResult<()> {
        self.store.update(|registry| {
            let record = registry
                .plugins
                .get_mut(name)
                .ok_or_else(|| PluginError::NotFound(name.to_string()))?;
            record.enabled = enabled;
            Ok::<(), PluginError>(())
        })?;
        tracing::info!(plugin = %name, enabled, "Plugin state changed");
        Ok(())
    }

    /// Caller must hold the registry lock.
    fn install_locked(
        &self,
        source: InstallSource,
        previous: Option<&PluginRecord>,
    ) -> PluginResult<InstallResult> {
        let plugin_name = source.plugin_name();
        let (tree, recorded_source, description) = match (&source, plugin_name) {
            (InstallSource::Remote(url), _) => {
                return Err(PluginError::UnsupportedSource(url.clone()));
            }
            (InstallSource::Unrecognized(_), _) | (_, None) => {
                return Err(PluginError::UnrecognizedSource(source.to_string()));
            }
            (InstallSource::Repository(reference), Some(plugin_name)) => {
                self.ensure_replaceable(&plugin_name)?;
                let tree = install_repository(
                    self.fetcher.as_ref(),
                    &self.plugins_dir,
                    reference,
                    &plugin_name,
                )?;
                (tree, reference.clone(), format!("Plugin from {}", reference))
            }
            (InstallSource::Local(path), Some(plugin_name)) => {
                self.ensure_replaceable(&plugin_name)?;
                let path = expand_home(path)?;
                let tree = install_local(&self.plugins_dir, &path, &plugin_name)?;
                (
                    tree,
                    LOCAL_SOURCE.to_string(),
                    format!("Local plugin from {}", path.display()),
                )
            }
        };

        let record = build_record(&tree, recorded_source, description, previous);
        let result = InstallResult {
            plugin_name: record.name.clone(),
            version: record.version.clone(),
            path: tree.path.clone(),
        };

        let mut registry = self.store.load()?;
        registry.plugins.insert(tree.plugin_name.clone(), record);
        self.store.save(&registry)?;
        tracing::info!("Successfully installed plugin: {}", tree.plugin_name);
        Ok(result)
    }

    fn ensure_replaceable(&self, plugin_name: &str) -> PluginResult<()> {
        let registry = self.store.load()?;
        match registry.plugins.get(plugin_name) {
            Some(existing) if existing.builtin => {
                Err(PluginError::BuiltinProtected(plugin_name.to_string()))
            }
            _ => Ok(()),
        }
    }
}

fn build_record(
    tree: &InstalledTree,
    source: String,
    default_description: String,
    previous: Option<&PluginRecord>,
) -> PluginRecord {
    let descriptor = tree.descriptor.clone().unwrap_or_default();
    let mut record = PluginRecord::new(tree.plugin_name.clone());

    if let Some(version) = descriptor.version {
        record.version = version;
    }
    record.description = descriptor.description.unwrap_or(default_description);
    record.source = source;

    match previous {
        Some(prev) => {
            record.enabled = prev.enabled;
            record.hooks = descriptor.hooks.unwrap_or_else(|| prev.hooks.clone());
            record.config = descriptor.config.unwrap_or_else(|| prev.config.clone());
        }
        None => {
            record.hooks = descriptor.hooks.unwrap_or_default();
            record.config = descriptor.config.unwrap_or_default();
        }
    }

    record
}
