//! Plugin tree installation.
//!
//! Repository references are fetched into a staging directory next to the
//! final location, validated, then promoted over any existing install.
//! Local installs copy files (no symlinks) into the plugins directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{IoContext, PluginError, PluginResult};
use crate::plugin::manifest::{DESCRIPTOR_FILE_NAME, PluginDescriptor};
use crate::plugin::source::is_valid_plugin_name;
use crate::utils::fs::{copy_dir_recursive, remove_dir_if_exists};

pub const DEFAULT_GIT_BASE_URL: &str = "https://github.com";
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(120);

const STAGING_PREFIX: &str = "_temp-";
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Fetches a repository reference into a local directory.
pub trait SourceFetcher {
    /// Populate `destination` (which does not exist yet) with the tree
    /// referenced by `reference`.
    fn fetch(&self, reference: &str, destination: &Path) -> PluginResult<()>;
}

/// Shallow `git clone` with a bounded wait.
#[derive(Debug, Clone)]
pub struct GitFetcher {
    base_url: String,
    timeout: Duration,
    program: String,
    leading_args: Vec<String>,
}

impl Default for GitFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_GIT_BASE_URL, DEFAULT_FETCH_TIMEOUT)
    }
}

impl GitFetcher {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
            program: "git".to_string(),
            leading_args: Vec::new(),
        }
    }

    /// Run `program` with `leading_args` in place of `git`; the clone
    /// arguments follow them.
    pub fn with_program<I, S>(mut self, program: impl Into<String>, leading_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.program = program.into();
        self.leading_args = leading_args.into_iter().map(Into::into).collect();
        self
    }

    pub fn clone_url(&self, reference: &str) -> String {
        format!(
            "{}/{}.git",
            self.base_url.trim_end_matches('/'),
            reference.trim_end_matches(".git")
        )
    }
}

impl SourceFetcher for GitFetcher {
    fn fetch(&self, reference: &str, destination: &Path) -> PluginResult<()> {
        let url = self.clone_url(reference);
        tracing::info!(reference = %reference, url = %url, "Cloning plugin repository");

        let mut child = Command::new(&self.program)
            .args(&self.leading_args)
            .args(["clone", "--depth", "1", "-q"])
            .arg(&url)
            .arg(destination)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| PluginError::FetchFailed {
                reference: reference.to_string(),
                message: format!("could not run {}: {}", self.program, e),
            })?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let status = child.try_wait().map_err(|e| PluginError::FetchFailed {
                reference: reference.to_string(),
                message: e.to_string(),
            })?;

            if let Some(status) = status {
                if status.success() {
                    return Ok(());
                }
                return Err(PluginError::FetchFailed {
                    reference: reference.to_string(),
                    message: format!("{} clone exited with {}", self.program, status),
                });
            }

            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(PluginError::FetchTimedOut {
                    reference: reference.to_string(),
                    seconds: self.timeout.as_secs(),
                });
            }

            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Staging directory removed on drop unless promoted.
struct StagingDir {
    path: PathBuf,
    promoted: bool,
}

impl StagingDir {
    /// Claim `<plugins>/_temp-<name>`, clearing any orphan from an
    /// interrupted earlier attempt.
    fn claim(plugins_dir: &Path, plugin_name: &str) -> PluginResult<Self> {
        let path = plugins_dir.join(format!("{}{}", STAGING_PREFIX, plugin_name));
        if path.exists() {
            tracing::warn!("Removing leftover staging directory {:?}", path);
        }
        remove_dir_if_exists(&path)
            .io_context(|| format!("Failed to clear staging directory {:?}", path))?;
        Ok(Self {
            path,
            promoted: false,
        })
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if !self.promoted
            && let Err(e) = remove_dir_if_exists(&self.path)
        {
            tracing::warn!("Failed to clean up staging directory {:?}: {}", self.path, e);
        }
    }
}

/// A plugin tree now in place under the plugins directory.
#[derive(Debug, Clone)]
pub struct InstalledTree {
    pub plugin_name: String,
    pub path: PathBuf,
    /// Parsed `PLUGIN.md`, if the tree has one
    pub descriptor: Option<PluginDescriptor>,
}

/// Fetch `reference` and move it to `<plugins>/<plugin_name>`.
///
/// The fetched tree must contain `PLUGIN.md`; otherwise nothing is
/// promoted and the staging directory is removed.
pub fn install_repository(
    fetcher: &dyn SourceFetcher,
    plugins_dir: &Path,
    reference: &str,
    plugin_name: &str,
) -> PluginResult<InstalledTree> {
    check_plugin_name(plugin_name)?;
    fs::create_dir_all(plugins_dir)
        .io_context(|| format!("Failed to create plugins directory {:?}", plugins_dir))?;

    let mut staging = StagingDir::claim(plugins_dir, plugin_name)?;
    fetcher.fetch(reference, &staging.path)?;

    if !staging.path.join(DESCRIPTOR_FILE_NAME).is_file() {
        return Err(PluginError::ValidationFailure(format!(
            "{} not found in {}",
            DESCRIPTOR_FILE_NAME, reference
        )));
    }
    let descriptor = PluginDescriptor::load(&staging.path)?;

    let target_dir = plugins_dir.join(plugin_name);
    replace_dir(&staging.path, &target_dir)?;
    staging.promoted = true;

    Ok(InstalledTree {
        plugin_name: plugin_name.to_string(),
        path: target_dir,
        descriptor,
    })
}

/// Copy the local directory `source_dir` to `<plugins>/<plugin_name>`.
pub fn install_local(
    plugins_dir: &Path,
    source_dir: &Path,
    plugin_name: &str,
) -> PluginResult<InstalledTree> {
    check_plugin_name(plugin_name)?;
    if !source_dir.exists() {
        return Err(PluginError::SourceMissing(source_dir.to_path_buf()));
    }
    if !source_dir.is_dir() {
        return Err(PluginError::ValidationFailure(format!(
            "Source path is not a directory: {:?}",
            source_dir
        )));
    }

    // Validate before touching the plugins directory.
    let descriptor = PluginDescriptor::load(source_dir)?;

    let target_dir = plugins_dir.join(plugin_name);
    if same_dir(source_dir, &target_dir) {
        return Err(PluginError::ValidationFailure(format!(
            "Source {:?} is already the installed plugin directory",
            source_dir
        )));
    }

    fs::create_dir_all(plugins_dir)
        .io_context(|| format!("Failed to create plugins directory {:?}", plugins_dir))?;
    remove_dir_if_exists(&target_dir)
        .io_context(|| format!("Failed to remove existing plugin {:?}", target_dir))?;
    copy_dir_recursive(source_dir, &target_dir).io_context(|| {
        format!(
            "Failed to copy plugin files from {:?} to {:?}",
            source_dir, target_dir
        )
    })?;

    Ok(InstalledTree {
        plugin_name: plugin_name.to_string(),
        path: target_dir,
        descriptor,
    })
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &Path) -> PluginResult<PathBuf> {
    let Ok(rest) = path.strip_prefix("~") else {
        return Ok(path.to_path_buf());
    };
    let home = dirs::home_dir().ok_or_else(|| {
        PluginError::ValidationFailure("Could not find home directory".to_string())
    })?;
    Ok(home.join(rest))
}

/// Target directories are removed before being replaced, so the name must
/// stay inside the plugins directory.
fn check_plugin_name(plugin_name: &str) -> PluginResult<()> {
    if is_valid_plugin_name(plugin_name) {
        Ok(())
    } else {
        Err(PluginError::ValidationFailure(format!(
            "Invalid plugin name {:?}",
            plugin_name
        )))
    }
}

/// Move `from` over `to`, replacing whatever was there.
fn replace_dir(from: &Path, to: &Path) -> PluginResult<()> {
    remove_dir_if_exists(to)
        .io_context(|| format!("Failed to remove existing plugin {:?}", to))?;

    // Try rename first, fall back to copy (rename fails across filesystems)
    if fs::rename(from, to).is_err() {
        copy_dir_recursive(from, to)
            .io_context(|| format!("Failed to move plugin into {:?}", to))?;
        remove_dir_if_exists(from)
            .io_context(|| format!("Failed to remove staging directory {:?}", from))?;
    }
    Ok(())
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
