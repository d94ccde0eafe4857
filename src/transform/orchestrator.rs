//! Run preparation for the external generation agent.
//!
//! The orchestrator decides which platforms a run targets, snapshots prior
//! output and lays out empty per-platform directories. Generation itself
//! happens elsewhere; its results come back through [`TransformOrchestrator::record_outputs`].

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ProjectConfig;
use crate::storage::CacheManifest;
use crate::transform::platform::PlatformTarget;
use crate::utils::fs::dir_is_empty;
use crate::utils::paths::{
    get_cache_dir, get_config_path, get_requirements_dir, get_workspace_dir, workspace_skeleton,
};

/// Extension of files treated as requirement documents.
pub const REQUIREMENT_EXTENSION: &str = "md";

/// Output subdirectory for assets shared by every platform.
pub const SHARED_DIR_NAME: &str = "_shared";

/// What `initialize` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
    pub workspace: PathBuf,
    pub config_created: bool,
}

/// Everything the generation agent needs for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformPlan {
    pub targets: Vec<PlatformTarget>,
    pub documents: Vec<PathBuf>,
    /// Per-platform directories in target order, followed by the shared directory
    pub output_dirs: Vec<PathBuf>,
    /// Snapshot of the previous output, if there was any
    pub backup: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransformOutcome {
    /// No requirement documents; nothing on disk was touched.
    NoRequirements { targets: Vec<PlatformTarget> },
    Prepared(TransformPlan),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    /// Recorded and unchanged since
    Cached,
    /// Never recorded, or its bytes changed since the last record
    Changed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentStatus {
    pub path: PathBuf,
    pub state: DocumentState,
}

pub struct TransformOrchestrator {
    base: PathBuf,
}

impl TransformOrchestrator {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn workspace_dir(&self) -> PathBuf {
        get_workspace_dir(&self.base)
    }

    pub fn load_config(&self) -> Result<ProjectConfig> {
        ProjectConfig::load(&self.base).context("Failed to load project configuration")
    }

    /// Create the workspace skeleton and, if absent, a default config.
    ///
    /// An existing config file is never rewritten.
    pub fn initialize(&self) -> Result<InitReport> {
        for dir in workspace_skeleton(&self.base) {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory {:?}", dir))?;
        }

        let config_path = get_config_path(&self.base);
        let config_created = !config_path.exists();
        if config_created {
            ProjectConfig::default()
                .save(&self.base)
                .context("Failed to write default configuration")?;
            tracing::info!("Wrote default configuration to {:?}", config_path);
        }

        Ok(InitReport {
            workspace: self.workspace_dir(),
            config_created,
        })
    }

    /// Platforms enabled in the project config, in config order.
    pub fn enabled_platforms(&self) -> Result<Vec<PlatformTarget>> {
        let config = self.load_config()?;
        Ok(config
            .platforms
            .enabled
            .iter()
            .map(|code| PlatformTarget::resolve(code, &config))
            .collect())
    }

    /// Requirement documents in the requirements root, sorted by path.
    pub fn requirement_documents(&self) -> Result<Vec<PathBuf>> {
        let requirements_dir = get_requirements_dir(&self.base);
        if !requirements_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut documents = Vec::new();
        for entry in fs::read_dir(&requirements_dir)
            .with_context(|| format!("Failed to read {:?}", requirements_dir))?
        {
            let path = entry?.path();
            if path.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(REQUIREMENT_EXTENSION)
            {
                documents.push(path);
            }
        }
        documents.sort();
        Ok(documents)
    }

    /// Prepare the output tree for a run.
    ///
    /// `explicit_platforms` overrides the configured list when non-empty.
    pub fn transform(&self, explicit_platforms: Option<&[String]>) -> Result<TransformOutcome> {
        let config = self.load_config()?;
        let targets = target_set(explicit_platforms, &config);

        let documents = self.requirement_documents()?;
        if documents.is_empty() {
            tracing::warn!(
                "No requirement documents under {:?}",
                get_requirements_dir(&self.base)
            );
            return Ok(TransformOutcome::NoRequirements { targets });
        }

        let output_dir = config.output_dir(&self.base);
        let empty = dir_is_empty(&output_dir)
            .with_context(|| format!("Failed to read output directory {:?}", output_dir))?;
        let backup = if empty {
            None
        } else {
            let manifest = CacheManifest::open(get_cache_dir(&self.base))?;
            manifest.backup(&output_dir)?
        };

        let mut output_dirs: Vec<PathBuf> = targets
            .iter()
            .map(|target| output_dir.join(&target.code))
            .collect();
        output_dirs.push(output_dir.join(SHARED_DIR_NAME));

        for dir in &output_dirs {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create output directory {:?}", dir))?;
        }

        tracing::info!(
            "Prepared {} platform directories for {} document(s)",
            targets.len(),
            documents.len()
        );

        Ok(TransformOutcome::Prepared(TransformPlan {
            targets,
            documents,
            output_dirs,
            backup,
        }))
    }

    /// Cache state of each requirement document.
    pub fn document_status(&self) -> Result<Vec<DocumentStatus>> {
        let documents = self.requirement_documents()?;
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let manifest = CacheManifest::open(get_cache_dir(&self.base))?;
        documents
            .into_iter()
            .map(|path| -> Result<DocumentStatus> {
                let state = if manifest.is_cached(&path)? {
                    DocumentState::Cached
                } else {
                    DocumentState::Changed
                };
                Ok(DocumentStatus { path, state })
            })
            .collect()
    }

    /// Index the files generated from `document`.
    pub fn record_outputs(&self, document: &Path, outputs: Vec<String>) -> Result<()> {
        let document = self.resolve_document(document);
        if !document.is_file() {
            anyhow::bail!("Requirement document not found: {}", document.display());
        }

        let mut manifest = CacheManifest::open(get_cache_dir(&self.base))?;
        manifest
            .update_cache(&document, outputs)
            .with_context(|| format!("Failed to record outputs for {:?}", document))?;
        Ok(())
    }

    /// Relative paths are looked up in the requirements root, then under the
    /// project base, then as given.
    fn resolve_document(&self, document: &Path) -> PathBuf {
        let found = if document.is_absolute() {
            document.to_path_buf()
        } else {
            [
                get_requirements_dir(&self.base).join(document),
                self.base.join(document),
                document.to_path_buf(),
            ]
            .into_iter()
            .find(|candidate| candidate.is_file())
            .unwrap_or_else(|| self.base.join(document))
        };
        self.requirements_form(found)
    }

    /// Documents inside the requirements root are keyed exactly as
    /// `requirement_documents` lists them, however they were spelled.
    fn requirements_form(&self, path: PathBuf) -> PathBuf {
        let requirements_dir = get_requirements_dir(&self.base);
        let in_requirements = match (
            path.parent().map(Path::canonicalize),
            requirements_dir.canonicalize(),
        ) {
            (Some(Ok(parent)), Ok(root)) => parent == root,
            _ => false,
        };

        if in_requirements && let Some(name) = path.file_name() {
            return requirements_dir.join(name);
        }
        path
    }
}

/// Explicit codes (deduplicated, in given order) or the configured list.
fn target_set(explicit: Option<&[String]>, config: &ProjectConfig) -> Vec<PlatformTarget> {
    let codes: &[String] = match explicit {
        Some(codes) if !codes.is_empty() => codes,
        _ => &config.platforms.enabled,
    };

    let mut targets: Vec<PlatformTarget> = Vec::new();
    for code in codes {
        if !targets.iter().any(|t| &t.code == code) {
            targets.push(PlatformTarget::resolve(code, config));
        }
    }
    targets
}
