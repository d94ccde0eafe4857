//! Plugin descriptor parsing.
//!
//! Every plugin ships a `PLUGIN.md`. It may open with a YAML front matter
//! block whose fields override what the installer would otherwise record:
//!
//! ```text
//! ---
//! version: 1.2.0
//! description: Imports Figma frames as page stubs
//! hooks: [pre-transform, post-generate]
//! config:
//!   token_env: FIGMA_TOKEN
//! ---
//! # Figma import
//! ...
//! ```

use indexmap::IndexMap;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{IoContext, PluginError, PluginResult};

/// Required descriptor file name inside a plugin tree.
pub const DESCRIPTOR_FILE_NAME: &str = "PLUGIN.md";

const FRONT_MATTER_FENCE: &str = "---";

/// Fields a plugin may declare about itself. Absent means "not declared".
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PluginDescriptor {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub hooks: Option<Vec<String>>,
    #[serde(default)]
    pub config: Option<IndexMap<String, serde_yaml::Value>>,
}

impl PluginDescriptor {
    /// Parse descriptor text. Text without front matter declares nothing.
    pub fn parse(content: &str) -> PluginResult<Self> {
        let Some(front_matter) = extract_front_matter(content) else {
            return Ok(Self::default());
        };
        if front_matter.trim().is_empty() {
            return Ok(Self::default());
        }

        let descriptor: Self = serde_yaml::from_str(front_matter).map_err(|e| {
            PluginError::ValidationFailure(format!(
                "Invalid {} front matter: {}",
                DESCRIPTOR_FILE_NAME, e
            ))
        })?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Load `PLUGIN.md` from `plugin_dir`; `Ok(None)` if the file is absent.
    pub fn load(plugin_dir: &Path) -> PluginResult<Option<Self>> {
        let path = plugin_dir.join(DESCRIPTOR_FILE_NAME);
        if !path.is_file() {
            return Ok(None);
        }
        let content =
            fs::read_to_string(&path).io_context(|| format!("Failed to read {:?}", path))?;
        Self::parse(&content).map(Some)
    }

    fn validate(&self) -> PluginResult<()> {
        if let Some(ref version) = self.version
            && semver::Version::parse(version).is_err()
        {
            return Err(PluginError::ValidationFailure(format!(
                "Invalid version '{}': must be valid semver",
                version
            )));
        }

        if let Some(ref hooks) = self.hooks
            && hooks.iter().any(|h| h.trim().is_empty())
        {
            return Err(PluginError::ValidationFailure(
                "Hook names cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Return the text between an opening `---` line and the next `---` line.
fn extract_front_matter(content: &str) -> Option<&str> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut lines = content.split_inclusive('\n');
    let first = lines.next()?;
    if first.trim_end() != FRONT_MATTER_FENCE {
        return None;
    }

    let start = first.len();
    let mut offset = start;
    for line in lines {
        if line.trim_end() == FRONT_MATTER_FENCE {
            return Some(&content[start..offset]);
        }
        offset += line.len();
    }
    None
}
