//! Classification of plugin installation sources.
//!
//! Classification is purely syntactic; nothing here touches the filesystem.

use std::fmt;
use std::path::PathBuf;

/// Where a plugin should be installed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallSource {
    /// `scheme://...` URL (not supported yet)
    Remote(String),
    /// Repository reference such as `owner/repo`
    Repository(String),
    /// Filesystem path to a plugin directory
    Local(PathBuf),
    /// Input that fits none of the above
    Unrecognized(String),
}

impl InstallSource {
    /// Classify `source` by shape.
    ///
    /// - `http://x`, `https://x`, any `scheme://x` → Remote
    /// - leading `.`, `/`, `~`, or a drive prefix → Local
    /// - `a/b[/c...]` with no empty, `.` or `..` segments and no
    ///   whitespace → Repository
    /// - other strings containing `/` → Unrecognized
    /// - anything else → Local (a bare directory name)
    pub fn classify(source: &str) -> Self {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Self::Unrecognized(source.to_string());
        }

        if is_url(trimmed) {
            return Self::Remote(trimmed.to_string());
        }

        if looks_like_path(trimmed) {
            return Self::Local(PathBuf::from(trimmed));
        }

        if trimmed.contains('/') {
            let valid = trimmed.split('/').all(is_valid_segment);
            return if valid {
                Self::Repository(trimmed.to_string())
            } else {
                Self::Unrecognized(source.to_string())
            };
        }

        Self::Local(PathBuf::from(trimmed))
    }

    /// Directory name the plugin is installed under.
    pub fn plugin_name(&self) -> Option<String> {
        match self {
            Self::Repository(reference) => reference
                .rsplit('/')
                .next()
                .map(|s| s.trim_end_matches(".git").to_string())
                .filter(|s| is_valid_plugin_name(s)),
            Self::Local(path) => path
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .filter(|s| is_valid_plugin_name(s)),
            Self::Remote(_) | Self::Unrecognized(_) => None,
        }
    }
}

impl fmt::Display for InstallSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(url) => write!(f, "{}", url),
            Self::Repository(reference) => write!(f, "{}", reference),
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Unrecognized(raw) => write!(f, "{}", raw),
        }
    }
}

fn is_valid_segment(segment: &str) -> bool {
    is_valid_plugin_name(segment) && !segment.chars().any(char::is_whitespace)
}

/// A name that can be joined onto the plugins directory without escaping it.
pub fn is_valid_plugin_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

fn is_url(s: &str) -> bool {
    match s.split_once("://") {
        Some((scheme, rest)) => {
            !scheme.is_empty()
                && !rest.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

fn looks_like_path(s: &str) -> bool {
    if s.starts_with('.') || s.starts_with('/') || s.starts_with('~') || s.starts_with('\\') {
        return true;
    }
    // Windows drive prefix, e.g. `C:\plugins\x` or `C:/plugins/x`
    let bytes = s.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_remote() {
        assert_eq!(
            InstallSource::classify("https://example.com/plugin.zip"),
            InstallSource::Remote("https://example.com/plugin.zip".to_string())
        );
        assert!(matches!(
            InstallSource::classify("http://example.com/p"),
            InstallSource::Remote(_)
        ));
        assert!(matches!(
            InstallSource::classify("git+ssh://host/p"),
            InstallSource::Remote(_)
        ));
    }

    #[test]
    fn test_classify_repository() {
        assert_eq!(
            InstallSource::classify("acme/figma-import"),
            InstallSource::Repository("acme/figma-import".to_string())
        );
        assert!(matches!(
            InstallSource::classify("org/group/plugin"),
            InstallSource::Repository(_)
        ));
    }

    #[test]
    fn test_classify_local() {
        for source in ["./plugins/x", "../x", "/abs/path/x", "~/x", "bare-dir", "C:\\p\\x"] {
            assert!(
                matches!(InstallSource::classify(source), InstallSource::Local(_)),
                "{source} should be local"
            );
        }
    }

    #[test]
    fn test_classify_unrecognized() {
        for source in [
            "",
            "   ",
            "owner/",
            "a//b",
            "own er/repo",
            "acme/.",
            "acme/..",
            "acme/../tool",
        ] {
            assert!(
                matches!(InstallSource::classify(source), InstallSource::Unrecognized(_)),
                "{source:?} should be unrecognized"
            );
        }
    }

    #[test]
    fn test_plugin_name() {
        assert_eq!(
            InstallSource::classify("acme/figma-import").plugin_name(),
            Some("figma-import".to_string())
        );
        assert_eq!(
            InstallSource::classify("acme/tools.git").plugin_name(),
            Some("tools".to_string())
        );
        assert_eq!(
            InstallSource::classify("./vendor/my-plugin").plugin_name(),
            Some("my-plugin".to_string())
        );
        assert_eq!(InstallSource::classify("https://x.io/p").plugin_name(), None);
    }

    #[test]
    fn test_plugin_name_never_escapes_plugins_dir() {
        for name in [".", "..", "", "a/b", "a\\b"] {
            assert!(!is_valid_plugin_name(name), "{name:?} should be rejected");
        }
        assert!(is_valid_plugin_name(".hidden-tool"));

        for source in [
            InstallSource::Repository("acme/..".to_string()),
            InstallSource::Repository("acme/..git".to_string()),
            InstallSource::Local(PathBuf::from("./vendor/..")),
            InstallSource::Local(PathBuf::from(".")),
        ] {
            assert_eq!(source.plugin_name(), None, "{source:?}");
        }
    }
}
