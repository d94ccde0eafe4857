//! Content-hash cache manifest.
//!
//! Tracks which source documents have already produced which outputs. A
//! source is "cached" only while the SHA-256 of its bytes still matches the
//! hash recorded at the last [`CacheManifest::update_cache`] call; there are
//! no modification-time heuristics.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{IoContext, StoreError, StoreResult};
use crate::storage::lock::StoreLock;
use crate::utils::fs::{copy_dir_recursive, dir_is_empty, write_atomic};
use crate::utils::paths::{get_backup_root, get_manifest_path};

/// Timestamp format for backup directories; sorts lexicographically by age.
const BACKUP_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// What the manifest remembers about one tracked source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    /// Hex SHA-256 of the source bytes at the last update (empty if missing)
    pub hash: String,
    /// Paths produced from this source
    #[serde(default)]
    pub output_files: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// On-disk form of `manifest.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestData {
    #[serde(default)]
    pub files: BTreeMap<String, CacheEntry>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct CacheManifest {
    cache_dir: PathBuf,
    manifest_path: PathBuf,
    data: ManifestData,
}

impl CacheManifest {
    /// Open the manifest under `cache_dir`, creating the directory if needed.
    pub fn open(cache_dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir)
            .io_context(|| format!("Failed to create cache directory {:?}", cache_dir))?;

        let manifest_path = get_manifest_path(&cache_dir);
        let data = read_manifest(&manifest_path)?;

        Ok(Self {
            cache_dir,
            manifest_path,
            data,
        })
    }

    pub fn path(&self) -> &Path {
        &self.manifest_path
    }

    pub fn entry(&self, source: &Path) -> Option<&CacheEntry> {
        self.data.files.get(&cache_key(source))
    }

    pub fn entries(&self) -> &BTreeMap<String, CacheEntry> {
        &self.data.files
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.data.last_updated
    }

    /// True iff an entry exists for `source` and its stored hash equals the
    /// hash of the file's current bytes. Missing files are never cached.
    pub fn is_cached(&self, source: &Path) -> StoreResult<bool> {
        let Some(entry) = self.entry(source) else {
            return Ok(false);
        };
        let current = hash_of(source)?;
        Ok(!current.is_empty() && entry.hash == current)
    }

    /// Record the current hash of `source` together with its outputs.
    pub fn update_cache(&mut self, source: &Path, output_files: Vec<String>) -> StoreResult<()> {
        let _lock = StoreLock::acquire(&self.manifest_path)
            .io_context(|| format!("Failed to lock {:?}", self.manifest_path))?;

        // Re-read under the lock so concurrent writers are not clobbered.
        let mut data = read_manifest(&self.manifest_path)?;
        let now = Utc::now();
        data.files.insert(
            cache_key(source),
            CacheEntry {
                hash: hash_of(source)?,
                output_files,
                timestamp: now,
            },
        );
        data.last_updated = Some(now);

        let json = serde_json::to_vec_pretty(&data).map_err(|e| StoreError::Serialize {
            what: "cache manifest",
            message: e.to_string(),
        })?;
        write_atomic(&self.manifest_path, &json)
            .io_context(|| format!("Failed to write {:?}", self.manifest_path))?;

        tracing::debug!("Updated cache entry for {:?}", source);
        self.data = data;
        Ok(())
    }

    /// Snapshot `output_dir` into `<cache>/backup/<timestamp>`.
    ///
    /// Returns `None` without touching the filesystem when the directory is
    /// missing or empty.
    pub fn backup(&self, output_dir: &Path) -> StoreResult<Option<PathBuf>> {
        let empty = dir_is_empty(output_dir)
            .io_context(|| format!("Failed to read output directory {:?}", output_dir))?;
        if empty {
            return Ok(None);
        }

        let backup_root = get_backup_root(&self.cache_dir);
        fs::create_dir_all(&backup_root)
            .io_context(|| format!("Failed to create backup root {:?}", backup_root))?;

        let stamp = Local::now().format(BACKUP_STAMP_FORMAT).to_string();
        let backup_dir = next_backup_dir(&backup_root, &stamp);
        copy_dir_recursive(output_dir, &backup_dir)
            .io_context(|| format!("Failed to back up {:?} to {:?}", output_dir, backup_dir))?;

        tracing::info!("Backup created: {:?}", backup_dir);
        Ok(Some(backup_dir))
    }
}

/// Hex SHA-256 of the file's bytes, or the empty string if it does not exist.
pub fn hash_of(path: &Path) -> StoreResult<String> {
    let mut file = match fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(String::new()),
        Err(e) => Err::<fs::File, io::Error>(e)
            .io_context(|| format!("Failed to open {:?}", path))?,
    };
    if file
        .metadata()
        .io_context(|| format!("Failed to stat {:?}", path))?
        .is_dir()
    {
        return Ok(String::new());
    }

    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).io_context(|| format!("Failed to hash {:?}", path))?;
    Ok(hex::encode(hasher.finalize()))
}

fn cache_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn read_manifest(path: &Path) -> StoreResult<ManifestData> {
    if !path.exists() {
        return Ok(ManifestData::default());
    }
    let content =
        fs::read_to_string(path).io_context(|| format!("Failed to read {:?}", path))?;
    if content.trim().is_empty() {
        return Ok(ManifestData::default());
    }
    serde_json::from_str(&content).map_err(|source| StoreError::CorruptManifest {
        path: path.to_path_buf(),
        source,
    })
}

/// Pick a fresh directory name; same-second collisions get a zero-padded
/// suffix so names keep sorting in creation order.
fn next_backup_dir(root: &Path, stamp: &str) -> PathBuf {
    let candidate = root.join(stamp);
    if !candidate.exists() {
        return candidate;
    }
    (1..)
        .map(|n| root.join(format!("{stamp}_{n:03}")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn setup() -> (TempDir, CacheManifest) {
        let temp = TempDir::new().unwrap();
        let manifest = CacheManifest::open(temp.path().join("cache")).unwrap();
        (temp, manifest)
    }

    #[test]
    fn test_hash_of_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        assert_eq!(hash_of(&temp.path().join("nope.md")).unwrap(), "");
    }

    #[test]
    fn test_hash_is_stable_and_fixed_length() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.md");
        let b = temp.path().join("b.md");
        fs::write(&a, "same bytes").unwrap();
        fs::write(&b, "same bytes").unwrap();

        let hash_a = hash_of(&a).unwrap();
        assert_eq!(hash_a.len(), 64);
        assert_eq!(hash_a, hash_of(&b).unwrap());

        fs::write(&b, "other bytes").unwrap();
        assert_ne!(hash_a, hash_of(&b).unwrap());
    }

    #[test]
    fn test_cache_round_trip() {
        let (temp, mut manifest) = setup();
        let source = temp.path().join("PRD.md");
        fs::write(&source, "content C").unwrap();

        assert!(!manifest.is_cached(&source).unwrap());

        manifest
            .update_cache(&source, vec!["android/App.kt".to_string()])
            .unwrap();
        assert!(manifest.is_cached(&source).unwrap());

        fs::write(&source, "content D").unwrap();
        assert!(!manifest.is_cached(&source).unwrap());
        manifest.update_cache(&source, Vec::new()).unwrap();
        assert!(manifest.is_cached(&source).unwrap());

        // The stored hash is now D's; going back to C is a miss until the
        // next update.
        fs::write(&source, "content C").unwrap();
        assert!(!manifest.is_cached(&source).unwrap());
        manifest.update_cache(&source, Vec::new()).unwrap();
        assert!(manifest.is_cached(&source).unwrap());
    }

    #[test]
    fn test_staleness_is_purely_hash_based() {
        let (temp, mut manifest) = setup();
        let source = temp.path().join("PRD.md");
        fs::write(&source, "content C").unwrap();
        manifest.update_cache(&source, Vec::new()).unwrap();

        fs::write(&source, "edited").unwrap();
        assert!(!manifest.is_cached(&source).unwrap());

        // Same bytes as the recorded hash, regardless of mtime.
        fs::write(&source, "content C").unwrap();
        assert!(manifest.is_cached(&source).unwrap());
    }

    #[test]
    fn test_missing_file_is_never_cached() {
        let (temp, mut manifest) = setup();
        let source = temp.path().join("gone.md");

        manifest.update_cache(&source, Vec::new()).unwrap();
        assert_eq!(manifest.entry(&source).unwrap().hash, "");
        assert!(!manifest.is_cached(&source).unwrap());
    }

    #[test]
    fn test_update_cache_persists_and_reloads() {
        let (temp, mut manifest) = setup();
        let source = temp.path().join("PRD.md");
        fs::write(&source, "abc").unwrap();
        manifest
            .update_cache(&source, vec!["ios/App.swift".to_string(), "h5/index.html".to_string()])
            .unwrap();

        let reopened = CacheManifest::open(temp.path().join("cache")).unwrap();
        let entry = reopened.entry(&source).unwrap();
        assert_eq!(entry.output_files, vec!["ios/App.swift", "h5/index.html"]);
        assert!(reopened.last_updated().is_some());
        assert!(reopened.is_cached(&source).unwrap());

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(reopened.path()).unwrap()).unwrap();
        assert!(raw["files"].is_object());
        assert!(raw["last_updated"].is_string());
    }

    #[test]
    fn test_corrupt_manifest_is_reported() {
        let temp = TempDir::new().unwrap();
        let cache_dir = temp.path().join("cache");
        fs::create_dir_all(&cache_dir).unwrap();
        fs::write(cache_dir.join("manifest.json"), "{ not json").unwrap();

        let err = CacheManifest::open(&cache_dir).unwrap_err();
        assert!(matches!(err, StoreError::CorruptManifest { .. }));
        assert!(err.is_corrupt());
    }

    #[test]
    fn test_backup_absent_or_empty_is_noop() {
        let (temp, manifest) = setup();
        let output = temp.path().join("output");

        assert_eq!(manifest.backup(&output).unwrap(), None);
        fs::create_dir_all(&output).unwrap();
        assert_eq!(manifest.backup(&output).unwrap(), None);
        assert!(!temp.path().join("cache").join("backup").exists());
    }

    #[test]
    fn test_backup_copies_tree_once() {
        let (temp, manifest) = setup();
        let output = temp.path().join("output");
        fs::create_dir_all(output.join("android")).unwrap();
        fs::write(output.join("android").join("Main.kt"), "fun main() {}").unwrap();
        fs::write(output.join("README.md"), "readme").unwrap();

        let backup = manifest.backup(&output).unwrap().unwrap();

        let backups: Vec<_> = fs::read_dir(temp.path().join("cache").join("backup"))
            .unwrap()
            .collect();
        assert_eq!(backups.len(), 1);
        assert_eq!(
            fs::read_to_string(backup.join("android").join("Main.kt")).unwrap(),
            "fun main() {}"
        );
        assert_eq!(fs::read_to_string(backup.join("README.md")).unwrap(), "readme");
    }

    #[test]
    fn test_same_second_backups_get_distinct_sortable_names() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("20261019_101500")).unwrap();

        let next = next_backup_dir(root, "20261019_101500");
        assert_eq!(next, root.join("20261019_101500_001"));
        assert!(next.file_name() > Some(std::ffi::OsStr::new("20261019_101500")));
    }

    #[test]
    fn test_many_same_second_backups_sort_in_creation_order() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        let mut created = Vec::new();
        for _ in 0..12 {
            let dir = next_backup_dir(root, "20261019_101500");
            fs::create_dir_all(&dir).unwrap();
            created.push(dir.file_name().unwrap().to_string_lossy().into_owned());
        }

        let mut sorted = created.clone();
        sorted.sort();
        assert_eq!(sorted, created);
        assert_eq!(created[10], "20261019_101500_010");
    }
}
