//! Caller-owned cache of loaded settings
//!
//! A cached store stays valid while every file it was built from (the root
//! and all imports, missing ones included) keeps its modification time.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;

use super::model::SettingsLocation;
use super::store::SettingsStore;
use crate::paths;
use crate::types::Result;

/// Modification times of the files a store was built from
type Fingerprint = Vec<(PathBuf, Option<SystemTime>)>;

struct CachedSettings {
    store: Arc<SettingsStore>,
    fingerprint: Fingerprint,
}

/// Settings stores keyed by root settings file
#[derive(Default)]
#[allow(missing_debug_implementations)]
pub struct SettingsCache {
    entries: DashMap<PathBuf, CachedSettings>,
}

impl SettingsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached store for `location`, reloaded when any of its files changed
    ///
    /// Unresolved locations are never cached.
    pub fn get_or_load(&self, location: &SettingsLocation) -> Result<Arc<SettingsStore>> {
        let SettingsLocation::File(path) = location else {
            return Ok(Arc::new(SettingsStore::load(location)?));
        };
        let root = paths::absolute(path);

        if let Some(cached) = self.entries.get(&root) {
            if cached.fingerprint == fingerprint(cached.fingerprint.iter().map(|(p, _)| p.as_path())) {
                tracing::debug!("Settings cache hit: {}", root.display());
                return Ok(Arc::clone(&cached.store));
            }
        }

        let store = Arc::new(SettingsStore::load(location)?);
        let watched = store.watched_files();
        self.entries.insert(
            root.clone(),
            CachedSettings {
                store: Arc::clone(&store),
                fingerprint: fingerprint(watched.iter().map(PathBuf::as_path)),
            },
        );
        tracing::debug!("Settings cached: {}", root.display());
        Ok(store)
    }

    /// Drop the entry for one root settings file
    pub fn invalidate(&self, root: impl AsRef<Path>) -> bool {
        self.entries
            .remove(&paths::absolute(root.as_ref()))
            .is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn fingerprint<'a>(files: impl Iterator<Item = &'a Path>) -> Fingerprint {
    files
        .map(|file| {
            let modified = std::fs::metadata(file).and_then(|m| m.modified()).ok();
            (file.to_path_buf(), modified)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn touch_later(path: &Path, content: &str) {
        let before = fs::metadata(path).and_then(|m| m.modified()).ok();
        for _ in 0..50 {
            fs::write(path, content).unwrap();
            if fs::metadata(path).and_then(|m| m.modified()).ok() != before {
                return;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn test_cache_hit_returns_same_store() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("settings.xml");
        fs::write(&root, r#"<settings><var name="A" value="1" /></settings>"#).unwrap();
        let location = SettingsLocation::File(root);

        let cache = SettingsCache::new();
        let first = cache.get_or_load(&location).unwrap();
        let second = cache.get_or_load(&location).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_changed_import_reloads() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("base.xml");
        fs::write(&base, r#"<settings><var name="A" value="1" /></settings>"#).unwrap();
        let root = temp_dir.path().join("settings.xml");
        fs::write(&root, r#"<settings><import from="base.xml" /></settings>"#).unwrap();
        let location = SettingsLocation::File(root);

        let cache = SettingsCache::new();
        assert_eq!(cache.get_or_load(&location).unwrap().variable_value("A"), Some("1"));

        touch_later(&base, r#"<settings><var name="A" value="2" /></settings>"#);
        assert_eq!(cache.get_or_load(&location).unwrap().variable_value("A"), Some("2"));
    }

    #[test]
    fn test_created_root_reloads() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("settings.xml");
        let location = SettingsLocation::File(root.clone());

        let cache = SettingsCache::new();
        assert!(!cache.get_or_load(&location).unwrap().has_variable("A"));

        fs::write(&root, r#"<settings><var name="A" value="1" /></settings>"#).unwrap();
        assert!(cache.get_or_load(&location).unwrap().has_variable("A"));
    }

    #[test]
    fn test_invalidate_and_clear() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("settings.xml");
        let cache = SettingsCache::new();

        cache.get_or_load(&SettingsLocation::Unresolved).unwrap();
        assert!(cache.is_empty());

        cache.get_or_load(&SettingsLocation::File(root.clone())).unwrap();
        assert!(cache.invalidate(&root));
        assert!(!cache.invalidate(&root));

        cache.get_or_load(&SettingsLocation::File(root)).unwrap();
        cache.clear();
        assert!(cache.is_empty());
    }
}
