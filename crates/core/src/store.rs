//! Archive store
//!
//! [`ArchiveStore`] is the key/value archive service caches are restored from
//! and saved to. Matching semantics belong to the store. The bundled
//! [`LocalArchiveStore`] keeps gzipped tarballs in a directory (useful on
//! self-hosted runners with a persistent or shared disk) and matches like
//! hosted CI caches: keys are tried in order, an exact key wins, otherwise
//! the newest archive whose key starts with the candidate.

use crate::errors::StoreError;
use async_trait::async_trait;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Key-addressed archive storage
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Restore `paths` from the first archive matching `primary_key` or one of
    /// `restore_keys`; returns the matched key
    async fn restore(
        &self,
        paths: &[PathBuf],
        primary_key: &str,
        restore_keys: &[String],
    ) -> Result<Option<String>, StoreError>;

    /// Archive `paths` under `key`
    async fn save(&self, paths: &[PathBuf], key: &str) -> Result<(), StoreError>;
}

/// One stored archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct IndexEntry {
    key: String,
    file: String,
    created_at_ms: i64,
    size_bytes: u64,
}

/// Directory-backed archive store
#[derive(Debug, Clone)]
pub struct LocalArchiveStore {
    root: PathBuf,
}

impl LocalArchiveStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// `CCACHE_CI_STORE_DIR`, else `$RUNNER_TOOL_CACHE/ccache-ci-store`, else the OS temp dir
    pub fn default_root() -> PathBuf {
        let non_empty = |name: &str| std::env::var_os(name).filter(|v| !v.is_empty());
        if let Some(dir) = non_empty("CCACHE_CI_STORE_DIR") {
            return PathBuf::from(dir);
        }
        non_empty("RUNNER_TOOL_CACHE")
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir)
            .join("ccache-ci-store")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("index.json")
    }

    fn load_index(&self) -> Result<Vec<IndexEntry>, StoreError> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|e| StoreError::Index {
            message: format!("{}: {}", path.display(), e),
        })
    }

    fn write_index(&self, entries: &[IndexEntry]) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(entries).map_err(|e| StoreError::Index {
            message: e.to_string(),
        })?;
        let tmp = self.root.join("index.json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, self.index_path())?;
        Ok(())
    }

    /// List stored keys, oldest first
    pub fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.load_index()?.into_iter().map(|e| e.key).collect())
    }
}

/// Pick the archive for a lookup: per candidate, exact match first, then the
/// newest prefix match (later index position breaks ties)
fn find_match<'a>(entries: &'a [IndexEntry], candidates: &[&str]) -> Option<&'a IndexEntry> {
    for candidate in candidates {
        if let Some(exact) = entries.iter().find(|e| e.key == *candidate) {
            return Some(exact);
        }

        let newest = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.key.starts_with(candidate))
            .max_by_key(|(pos, e)| (e.created_at_ms, *pos))
            .map(|(_, e)| e);
        if newest.is_some() {
            return newest;
        }
    }
    None
}

/// File name for an archive key; keys may hold characters invalid in paths
fn archive_file_name(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}.tar.gz", hasher.finalize())
}

/// Pack each path under a top-level directory named by its position
fn write_archive(archive: &Path, paths: &[PathBuf]) -> Result<(), StoreError> {
    let file = File::create(archive)?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);
    for (i, path) in paths.iter().enumerate() {
        builder.append_dir_all(i.to_string(), path)?;
    }
    builder.into_inner()?.finish()?;
    Ok(())
}

fn extract_archive(archive: &Path, paths: &[PathBuf]) -> Result<(), StoreError> {
    let mut tar = tar::Archive::new(GzDecoder::new(File::open(archive)?));
    for entry in tar.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();
        let mut components = entry_path.components();

        let dest_root = match components.next() {
            Some(Component::Normal(first)) => first
                .to_str()
                .and_then(|s| s.parse::<usize>().ok())
                .and_then(|i| paths.get(i)),
            _ => None,
        };
        let Some(dest_root) = dest_root else {
            warn!(entry = %entry_path.display(), "Skipping archive entry outside restored paths");
            continue;
        };

        let rest: PathBuf = components.collect();
        if rest
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            warn!(entry = %entry_path.display(), "Skipping archive entry with unsafe path");
            continue;
        }

        let dest = dest_root.join(&rest);
        if rest.as_os_str().is_empty() {
            fs::create_dir_all(&dest)?;
            continue;
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        entry.unpack(&dest)?;
    }
    Ok(())
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[async_trait]
impl ArchiveStore for LocalArchiveStore {
    #[instrument(skip(self, paths), fields(root = %self.root.display()))]
    async fn restore(
        &self,
        paths: &[PathBuf],
        primary_key: &str,
        restore_keys: &[String],
    ) -> Result<Option<String>, StoreError> {
        let entries = self.load_index()?;
        let candidates: Vec<&str> = std::iter::once(primary_key)
            .chain(restore_keys.iter().map(String::as_str))
            .collect();

        let Some(entry) = find_match(&entries, &candidates).cloned() else {
            debug!("No archive matched {:?}", candidates);
            return Ok(None);
        };

        let archive = self.root.join(&entry.file);
        let paths = paths.to_vec();
        tokio::task::spawn_blocking(move || extract_archive(&archive, &paths))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        info!(key = %entry.key, size_bytes = entry.size_bytes, "Archive restored");
        Ok(Some(entry.key))
    }

    #[instrument(skip(self, paths), fields(root = %self.root.display()))]
    async fn save(&self, paths: &[PathBuf], key: &str) -> Result<(), StoreError> {
        if let Some(missing) = paths.iter().find(|p| !p.exists()) {
            return Err(StoreError::PathNotFound {
                path: missing.display().to_string(),
            });
        }

        fs::create_dir_all(&self.root)?;
        let mut entries = self.load_index()?;
        if entries.iter().any(|e| e.key == key) {
            return Err(StoreError::KeyExists {
                key: key.to_string(),
            });
        }

        let file_name = archive_file_name(key);
        let archive = self.root.join(&file_name);
        let partial = self.root.join(format!("{}.partial", file_name));
        {
            let partial = partial.clone();
            let paths = paths.to_vec();
            tokio::task::spawn_blocking(move || write_archive(&partial, &paths))
                .await
                .map_err(|e| {
                    StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
                })??;
        }
        fs::rename(&partial, &archive)?;

        let size_bytes = fs::metadata(&archive)?.len();
        entries.push(IndexEntry {
            key: key.to_string(),
            file: file_name,
            created_at_ms: now_ms(),
            size_bytes,
        });
        self.write_index(&entries)?;

        info!(key, size_bytes, "Archive saved");
        Ok(())
    }
}

pub mod mock {
    //! Recording archive store for tests

    use super::ArchiveStore;
    use crate::errors::StoreError;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// A recorded restore request
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RestoreCall {
        pub paths: Vec<PathBuf>,
        pub primary_key: String,
        pub restore_keys: Vec<String>,
    }

    /// A recorded save request
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SaveCall {
        pub paths: Vec<PathBuf>,
        pub key: String,
    }

    #[derive(Debug, Default)]
    pub struct MockStore {
        restore_result: Mutex<Option<String>>,
        fail_with: Mutex<Option<String>>,
        restores: Mutex<Vec<RestoreCall>>,
        saves: Mutex<Vec<SaveCall>>,
    }

    impl MockStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Key reported as matched by every restore
        pub fn with_match(self, key: &str) -> Self {
            *self.restore_result.lock().unwrap() = Some(key.to_string());
            self
        }

        /// Make every call fail with an I/O error
        pub fn failing(self, message: &str) -> Self {
            *self.fail_with.lock().unwrap() = Some(message.to_string());
            self
        }

        pub fn restores(&self) -> Vec<RestoreCall> {
            self.restores.lock().unwrap().clone()
        }

        pub fn saves(&self) -> Vec<SaveCall> {
            self.saves.lock().unwrap().clone()
        }

        fn failure(&self) -> Option<StoreError> {
            self.fail_with
                .lock()
                .unwrap()
                .as_ref()
                .map(|m| StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, m.clone())))
        }
    }

    #[async_trait]
    impl ArchiveStore for MockStore {
        async fn restore(
            &self,
            paths: &[PathBuf],
            primary_key: &str,
            restore_keys: &[String],
        ) -> Result<Option<String>, StoreError> {
            self.restores.lock().unwrap().push(RestoreCall {
                paths: paths.to_vec(),
                primary_key: primary_key.to_string(),
                restore_keys: restore_keys.to_vec(),
            });
            if let Some(err) = self.failure() {
                return Err(err);
            }
            Ok(self.restore_result.lock().unwrap().clone())
        }

        async fn save(&self, paths: &[PathBuf], key: &str) -> Result<(), StoreError> {
            self.saves.lock().unwrap().push(SaveCall {
                paths: paths.to_vec(),
                key: key.to_string(),
            });
            match self.failure() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(key: &str, created_at_ms: i64) -> IndexEntry {
        IndexEntry {
            key: key.to_string(),
            file: archive_file_name(key),
            created_at_ms,
            size_bytes: 0,
        }
    }

    #[test]
    fn test_exact_match_wins_over_prefix() {
        let entries = vec![entry("ccache-k", 1), entry("ccache-k-2024", 5)];
        let found = find_match(&entries, &["ccache-k", "ccache-"]).unwrap();
        assert_eq!(found.key, "ccache-k");
    }

    #[test]
    fn test_newest_prefix_match() {
        let entries = vec![
            entry("ccache-k-2024-01", 10),
            entry("ccache-k-2024-03", 30),
            entry("ccache-k-2024-02", 20),
        ];
        let found = find_match(&entries, &["ccache-k-"]).unwrap();
        assert_eq!(found.key, "ccache-k-2024-03");
    }

    #[test]
    fn test_restore_keys_in_order() {
        let entries = vec![entry("ccache-linux-gcc-1", 1), entry("ccache-linux-clang-1", 9)];
        let found =
            find_match(&entries, &["ccache-linux-gcc-abc-", "ccache-linux-gcc-", "ccache-linux-"])
                .unwrap();
        assert_eq!(found.key, "ccache-linux-gcc-1");
        assert!(find_match(&entries, &["sccache-"]).is_none());
    }

    #[test]
    fn test_archive_file_name_is_path_safe() {
        let name = archive_file_name("ccache-k-2024-12-15T10:35:17.000Z");
        assert!(name.ends_with(".tar.gz"));
        assert!(!name.contains(':'));
        assert_eq!(name.len(), 64 + ".tar.gz".len());
    }

    #[tokio::test]
    async fn test_save_then_restore_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = LocalArchiveStore::new(tmp.path().join("store"));
        let cache_dir = tmp.path().join(".ccache");
        fs::create_dir_all(cache_dir.join("a/b")).unwrap();
        fs::write(cache_dir.join("a/b/obj.o"), b"object").unwrap();
        fs::write(cache_dir.join("ccache.conf"), b"max_size = 500M\n").unwrap();

        store
            .save(&[cache_dir.clone()], "ccache-k-2024-12-15T10:35:17.000Z")
            .await
            .unwrap();

        let restored_dir = tmp.path().join("restored");
        let matched = store
            .restore(&[restored_dir.clone()], "ccache-k-", &[])
            .await
            .unwrap();

        assert_eq!(matched.as_deref(), Some("ccache-k-2024-12-15T10:35:17.000Z"));
        assert_eq!(fs::read(restored_dir.join("a/b/obj.o")).unwrap(), b"object");
        assert!(restored_dir.join("ccache.conf").exists());
    }

    #[tokio::test]
    async fn test_save_rejects_existing_key() {
        let tmp = TempDir::new().unwrap();
        let store = LocalArchiveStore::new(tmp.path().join("store"));
        let cache_dir = tmp.path().join(".ccache");
        fs::create_dir_all(&cache_dir).unwrap();

        store.save(&[cache_dir.clone()], "ccache-k").await.unwrap();
        let err = store.save(&[cache_dir], "ccache-k").await.unwrap_err();
        assert!(matches!(err, StoreError::KeyExists { .. }));
        assert_eq!(store.keys().unwrap(), vec!["ccache-k"]);
    }

    #[tokio::test]
    async fn test_save_missing_path() {
        let tmp = TempDir::new().unwrap();
        let store = LocalArchiveStore::new(tmp.path().join("store"));
        let err = store
            .save(&[tmp.path().join("nope")], "ccache-k")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PathNotFound { .. }));
    }

    #[tokio::test]
    async fn test_restore_from_empty_store() {
        let tmp = TempDir::new().unwrap();
        let store = LocalArchiveStore::new(tmp.path().join("never-created"));
        let matched = store
            .restore(&[tmp.path().join(".ccache")], "ccache-", &[])
            .await
            .unwrap();
        assert_eq!(matched, None);
    }
}
