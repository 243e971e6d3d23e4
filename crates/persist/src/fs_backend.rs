//! File-backed key-value storage.
//!
//! Layout inside the root directory:
//! ```text
//! <hex(key)>.rec       - one file per key
//! <hex(key)>.rec.tmp   - in-flight write, renamed over the final file
//! ```

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};

use crate::{Backend, BackendError};

const RECORD_EXT: &str = ".rec";
const TMP_EXT: &str = ".tmp";

/// Stores each key as its own file, replaced atomically on write.
#[derive(Debug, Clone)]
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    /// Open or create a backend rooted at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        let root = path.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}{RECORD_EXT}", hex::encode(key)))
    }
}

#[async_trait]
impl Backend for FsBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), BackendError> {
        let path = self.path_for(key);
        let tmp_path = path.with_extension(format!("rec{TMP_EXT}"));
        tokio::fs::write(&tmp_path, &value).await?;
        if let Err(err) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>, BackendError> {
        let mut keys = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            let file_name = entry.file_name();
            let Some(stem) = file_name
                .to_str()
                .and_then(|name| name.strip_suffix(RECORD_EXT))
            else {
                continue;
            };
            let Some(key) = hex::decode(stem)
                .ok()
                .and_then(|raw| String::from_utf8(raw).ok())
            else {
                tracing::debug!(file = stem, "skipping foreign file in store directory");
                continue;
            };
            if prefix.is_none_or(|p| key.starts_with(p)) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fs_backend_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = FsBackend::open(tmp.path().join("store")).await.unwrap();
        assert!(backend.root().is_dir());

        backend.put("world:alpha", b"payload".to_vec()).await.unwrap();
        assert_eq!(
            backend.get("world:alpha").await.unwrap().unwrap(),
            b"payload"
        );
        assert!(backend.get("world:beta").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fs_backend_overwrites_atomically() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = FsBackend::open(tmp.path()).await.unwrap();
        backend.put("k", b"first".to_vec()).await.unwrap();
        backend.put("k", b"second".to_vec()).await.unwrap();
        assert_eq!(backend.get("k").await.unwrap().unwrap(), b"second");

        let leftovers: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(TMP_EXT))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn fs_backend_lists_and_deletes() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = FsBackend::open(tmp.path()).await.unwrap();
        backend.put("world:b", Vec::new()).await.unwrap();
        backend.put("world:a", Vec::new()).await.unwrap();
        backend.put("meta:store", Vec::new()).await.unwrap();
        std::fs::write(tmp.path().join("README.txt"), "not a record").unwrap();

        assert_eq!(
            backend.list_keys(Some("world:")).await.unwrap(),
            ["world:a", "world:b"]
        );

        backend.delete("world:a").await.unwrap();
        backend.delete("world:a").await.unwrap();
        assert_eq!(backend.list_keys(None).await.unwrap(), ["meta:store", "world:b"]);
    }
}
