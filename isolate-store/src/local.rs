// SPDX-License-Identifier: MIT

//! A content-addressed store backed by a local directory.
//!
//! Blobs live at `<root>/<namespace>/<hex[0..2]>/<hex>`. Writes go to a
//! temporary file under `<root>/.tmp` first and are persisted without
//! clobbering, so concurrent uploads of the same digest are harmless.

use std::future::Future;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use isolate_utils_hash::Hash;
use tracing::{debug, trace};

use crate::{
    ContentStore, IoContext, Namespace, StoreError, StoreResult, dedup_in_order, verify_digest,
};

#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    namespace: Namespace,
}

impl LocalStore {
    /// Opens (and creates if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>, namespace: Namespace) -> StoreResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join(namespace.as_str()))
            .io_context(|| format!("Failed to create store directory {}", root.display()))?;
        Ok(Self { root, namespace })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the blob for `digest`.
    pub fn path_for(&self, digest: &Hash) -> PathBuf {
        let hex = digest.to_hex();
        self.root
            .join(self.namespace.as_str())
            .join(&hex[..2])
            .join(hex)
    }

    fn temp_dir(&self) -> PathBuf {
        self.root.join(".tmp")
    }
}

fn persist(temp_dir: &Path, target: &Path, content: &[u8]) -> StoreResult<()> {
    std::fs::create_dir_all(temp_dir)
        .io_context(|| format!("Failed to create {}", temp_dir.display()))?;
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)
            .io_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut file = tempfile::NamedTempFile::new_in(temp_dir)
        .io_context(|| format!("Failed to create temp file in {}", temp_dir.display()))?;
    file.write_all(content)
        .and_then(|()| file.flush())
        .io_context(|| format!("Failed to write temp file for {}", target.display()))?;

    match file.persist_noclobber(target) {
        Ok(_) => Ok(()),
        Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
            trace!(path = %target.display(), "blob already present");
            Ok(())
        }
        Err(e) => Err(StoreError::io(
            format!("Failed to persist {}", target.display()),
            e.error,
        )),
    }
}

impl ContentStore for LocalStore {
    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn contains(&self, digests: &[Hash]) -> impl Future<Output = StoreResult<Vec<Hash>>> + Send {
        let candidates = dedup_in_order(digests.iter().copied());
        async move {
            let mut missing = Vec::new();
            for digest in candidates {
                let path = self.path_for(&digest);
                let present = tokio::fs::try_exists(&path)
                    .await
                    .io_context(|| format!("Failed to stat {}", path.display()))?;
                if !present {
                    missing.push(digest);
                }
            }
            Ok(missing)
        }
    }

    fn upload(&self, digest: &Hash, content: Bytes) -> impl Future<Output = StoreResult<()>> + Send {
        let digest = *digest;
        let target = self.path_for(&digest);
        let temp_dir = self.temp_dir();
        async move {
            verify_digest(&digest, &content)?;
            debug!(%digest, size = content.len(), path = %target.display(), "writing blob");
            tokio::task::spawn_blocking(move || persist(&temp_dir, &target, &content))
                .await
                .map_err(|e| StoreError::unavailable(format!("upload task failed: {e}")))?
        }
    }
}

#[cfg(test)]
mod tests {
    use isolate_utils_hash::Algorithm;
    use isolate_utils_test::CanonicalTempDir;

    use super::*;

    #[tokio::test]
    async fn upload_then_contains() {
        let dir = CanonicalTempDir::new().unwrap();
        let store = LocalStore::open(dir.path(), Namespace::default()).unwrap();
        let foo = Algorithm::SHA1.digest("foo");
        let empty = Algorithm::SHA1.digest("");

        assert_eq!(store.contains(&[foo, empty]).await.unwrap(), vec![foo, empty]);

        store.upload(&foo, Bytes::from_static(b"foo")).await.unwrap();
        assert_eq!(store.contains(&[foo, empty]).await.unwrap(), vec![empty]);

        let path = store.path_for(&foo);
        assert!(path.ends_with("default-gzip/0b/0beec7b5ea3f0fdbc95d0dd47f3c5bc275da8a33"));
        assert_eq!(std::fs::read(path).unwrap(), b"foo");
    }

    #[tokio::test]
    async fn second_upload_of_same_digest_succeeds() {
        let dir = CanonicalTempDir::new().unwrap();
        let store = LocalStore::open(dir.path(), Namespace::default()).unwrap();
        let foo = Algorithm::SHA1.digest("foo");

        store.upload(&foo, Bytes::from_static(b"foo")).await.unwrap();
        store.upload(&foo, Bytes::from_static(b"foo")).await.unwrap();
    }

    #[tokio::test]
    async fn upload_rejects_mismatched_content() {
        let dir = CanonicalTempDir::new().unwrap();
        let store = LocalStore::open(dir.path(), Namespace::default()).unwrap();
        let foo = Algorithm::SHA1.digest("foo");

        let err = store
            .upload(&foo, Bytes::from_static(b"bar"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DigestMismatch { .. }));
        assert!(!store.path_for(&foo).exists());
    }
}
