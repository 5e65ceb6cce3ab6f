// SPDX-License-Identifier: MIT

//! In-process fake store.
//!
//! Holds blobs in memory and records every interaction, so callers can
//! assert on how many lookups and uploads a workload caused. Also used by
//! the CLI when the server is set to `fake`.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use isolate_utils_hash::Hash;
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::{ContentStore, Namespace, StoreError, StoreResult, dedup_in_order, verify_digest};

#[derive(Default)]
struct Inner {
    contents: BTreeMap<Hash, Bytes>,
    checked: Vec<Hash>,
    error: Option<StoreError>,
}

pub struct MemoryStore {
    namespace: Namespace,
    inner: Mutex<Inner>,
    contains_calls: AtomicUsize,
    upload_calls: AtomicUsize,
    fail_contains: AtomicBool,
    fail_uploads: AtomicBool,
    uploads_paused: watch::Sender<bool>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Namespace::default())
    }
}

impl MemoryStore {
    pub fn new(namespace: Namespace) -> Self {
        Self {
            namespace,
            inner: Mutex::new(Inner::default()),
            contains_calls: AtomicUsize::new(0),
            upload_calls: AtomicUsize::new(0),
            fail_contains: AtomicBool::new(false),
            fail_uploads: AtomicBool::new(false),
            uploads_paused: watch::Sender::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pre-populates the store with `content` and returns its digest.
    pub fn inject(&self, content: impl Into<Bytes>) -> Hash {
        let content = content.into();
        let digest = self.namespace.algorithm().digest(&content);
        self.lock().contents.insert(digest, content);
        digest
    }

    /// Snapshot of everything stored so far.
    pub fn contents(&self) -> BTreeMap<Hash, Bytes> {
        self.lock().contents.clone()
    }

    /// Every digest ever passed to [`ContentStore::contains`], in call order.
    pub fn checked_digests(&self) -> Vec<Hash> {
        self.lock().checked.clone()
    }

    /// First protocol violation seen by the fake, such as an upload whose
    /// content does not match its digest.
    pub fn error(&self) -> Option<StoreError> {
        self.lock().error.clone()
    }

    pub fn contains_calls(&self) -> usize {
        self.contains_calls.load(Ordering::SeqCst)
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    /// Makes every following lookup fail with [`StoreError::Unavailable`].
    pub fn fail_contains(&self, fail: bool) {
        self.fail_contains.store(fail, Ordering::SeqCst);
    }

    /// Makes every following upload fail with [`StoreError::Unavailable`].
    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    /// Holds uploads after they are counted until [`resume_uploads`] is called.
    ///
    /// [`resume_uploads`]: Self::resume_uploads
    pub fn pause_uploads(&self) {
        self.uploads_paused.send_replace(true);
    }

    pub fn resume_uploads(&self) {
        self.uploads_paused.send_replace(false);
    }
}

impl ContentStore for MemoryStore {
    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn contains(&self, digests: &[Hash]) -> impl Future<Output = StoreResult<Vec<Hash>>> + Send {
        self.contains_calls.fetch_add(1, Ordering::SeqCst);
        let result = if self.fail_contains.load(Ordering::SeqCst) {
            Err(StoreError::unavailable("lookup rejected by fake store"))
        } else {
            let mut inner = self.lock();
            inner.checked.extend_from_slice(digests);
            let missing = dedup_in_order(
                digests
                    .iter()
                    .filter(|d| !inner.contents.contains_key(*d))
                    .copied(),
            );
            trace!(
                requested = digests.len(),
                missing = missing.len(),
                "fake store lookup"
            );
            Ok(missing)
        };
        std::future::ready(result)
    }

    fn upload(&self, digest: &Hash, content: Bytes) -> impl Future<Output = StoreResult<()>> + Send {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        let digest = *digest;
        let mut paused = self.uploads_paused.subscribe();
        async move {
            // A closed channel cannot happen while `self` is alive.
            let _ = paused.wait_for(|paused| !*paused).await;

            if self.fail_uploads.load(Ordering::SeqCst) {
                return Err(StoreError::unavailable("upload rejected by fake store"));
            }
            if let Err(e) = verify_digest(&digest, &content) {
                self.lock().error.get_or_insert_with(|| e.clone());
                return Err(e);
            }
            debug!(%digest, size = content.len(), "fake store upload");
            self.lock().contents.insert(digest, content);
            Ok(())
        }
    }
}
