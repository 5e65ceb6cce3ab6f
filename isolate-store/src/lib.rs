// SPDX-License-Identifier: MIT

//! Content-addressed store clients.
//!
//! The archiver only ever talks to a store through [`ContentStore`]: it asks
//! which digests are missing and uploads the content for those. How a store
//! reaches its backend is its own business.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use isolate_store::{ContentStore, MemoryStore};
//! use isolate_utils_hash::Algorithm;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), isolate_store::StoreError> {
//! let store = MemoryStore::default();
//! let foo = Algorithm::SHA1.digest("foo");
//!
//! assert_eq!(store.contains(&[foo]).await?, vec![foo]);
//! store.upload(&foo, Bytes::from_static(b"foo")).await?;
//! assert!(store.contains(&[foo]).await?.is_empty());
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use isolate_utils_hash::Hash;

mod error;
mod local;
mod memory;
mod namespace;

pub use error::{IoContext, StoreError, StoreResult};
pub use local::LocalStore;
pub use memory::MemoryStore;
pub use namespace::Namespace;

/// A remote (or local) store holding blobs keyed by their digest.
///
/// Implementations must be safe to call concurrently from many pipeline
/// workers; each call is independent.
pub trait ContentStore: Send + Sync + 'static {
    /// The namespace blobs are stored under. Decides the digest algorithm.
    fn namespace(&self) -> &Namespace;

    /// Returns the subset of `digests` the store does not hold.
    ///
    /// The result keeps the input order and lists each missing digest once.
    fn contains(
        &self,
        digests: &[Hash],
    ) -> impl Future<Output = StoreResult<Vec<Hash>>> + Send;

    /// Stores `content` under `digest`.
    fn upload(&self, digest: &Hash, content: Bytes)
    -> impl Future<Output = StoreResult<()>> + Send;
}

impl<S: ContentStore> ContentStore for Arc<S> {
    fn namespace(&self) -> &Namespace {
        (**self).namespace()
    }

    fn contains(
        &self,
        digests: &[Hash],
    ) -> impl Future<Output = StoreResult<Vec<Hash>>> + Send {
        (**self).contains(digests)
    }

    fn upload(
        &self,
        digest: &Hash,
        content: Bytes,
    ) -> impl Future<Output = StoreResult<()>> + Send {
        (**self).upload(digest, content)
    }
}

/// Checks that `content` really hashes to `digest`.
pub(crate) fn verify_digest(digest: &Hash, content: &[u8]) -> StoreResult<()> {
    let actual = digest.algorithm().digest(content);
    if actual != *digest {
        return Err(StoreError::DigestMismatch {
            expected: *digest,
            actual,
        });
    }
    Ok(())
}

/// Removes repeated digests, keeping the first occurrence.
pub(crate) fn dedup_in_order(digests: impl IntoIterator<Item = Hash>) -> Vec<Hash> {
    let mut seen = std::collections::HashSet::new();
    digests.into_iter().filter(|d| seen.insert(*d)).collect()
}
