// SPDX-License-Identifier: MIT

use std::io;
use std::sync::Arc;

use isolate_utils_hash::Hash;
use thiserror::Error;

/// Errors raised while talking to a content store.
///
/// Cloneable so a single failure can be handed to the request's future, the
/// archiver's error channel and its terminal error at once.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("digest mismatch: expected {expected}, content hashes to {actual}")]
    DigestMismatch { expected: Hash, actual: Hash },

    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("namespace must be specified")]
    InvalidNamespace,
}

impl StoreError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source: Arc::new(source),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Helper trait for adding context to IO errors
pub trait IoContext<T> {
    fn io_context<F>(self, f: F) -> StoreResult<T>
    where
        F: FnOnce() -> String;
}

impl<T> IoContext<T> for io::Result<T> {
    fn io_context<F>(self, f: F) -> StoreResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| StoreError::io(f(), e))
    }
}
