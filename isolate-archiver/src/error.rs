// SPDX-License-Identifier: MIT

use std::io;
use std::sync::Arc;

use isolate_store::StoreError;
use thiserror::Error;

/// An I/O failure while reading a push source, with what was being done.
#[derive(Error, Debug, Clone)]
#[error("{context}: {source}")]
pub struct SourceError {
    context: String,
    #[source]
    source: Arc<io::Error>,
}

impl SourceError {
    pub fn new(context: impl Into<String>, source: io::Error) -> Self {
        Self {
            context: context.into(),
            source: Arc::new(source),
        }
    }

    pub fn kind(&self) -> io::ErrorKind {
        self.source.kind()
    }
}

/// Helper trait for adding context to IO errors
pub(crate) trait IoContext<T> {
    fn io_context<F>(self, f: F) -> Result<T, SourceError>
    where
        F: FnOnce() -> String;
}

impl<T> IoContext<T> for io::Result<T> {
    fn io_context<F>(self, f: F) -> Result<T, SourceError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| SourceError::new(f(), e))
    }
}

/// Failure of a single push request, or of the archiver as a whole.
///
/// The same value is stored in the request's future, sent on the error
/// channel and kept as the terminal error, so it must be `Clone`.
#[derive(Error, Debug, Clone)]
pub enum ArchiveError {
    #[error("hash({name}) failed: {source}")]
    Hash {
        name: String,
        #[source]
        source: SourceError,
    },

    #[error("read({name}) failed: {source}")]
    Read {
        name: String,
        #[source]
        source: SourceError,
    },

    #[error("contains({name}) failed: {source}")]
    Lookup {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("push({name}) failed: {source}")]
    Upload {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("canceled")]
    Canceled,
}

impl ArchiveError {
    /// Pipeline stage the error was raised in, used as a metrics label.
    pub fn stage(&self) -> &'static str {
        match self {
            ArchiveError::Hash { .. } => "hash",
            ArchiveError::Read { .. } => "read",
            ArchiveError::Lookup { .. } => "lookup",
            ArchiveError::Upload { .. } => "upload",
            ArchiveError::Canceled => "canceled",
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, ArchiveError::Canceled)
    }
}
