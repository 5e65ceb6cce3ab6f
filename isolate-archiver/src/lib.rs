// SPDX-License-Identifier: MIT

//! Concurrent content-addressed archiving.
//!
//! An [`Archiver`] takes files and seekable streams, hashes them on a
//! bounded worker pool, asks a [`ContentStore`](isolate_store::ContentStore)
//! which digests it lacks and uploads only those. Each push is answered
//! with a [`PushFuture`] that reports the digest as soon as it is known
//! and the store outcome once the request is done.
//!
//! ```
//! use std::io::Cursor;
//! use std::sync::Arc;
//!
//! use isolate_archiver::{Archiver, Outcome};
//! use isolate_store::MemoryStore;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), isolate_archiver::ArchiveError> {
//! let store = Arc::new(MemoryStore::default());
//! let archiver = Archiver::new(store.clone(), None);
//!
//! let future = archiver.push("foo", Cursor::new(b"foo".to_vec())).unwrap();
//! future.wait_for_hashed().await;
//! assert_eq!(
//!     future.digest().unwrap().to_string(),
//!     "0beec7b5ea3f0fdbc95d0dd47f3c5bc275da8a33"
//! );
//!
//! archiver.close().await?;
//! assert_eq!(future.outcome(), Some(Outcome::Miss));
//! assert_eq!(archiver.stats().misses, 1);
//! # Ok(())
//! # }
//! ```

mod archiver;
mod config;
mod control;
mod error;
mod future;
mod metrics;
mod pipeline;
mod progress;
mod source;
mod stats;

pub use archiver::{Archiver, Canceler, ErrorReceiver};
pub use config::{ArchiverConfig, InvalidConfig};
pub use control::Lifecycle;
pub use error::{ArchiveError, SourceError};
pub use future::{FutureState, Outcome, PushFuture};
pub use metrics::ArchiverMetrics;
pub use source::{DedupKey, PushSource, SeekableStream};
pub use stats::{Size, Stats};
