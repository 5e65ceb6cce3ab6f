// SPDX-License-Identifier: MIT

//! Where a push request's bytes come from.

use std::fmt;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use isolate_utils_hash::{Algorithm, Hash, HashSink, HashingReader};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

use crate::error::{IoContext, SourceError};

/// A readable, rewindable byte stream that can be handed to the archiver.
pub trait SeekableStream: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin> SeekableStream for T {}

/// The content of a push request.
pub enum PushSource {
    Path(PathBuf),
    Stream(Box<dyn SeekableStream>),
}

impl fmt::Debug for PushSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            PushSource::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl PushSource {
    /// Computes the digest and length of the full content.
    ///
    /// Streams are rewound first, so a caller-side read cursor does not
    /// change the result.
    pub(crate) async fn digest(&mut self, algorithm: Algorithm) -> Result<(u64, Hash), SourceError> {
        let mut sink = HashSink::new(algorithm);
        match self {
            PushSource::Path(path) => {
                let mut file = open(path).await?;
                tokio::io::copy(&mut file, &mut sink)
                    .await
                    .io_context(|| format!("read {}", path.display()))?;
            }
            PushSource::Stream(stream) => {
                rewind(stream).await?;
                tokio::io::copy(stream, &mut sink)
                    .await
                    .io_context(|| "read stream".to_owned())?;
            }
        }
        Ok(sink.finish())
    }

    /// Reads the full content again for upload and checks it still hashes
    /// to `expected`.
    pub(crate) async fn read_verified(&mut self, expected: &Hash, size: u64) -> Result<Bytes, SourceError> {
        let mut buf = Vec::with_capacity(usize::try_from(size).unwrap_or(0));
        let (_, actual) = match self {
            PushSource::Path(path) => {
                let file = open(path).await?;
                let mut reader = HashingReader::new(file, expected.algorithm());
                reader
                    .read_to_end(&mut buf)
                    .await
                    .io_context(|| format!("read {}", path.display()))?;
                reader.finish()
            }
            PushSource::Stream(stream) => {
                rewind(stream).await?;
                let mut reader = HashingReader::new(&mut **stream, expected.algorithm());
                reader
                    .read_to_end(&mut buf)
                    .await
                    .io_context(|| "read stream".to_owned())?;
                reader.finish()
            }
        };
        if actual != *expected {
            return Err(SourceError::new(
                format!("content changed since hashing (now {actual})"),
                std::io::Error::from(std::io::ErrorKind::InvalidData),
            ));
        }
        Ok(Bytes::from(buf))
    }
}

async fn open(path: &Path) -> Result<tokio::fs::File, SourceError> {
    tokio::fs::File::open(path)
        .await
        .io_context(|| format!("open {}", path.display()))
}

async fn rewind(stream: &mut Box<dyn SeekableStream>) -> Result<(), SourceError> {
    stream
        .seek(SeekFrom::Start(0))
        .await
        .io_context(|| "seek stream to start".to_owned())?;
    Ok(())
}

/// Identity of a file-backed push, used to coalesce duplicate pushes.
///
/// The canonical path when it can be resolved; otherwise the absolute
/// path, so that a push of a missing file still deduplicates and fails
/// once.
///
/// Resolution is a synchronous `canonicalize`: it touches path metadata
/// only, which keeps `push_file` synchronous and the key available before
/// the request is queued.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey(PathBuf);

impl DedupKey {
    pub fn for_path(path: &Path) -> Self {
        let key = std::fs::canonicalize(path)
            .or_else(|_| std::path::absolute(path))
            .unwrap_or_else(|_| path.to_path_buf());
        DedupKey(key)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}
