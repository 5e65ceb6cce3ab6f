// SPDX-License-Identifier: MIT

//! Digests for content-addressed archiving.
//!
//! A [`Hash`] is the fixed-size output of one of the supported
//! [`Algorithm`]s. Its canonical text form is lowercase hex, which is also
//! the key under which content stores file blobs.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::str::FromStr;
use std::task::Poll;

use data_encoding::{HEXLOWER, HEXLOWER_PERMISSIVE};
use ring::digest;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tokio::io::AsyncWrite;

mod algo;
pub mod hashing_reader;

pub use algo::{Algorithm, UnknownAlgorithm};
pub use hashing_reader::HashingReader;

const MAX_DIGEST_LEN: usize = Algorithm::SHA512.size();

#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
#[error("{algorithm} digest must be {} bytes, got {length}", algorithm.size())]
pub struct InvalidHashError {
    algorithm: Algorithm,
    length: usize,
}

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum ParseHashError {
    #[error("invalid hex digest '{0}'")]
    BadHex(String),
    #[error("hex digest '{digest}' has length {length} which matches no known algorithm")]
    UnknownLength { digest: String, length: usize },
    #[error(transparent)]
    WrongLength(#[from] InvalidHashError),
}

/// Digest of some content together with the algorithm that produced it.
///
/// Digests of different algorithms never compare equal, even when one is a
/// prefix of the other.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct Hash {
    algorithm: Algorithm,
    bytes: [u8; MAX_DIGEST_LEN],
}

impl Hash {
    fn from_ring(algorithm: Algorithm, digest: digest::Digest) -> Hash {
        let mut bytes = [0u8; MAX_DIGEST_LEN];
        bytes[..algorithm.size()].copy_from_slice(digest.as_ref());
        Hash { algorithm, bytes }
    }

    pub fn from_slice(algorithm: Algorithm, digest: &[u8]) -> Result<Hash, InvalidHashError> {
        let length = digest.len();
        if length != algorithm.size() {
            return Err(InvalidHashError { algorithm, length });
        }
        let mut bytes = [0u8; MAX_DIGEST_LEN];
        bytes[..length].copy_from_slice(digest);
        Ok(Hash { algorithm, bytes })
    }

    /// Parses a hex digest produced by `algorithm`. Upper case hex is accepted.
    pub fn parse_hex(algorithm: Algorithm, s: &str) -> Result<Hash, ParseHashError> {
        let decoded = HEXLOWER_PERMISSIVE
            .decode(s.as_bytes())
            .map_err(|_| ParseHashError::BadHex(s.to_owned()))?;
        Ok(Hash::from_slice(algorithm, &decoded)?)
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.algorithm.size()]
    }

    pub fn to_hex(&self) -> String {
        HEXLOWER.encode(self.as_bytes())
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{self}", self.algorithm)
    }
}

/// Parses a bare hex digest, inferring the algorithm from its length.
impl FromStr for Hash {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Algorithm::from_hex_len(s.len()) {
            Some(algorithm) => Hash::parse_hex(algorithm, s),
            None => Err(ParseHashError::UnknownLength {
                digest: s.to_owned(),
                length: s.len(),
            }),
        }
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        hex.parse().map_err(serde::de::Error::custom)
    }
}

/// Incremental digest calculation.
///
/// ```
/// use isolate_utils_hash::{Algorithm, Context};
///
/// let mut ctx = Context::new(Algorithm::SHA1);
/// ctx.update("hello");
/// ctx.update(", world");
///
/// assert_eq!(ctx.finish(), Algorithm::SHA1.digest("hello, world"));
/// ```
#[derive(Clone)]
pub struct Context {
    algorithm: Algorithm,
    inner: digest::Context,
}

impl Context {
    pub fn new(algorithm: Algorithm) -> Self {
        Context {
            algorithm,
            inner: digest::Context::new(algorithm.ring()),
        }
    }

    pub fn update(&mut self, data: impl AsRef<[u8]>) {
        self.inner.update(data.as_ref());
    }

    pub fn finish(self) -> Hash {
        Hash::from_ring(self.algorithm, self.inner.finish())
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// An [`AsyncWrite`] that discards its input and keeps only the digest and
/// the number of bytes written.
///
/// ```
/// use isolate_utils_hash::{Algorithm, HashSink};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> std::io::Result<()> {
/// let mut sink = HashSink::new(Algorithm::SHA1);
/// tokio::io::copy(&mut &b"hello, world"[..], &mut sink).await?;
///
/// assert_eq!(sink.finish(), (12, Algorithm::SHA1.digest("hello, world")));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct HashSink {
    written: u64,
    ctx: Context,
}

impl HashSink {
    pub fn new(algorithm: Algorithm) -> HashSink {
        HashSink {
            written: 0,
            ctx: Context::new(algorithm),
        }
    }

    /// Byte count and digest of everything written.
    pub fn finish(self) -> (u64, Hash) {
        (self.written, self.ctx.finish())
    }
}

impl AsyncWrite for HashSink {
    fn poll_write(
        self: Pin<&mut Self>,
        _: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        this.ctx.update(buf);
        this.written += buf.len() as u64;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _: &mut std::task::Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _: &mut std::task::Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[cfg(any(test, feature = "test"))]
mod arbitrary {
    use proptest::prelude::*;

    use super::{Algorithm, Hash};

    impl Arbitrary for Algorithm {
        type Parameters = ();
        type Strategy = BoxedStrategy<Algorithm>;

        fn arbitrary_with(_: ()) -> Self::Strategy {
            prop::sample::select(Algorithm::ALL.to_vec()).boxed()
        }
    }

    impl Arbitrary for Hash {
        type Parameters = Algorithm;
        type Strategy = BoxedStrategy<Hash>;

        fn arbitrary_with(algorithm: Algorithm) -> Self::Strategy {
            any::<Vec<u8>>()
                .prop_map(move |data| algorithm.digest(data))
                .boxed()
        }
    }
}
