// SPDX-License-Identifier: MIT

use std::str::FromStr;

use derive_more::Display;
use ring::digest;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Hash;

/// A digest algorithm usable for content addressing.
///
/// SHA-1 is the default because the stock namespaces (`default-gzip`,
/// `default-deflate`, ...) address content by its SHA-1.
#[derive(
    Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash, Display, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    #[default]
    #[display("sha1")]
    SHA1,
    #[display("sha256")]
    SHA256,
    #[display("sha512")]
    SHA512,
}

impl Algorithm {
    pub const ALL: [Algorithm; 3] = [Algorithm::SHA1, Algorithm::SHA256, Algorithm::SHA512];

    /// Digest length in bytes.
    pub const fn size(self) -> usize {
        match self {
            Algorithm::SHA1 => 20,
            Algorithm::SHA256 => 32,
            Algorithm::SHA512 => 64,
        }
    }

    /// Length of the hex rendering of a digest.
    pub const fn hex_len(self) -> usize {
        self.size() * 2
    }

    pub(crate) fn ring(self) -> &'static digest::Algorithm {
        match self {
            Algorithm::SHA1 => &digest::SHA1_FOR_LEGACY_USE_ONLY,
            Algorithm::SHA256 => &digest::SHA256,
            Algorithm::SHA512 => &digest::SHA512,
        }
    }

    /// One-shot digest of `data`.
    ///
    /// ```
    /// # use isolate_utils_hash::Algorithm;
    /// let hash = Algorithm::SHA1.digest("foo");
    ///
    /// assert_eq!("0beec7b5ea3f0fdbc95d0dd47f3c5bc275da8a33", hash.to_string());
    /// ```
    pub fn digest(self, data: impl AsRef<[u8]>) -> Hash {
        Hash::from_ring(self, digest::digest(self.ring(), data.as_ref()))
    }

    pub fn from_hex_len(len: usize) -> Option<Algorithm> {
        Self::ALL.into_iter().find(|a| a.hex_len() == len)
    }
}

#[derive(Error, Debug, PartialEq, Eq, Clone)]
#[error("unsupported digest algorithm '{0}'")]
pub struct UnknownAlgorithm(pub(super) String);

impl FromStr for Algorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| s.eq_ignore_ascii_case(&a.to_string()))
            .ok_or_else(|| UnknownAlgorithm(s.to_owned()))
    }
}
