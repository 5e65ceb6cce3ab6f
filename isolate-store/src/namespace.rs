// SPDX-License-Identifier: MIT

use std::fmt;
use std::str::FromStr;

use isolate_utils_hash::Algorithm;
use serde::Deserialize;

use crate::StoreError;

const DEFAULT_NAMESPACE: &str = "default-gzip";

/// The partition of a store that blobs are written to.
///
/// The namespace prefix selects the digest algorithm: `sha256-*` and
/// `sha512-*` use those algorithms, everything else (including the default
/// `default-gzip`) uses SHA-1.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct Namespace(String);

impl Namespace {
    pub fn new(name: impl Into<String>) -> Result<Self, StoreError> {
        let name = name.into();
        if name.is_empty() {
            return Err(StoreError::InvalidNamespace);
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn algorithm(&self) -> Algorithm {
        if self.0.starts_with("sha256-") {
            Algorithm::SHA256
        } else if self.0.starts_with("sha512-") {
            Algorithm::SHA512
        } else {
            Algorithm::SHA1
        }
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self(DEFAULT_NAMESPACE.to_owned())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Namespace {
    type Err = StoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Namespace {
    type Error = StoreError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::default("default-gzip", Algorithm::SHA1)]
    #[case::deflate("default-deflate", Algorithm::SHA1)]
    #[case::sha256("sha256-gzip", Algorithm::SHA256)]
    #[case::sha512("sha512-flat", Algorithm::SHA512)]
    fn algorithm_follows_prefix(#[case] name: &str, #[case] expected: Algorithm) {
        assert_eq!(Namespace::new(name).unwrap().algorithm(), expected);
    }

    #[test]
    fn empty_namespace_is_rejected() {
        assert!(matches!(
            "".parse::<Namespace>(),
            Err(StoreError::InvalidNamespace)
        ));
    }

    #[test]
    fn default_namespace() {
        assert_eq!(Namespace::default().as_str(), "default-gzip");
    }
}
