// SPDX-License-Identifier: MIT

//! Test utilities shared by the isolate crates.

use std::io;
use std::path::{Path, PathBuf};

use proptest::prelude::*;
use tempfile::TempDir;

/// Temporary directory whose path has its symlinks resolved.
///
/// On macOS `/var` is a link to `/private/var`; archiver dedup keys are
/// canonical, so test paths have to be as well.
pub struct CanonicalTempDir {
    root: PathBuf,
    _guard: TempDir,
}

impl CanonicalTempDir {
    pub fn new() -> io::Result<Self> {
        let guard = TempDir::new()?;
        Ok(CanonicalTempDir {
            root: guard.path().canonicalize()?,
            _guard: guard,
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Creates `name` under the directory holding `contents`.
    pub fn write_file(&self, name: &str, contents: impl AsRef<[u8]>) -> io::Result<PathBuf> {
        let file = self.root.join(name);
        std::fs::write(&file, contents)?;
        Ok(file)
    }
}

prop_compose! {
    /// Non-empty content together with a read offset strictly inside it.
    pub fn arb_content_with_offset()
        (len in 1usize..512)
        (content in proptest::collection::vec(any::<u8>(), len), offset in 0..len as u64) -> (Vec<u8>, u64)
    {
        (content, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_are_written_under_the_root() {
        let dir = CanonicalTempDir::new().unwrap();
        let file = dir.write_file("foo", b"foo").unwrap();
        assert_eq!(file.parent(), Some(dir.path()));
        assert_eq!(std::fs::read(&file).unwrap(), b"foo");
    }
}
