// SPDX-License-Identifier: MIT

use std::fmt;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

const UNITS: [&str; 7] = ["b", "Kib", "Mib", "Gib", "Tib", "Pib", "Eib"];

/// A byte count, displayed in 1024-based human units (`3b`, `1.50Mib`).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Size(pub u64);

impl Size {
    pub fn bytes(self) -> u64 {
        self.0
    }
}

impl From<u64> for Size {
    fn from(value: u64) -> Self {
        Size(value)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 < 1024 {
            return write!(f, "{}{}", self.0, UNITS[0]);
        }
        let mut value = self.0 as f64;
        let mut unit = 0;
        while value >= 1024.0 && unit < UNITS.len() - 1 {
            value /= 1024.0;
            unit += 1;
        }
        if value >= 10.0 {
            write!(f, "{value:.1}{}", UNITS[unit])
        } else {
            write!(f, "{value:.2}{}", UNITS[unit])
        }
    }
}

/// Snapshot of the archiver's running totals.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// Requests whose content the store already held.
    pub hits: u64,
    /// Requests whose content had to be uploaded.
    pub misses: u64,
    pub bytes_hits: Size,
    pub bytes_pushed: Size,
}

impl Stats {
    pub fn total_count(&self) -> u64 {
        self.hits + self.misses
    }

    pub fn total_bytes(&self) -> Size {
        Size(self.bytes_hits.0 + self.bytes_pushed.0)
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} hits ({}), {} misses ({})",
            self.hits, self.bytes_hits, self.misses, self.bytes_pushed
        )
    }
}

/// Shared, lock-protected accumulator behind [`Stats`].
///
/// Each completed request updates its counter and its byte total under a
/// single lock acquisition, so snapshots never see one without the other.
#[derive(Debug, Default)]
pub(crate) struct StatsCounter(Mutex<Stats>);

impl StatsCounter {
    pub(crate) fn record_hit(&self, size: u64) {
        let mut stats = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        stats.hits += 1;
        stats.bytes_hits.0 += size;
    }

    pub(crate) fn record_miss(&self, size: u64) {
        let mut stats = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        stats.misses += 1;
        stats.bytes_pushed.0 += size;
    }

    pub(crate) fn snapshot(&self) -> Stats {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
