// SPDX-License-Identifier: MIT

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::ArchiverMetrics;

fn default_hash_workers() -> usize {
    std::thread::available_parallelism().map_or(4, |n| n.get())
}

fn default_upload_workers() -> usize {
    8
}

fn default_lookup_batch_size() -> usize {
    100
}

fn default_queue_depth() -> usize {
    1024
}

fn default_progress_interval_ms() -> u64 {
    500
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid archiver configuration: {reason}")]
pub struct InvalidConfig {
    pub reason: String,
}

/// Tuning knobs for an [`Archiver`](crate::Archiver).
///
/// Deserializable so hosts can embed it as a table in their own config.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiverConfig {
    /// Concurrent hashing jobs.
    #[serde(default = "default_hash_workers")]
    pub hash_workers: usize,
    /// Concurrent uploads.
    #[serde(default = "default_upload_workers")]
    pub upload_workers: usize,
    /// Maximum digests per existence check.
    #[serde(default = "default_lookup_batch_size")]
    pub lookup_batch_size: usize,
    /// Capacity of the queues between hashing, lookup and upload.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,

    #[serde(skip)]
    pub metrics: Option<Arc<ArchiverMetrics>>,
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        Self {
            hash_workers: default_hash_workers(),
            upload_workers: default_upload_workers(),
            lookup_batch_size: default_lookup_batch_size(),
            queue_depth: default_queue_depth(),
            progress_interval_ms: default_progress_interval_ms(),
            metrics: None,
        }
    }
}

impl ArchiverConfig {
    pub fn with_metrics(mut self, metrics: Arc<ArchiverMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn validate(&self) -> Result<(), InvalidConfig> {
        let positive = [
            ("hash_workers", self.hash_workers),
            ("upload_workers", self.upload_workers),
            ("lookup_batch_size", self.lookup_batch_size),
            ("queue_depth", self.queue_depth),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(InvalidConfig {
                reason: format!("{name} must be greater than 0"),
            });
        }
        if self.progress_interval_ms == 0 {
            return Err(InvalidConfig {
                reason: "progress_interval_ms must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}
