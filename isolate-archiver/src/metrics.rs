// SPDX-License-Identifier: MIT

//! Prometheus metrics for archiver throughput and failures.

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

/// Metrics describing what an archiver did with the requests pushed to it.
#[derive(Clone, Debug)]
pub struct ArchiverMetrics {
    /// Push calls that were accepted
    pub pushes_total: IntCounter,
    /// Push calls answered with an existing future
    pub dedup_hits_total: IntCounter,
    /// Completed requests, labeled by outcome ("hit" or "miss")
    pub requests_total: IntCounterVec,
    /// Content bytes of completed requests, labeled by outcome
    pub bytes_total: IntCounterVec,
    /// Failed requests, labeled by stage ("hash", "read", "lookup", "upload", "canceled")
    pub errors_total: IntCounterVec,
    /// Digests per existence check
    pub lookup_batch_size: Histogram,
    /// Time spent hashing one request
    pub hash_duration: Histogram,
    /// Time spent uploading one request
    pub upload_duration: Histogram,
}

impl ArchiverMetrics {
    /// Create new metrics and register them with the given Prometheus registry.
    ///
    /// # Arguments
    /// * `prefix` - Prefix for metric names (e.g., "isolate")
    /// * `registry` - Prometheus registry to register metrics with
    pub fn new(prefix: &str, registry: &Registry) -> Result<Self, prometheus::Error> {
        let pushes_total = IntCounter::with_opts(Opts::new(
            format!("{prefix}_archiver_pushes_total"),
            "Total number of push requests accepted by the archiver",
        ))?;

        let dedup_hits_total = IntCounter::with_opts(Opts::new(
            format!("{prefix}_archiver_dedup_hits_total"),
            "Push requests served by an already known future",
        ))?;

        let requests_total = IntCounterVec::new(
            Opts::new(
                format!("{prefix}_archiver_requests_total"),
                "Completed requests by store outcome",
            ),
            &["outcome"], // "hit" or "miss"
        )?;

        let bytes_total = IntCounterVec::new(
            Opts::new(
                format!("{prefix}_archiver_bytes_total"),
                "Content bytes of completed requests by store outcome",
            ),
            &["outcome"],
        )?;

        let errors_total = IntCounterVec::new(
            Opts::new(
                format!("{prefix}_archiver_errors_total"),
                "Failed requests by pipeline stage",
            ),
            &["stage"],
        )?;

        let lookup_batch_size = Histogram::with_opts(
            HistogramOpts::new(
                format!("{prefix}_archiver_lookup_batch_size"),
                "Number of digests sent in one existence check",
            )
            .buckets(vec![1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0]),
        )?;

        let hash_duration = Histogram::with_opts(
            HistogramOpts::new(
                format!("{prefix}_archiver_hash_duration_seconds"),
                "Time spent hashing the content of one request",
            )
            .buckets(vec![
                0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0,
            ]),
        )?;

        let upload_duration = Histogram::with_opts(
            HistogramOpts::new(
                format!("{prefix}_archiver_upload_duration_seconds"),
                "Time spent uploading the content of one request",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 10.0,
            ]),
        )?;

        registry.register(Box::new(pushes_total.clone()))?;
        registry.register(Box::new(dedup_hits_total.clone()))?;
        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(bytes_total.clone()))?;
        registry.register(Box::new(errors_total.clone()))?;
        registry.register(Box::new(lookup_batch_size.clone()))?;
        registry.register(Box::new(hash_duration.clone()))?;
        registry.register(Box::new(upload_duration.clone()))?;

        Ok(ArchiverMetrics {
            pushes_total,
            dedup_hits_total,
            requests_total,
            bytes_total,
            errors_total,
            lookup_batch_size,
            hash_duration,
            upload_duration,
        })
    }

    pub(crate) fn record_completed(&self, outcome: &str, size: u64) {
        self.requests_total.with_label_values(&[outcome]).inc();
        self.bytes_total.with_label_values(&[outcome]).inc_by(size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_under_prefix() {
        let registry = Registry::new();
        let metrics = ArchiverMetrics::new("isolate", &registry).unwrap();
        metrics.record_completed("hit", 3);

        let text = prometheus::TextEncoder::new()
            .encode_to_string(&registry.gather())
            .unwrap();
        assert!(text.contains("isolate_archiver_requests_total{outcome=\"hit\"} 1"));
        assert!(text.contains("isolate_archiver_bytes_total{outcome=\"hit\"} 3"));
        assert_eq!(metrics.bytes_total.with_label_values(&["hit"]).get(), 3);
    }

    #[test]
    fn double_registration_fails() {
        let registry = Registry::new();
        ArchiverMetrics::new("isolate", &registry).unwrap();
        assert!(ArchiverMetrics::new("isolate", &registry).is_err());
    }
}
