// SPDX-License-Identifier: MIT

//! State shared between the archiver handle, its stages and cancelers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::future::PushFuture;
use crate::pipeline::HashJob;
use crate::progress::Progress;
use crate::source::{DedupKey, PushSource};
use crate::stats::StatsCounter;
use crate::{ArchiveError, ArchiverMetrics};

/// Where an archiver is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Accepting pushes.
    Open,
    /// No longer accepting pushes, after a failure, a cancel or a close
    /// request. Queued work drains; the archiver stays here until closed.
    Closing,
    /// A close was requested and every stage has finished.
    Closed,
}

struct Intake {
    lifecycle: Lifecycle,
    /// Head of the pipeline. Dropping it lets every stage drain and exit.
    queue: Option<mpsc::UnboundedSender<HashJob>>,
    /// Futures of every file-backed push, kept for the archiver's lifetime.
    dedup: HashMap<DedupKey, PushFuture>,
}

pub(crate) struct Control {
    intake: Mutex<Intake>,
    terminal: OnceLock<ArchiveError>,
    errors: Mutex<Option<mpsc::UnboundedSender<ArchiveError>>>,
    canceled: AtomicBool,
    cancel: CancellationToken,
    close_requested: CancellationToken,
    stats: StatsCounter,
    in_flight: Arc<AtomicU64>,
    metrics: Option<Arc<ArchiverMetrics>>,
}

impl Control {
    pub(crate) fn new(
        queue: mpsc::UnboundedSender<HashJob>,
        errors: mpsc::UnboundedSender<ArchiveError>,
        metrics: Option<Arc<ArchiverMetrics>>,
    ) -> Self {
        Self {
            intake: Mutex::new(Intake {
                lifecycle: Lifecycle::Open,
                queue: Some(queue),
                dedup: HashMap::new(),
            }),
            terminal: OnceLock::new(),
            errors: Mutex::new(Some(errors)),
            canceled: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            close_requested: CancellationToken::new(),
            stats: StatsCounter::default(),
            in_flight: Arc::new(AtomicU64::new(0)),
            metrics,
        }
    }

    fn intake(&self) -> MutexGuard<'_, Intake> {
        self.intake.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lifecycle(&self) -> Lifecycle {
        self.intake().lifecycle
    }

    /// Registers a push and queues it for hashing.
    ///
    /// Returns `None` once the archiver stopped accepting work. A known
    /// `key` returns the future of the earlier push instead.
    pub(crate) fn submit(
        &self,
        display_name: String,
        source: PushSource,
        key: Option<DedupKey>,
    ) -> Option<PushFuture> {
        let mut intake = self.intake();
        let queue = intake.queue.as_ref()?;

        if let Some(existing) = key.as_ref().and_then(|key| intake.dedup.get(key)) {
            trace!(name = %display_name, "push deduplicated");
            if let Some(metrics) = &self.metrics {
                metrics.dedup_hits_total.inc();
            }
            return Some(existing.clone());
        }

        let (future, resolver) = PushFuture::pending(display_name, self.in_flight.clone());
        if queue.send(HashJob { source, resolver }).is_err() {
            // The returned job drops its resolver, which cancels the future.
            debug!("hash stage is gone, push canceled");
        }
        if let Some(metrics) = &self.metrics {
            metrics.pushes_total.inc();
        }
        if let Some(key) = key {
            intake.dedup.insert(key, future.clone());
        }
        Some(future)
    }

    /// Stops accepting pushes. Already queued work keeps draining.
    pub(crate) fn stop_accepting(&self) {
        let mut intake = self.intake();
        if intake.lifecycle == Lifecycle::Open {
            intake.lifecycle = Lifecycle::Closing;
        }
        intake.queue = None;
    }

    /// Stops intake and lets the archiver move to [`Lifecycle::Closed`] once
    /// its stages are done. A failure alone only stops intake.
    pub(crate) fn request_close(&self) {
        self.stop_accepting();
        self.close_requested.cancel();
    }

    pub(crate) fn close_requested(&self) -> &CancellationToken {
        &self.close_requested
    }

    /// Marks the archiver closed once every stage has exited and a close was
    /// requested, and ends the error channel.
    pub(crate) fn finish(&self) {
        {
            let mut intake = self.intake();
            intake.lifecycle = Lifecycle::Closed;
            intake.queue = None;
        }
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Records a request failure: first failure wins as the terminal
    /// error, every failure goes to the error channel, and no new pushes
    /// are accepted afterwards.
    pub(crate) fn fail(&self, error: ArchiveError) {
        debug!(%error, "request failed");
        if let Some(metrics) = &self.metrics {
            metrics
                .errors_total
                .with_label_values(&[error.stage()])
                .inc();
        }
        let _ = self.terminal.set(error.clone());
        self.send_error(error);
        self.stop_accepting();
    }

    pub(crate) fn cancel(&self) {
        if self.lifecycle() == Lifecycle::Closed || self.canceled.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("archiver canceled");
        if let Some(metrics) = &self.metrics {
            metrics.errors_total.with_label_values(&["canceled"]).inc();
        }
        let _ = self.terminal.set(ArchiveError::Canceled);
        self.send_error(ArchiveError::Canceled);
        self.stop_accepting();
        self.cancel.cancel();
    }

    fn send_error(&self, error: ArchiveError) {
        let errors = self.errors.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(errors) = errors.as_ref() {
            // Nobody listening is fine.
            let _ = errors.send(error);
        }
    }

    pub(crate) fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn terminal_error(&self) -> Option<ArchiveError> {
        self.terminal.get().cloned()
    }

    pub(crate) fn record_hit(&self, size: u64) {
        self.stats.record_hit(size);
        if let Some(metrics) = &self.metrics {
            metrics.record_completed("hit", size);
        }
    }

    pub(crate) fn record_miss(&self, size: u64) {
        self.stats.record_miss(size);
        if let Some(metrics) = &self.metrics {
            metrics.record_completed("miss", size);
        }
    }

    pub(crate) fn stats(&self) -> crate::Stats {
        self.stats.snapshot()
    }

    pub(crate) fn progress(&self) -> Progress {
        Progress {
            stats: self.stats.snapshot(),
            pending: self.in_flight.load(Ordering::SeqCst),
        }
    }

    pub(crate) fn metrics(&self) -> Option<&ArchiverMetrics> {
        self.metrics.as_deref()
    }
}
