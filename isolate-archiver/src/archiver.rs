// SPDX-License-Identifier: MIT

use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use isolate_store::ContentStore;
use isolate_utils_hash::Algorithm;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::control::{Control, Lifecycle};
use crate::source::{DedupKey, PushSource, SeekableStream};
use crate::{ArchiveError, ArchiverConfig, InvalidConfig, PushFuture, Stats, pipeline, progress};

/// Receiving end of an archiver's error channel.
pub type ErrorReceiver = mpsc::UnboundedReceiver<ArchiveError>;

/// Hashes pushed content and uploads whatever the store does not hold yet.
///
/// Pushing never blocks: every push is queued and answered with a
/// [`PushFuture`]. Pushing the same file twice yields the same future, so
/// its content is hashed, looked up and counted once. [`close`] stops
/// intake, waits for all queued work and returns the first error seen.
///
/// Must be created inside a tokio runtime; the stages run as tasks on it.
///
/// [`close`]: Archiver::close
pub struct Archiver<S: ContentStore> {
    control: Arc<Control>,
    store: Arc<S>,
    algorithm: Algorithm,
    errors: Mutex<Option<ErrorReceiver>>,
    closed: watch::Receiver<bool>,
}

impl<S: ContentStore> Archiver<S> {
    /// Creates an archiver with default tuning. Progress lines are written
    /// to `progress` when given.
    pub fn new(store: S, progress: Option<Box<dyn Write + Send>>) -> Self {
        Self::build(store, progress, ArchiverConfig::default())
    }

    pub fn with_config(
        store: S,
        progress: Option<Box<dyn Write + Send>>,
        config: ArchiverConfig,
    ) -> Result<Self, InvalidConfig> {
        config.validate()?;
        Ok(Self::build(store, progress, config))
    }

    fn build(store: S, progress: Option<Box<dyn Write + Send>>, config: ArchiverConfig) -> Self {
        let store = Arc::new(store);
        let algorithm = store.namespace().algorithm();
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();
        let control = Arc::new(Control::new(queue_tx, errors_tx, config.metrics.clone()));

        let stages = pipeline::spawn(control.clone(), store.clone(), queue_rx, algorithm, &config);
        let reporter = progress.map(|out| {
            let stop = CancellationToken::new();
            let handle = tokio::spawn(progress::report(
                out,
                control.clone(),
                config.progress_interval(),
                stop.clone(),
            ));
            (handle, stop)
        });

        let (closed_tx, closed_rx) = watch::channel(false);
        tokio::spawn(supervise(control.clone(), stages, reporter, closed_tx));

        debug!(
            namespace = %store.namespace(),
            %algorithm,
            hash_workers = config.hash_workers,
            upload_workers = config.upload_workers,
            "archiver started"
        );

        Self {
            control,
            store,
            algorithm,
            errors: Mutex::new(Some(errors_rx)),
            closed: closed_rx,
        }
    }

    /// Queues the file at `path`.
    ///
    /// Returns `None` once the archiver stopped accepting work. Paths that
    /// resolve to the same file share one future for the archiver's
    /// lifetime, even after it completed; that future keeps the display
    /// name of the first push.
    ///
    /// Never waits on the pipeline. The path is resolved to its dedup key
    /// right here with one `canonicalize` call (metadata lookups, no content
    /// reads); all file I/O on the content happens in the stages.
    pub fn push_file(&self, display_name: impl Into<String>, path: impl AsRef<Path>) -> Option<PushFuture> {
        let path = path.as_ref();
        let key = DedupKey::for_path(path);
        self.control.submit(
            display_name.into(),
            PushSource::Path(path.to_path_buf()),
            Some(key),
        )
    }

    /// Queues the content of `stream`. Streams are never deduplicated.
    ///
    /// The stream is rewound before it is read, so its current position
    /// does not matter.
    pub fn push(
        &self,
        display_name: impl Into<String>,
        stream: impl SeekableStream + 'static,
    ) -> Option<PushFuture> {
        self.control.submit(
            display_name.into(),
            PushSource::Stream(Box::new(stream)),
            None,
        )
    }

    pub fn push_source(&self, display_name: impl Into<String>, source: PushSource) -> Option<PushFuture> {
        match source {
            PushSource::Path(path) => self.push_file(display_name, path),
            PushSource::Stream(stream) => self.control.submit(
                display_name.into(),
                PushSource::Stream(stream),
                None,
            ),
        }
    }

    /// Current totals. Never waits on the pipeline.
    pub fn stats(&self) -> Stats {
        self.control.stats()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.control.lifecycle()
    }

    /// Takes the error channel. Every request failure, and a cancellation,
    /// is sent on it; it ends once the archiver is closed.
    ///
    /// Returns `None` after the first call.
    pub fn take_errors(&self) -> Option<ErrorReceiver> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Aborts the archiver: no new pushes are accepted and queued work
    /// completes with [`ArchiveError::Canceled`] without reaching the store.
    /// Work already talking to the store is allowed to finish.
    pub fn cancel(&self) {
        self.control.cancel();
    }

    /// A handle that can cancel this archiver from elsewhere, such as a
    /// signal handler.
    pub fn canceler(&self) -> Canceler {
        Canceler(self.control.clone())
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Digest algorithm picked from the store's namespace.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Stops intake and waits for every queued request to finish.
    ///
    /// Returns the first error any request hit, or
    /// [`ArchiveError::Canceled`] after a cancellation. Safe to call more
    /// than once and from several tasks; every call waits for the same
    /// shutdown and returns the same result.
    pub async fn close(&self) -> Result<(), ArchiveError> {
        self.control.request_close();
        let mut closed = self.closed.clone();
        // The supervisor only goes away early when the runtime shuts down.
        let _ = closed.wait_for(|closed| *closed).await;
        match self.control.terminal_error() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl<S: ContentStore> Drop for Archiver<S> {
    fn drop(&mut self) {
        self.control.request_close();
    }
}

/// Cancels the archiver it was taken from. Cheap to clone.
#[derive(Clone)]
pub struct Canceler(Arc<Control>);

impl Canceler {
    pub fn cancel(&self) {
        self.0.cancel();
    }
}

impl std::fmt::Debug for Canceler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Canceler")
            .field("lifecycle", &self.0.lifecycle())
            .finish()
    }
}

/// Joins the stages in pipeline order, waits for a close request, then
/// stops the progress reporter and marks the archiver closed.
async fn supervise(
    control: Arc<Control>,
    stages: Vec<JoinHandle<()>>,
    reporter: Option<(JoinHandle<()>, CancellationToken)>,
    closed: watch::Sender<bool>,
) {
    for stage in stages {
        if let Err(e) = stage.await {
            warn!("archiver stage failed: {e}");
        }
    }
    // Stages also drain after a failure; only close() or drop finishes.
    control.close_requested().cancelled().await;
    if let Some((handle, stop)) = reporter {
        stop.cancel();
        if let Err(e) = handle.await {
            warn!("progress reporter failed: {e}");
        }
    }
    control.finish();
    closed.send_replace(true);
    debug!("archiver closed");
}
