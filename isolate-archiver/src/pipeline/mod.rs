// SPDX-License-Identifier: MIT

//! The hashing, lookup and upload stages.
//!
//! Each stage is one task reading from the queue in front of it. Hashing
//! and uploading fan out to worker tasks bounded by a semaphore; lookups
//! are batched. A stage exits when its input queue is closed and drained,
//! which closes the queue of the next stage, so dropping the head of the
//! pipeline shuts everything down in order.

use std::sync::Arc;

use isolate_store::ContentStore;
use isolate_utils_hash::{Algorithm, Hash};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::warn;

use crate::ArchiverConfig;
use crate::control::Control;
use crate::future::Resolver;
use crate::source::PushSource;

mod hash;
mod lookup;
mod upload;

/// A request waiting to be hashed.
pub(crate) struct HashJob {
    pub(crate) source: PushSource,
    pub(crate) resolver: Resolver,
}

/// A request whose digest is known.
pub(crate) struct Hashed {
    pub(crate) source: PushSource,
    pub(crate) resolver: Resolver,
    pub(crate) digest: Hash,
    pub(crate) size: u64,
}

/// Spawns every stage and returns their handles.
pub(crate) fn spawn<S: ContentStore>(
    control: Arc<Control>,
    store: Arc<S>,
    jobs: mpsc::UnboundedReceiver<HashJob>,
    algorithm: Algorithm,
    config: &ArchiverConfig,
) -> Vec<JoinHandle<()>> {
    let (lookup_tx, lookup_rx) = mpsc::channel(config.queue_depth);
    let (upload_tx, upload_rx) = mpsc::channel(config.queue_depth);

    vec![
        tokio::spawn(hash::run(
            control.clone(),
            jobs,
            lookup_tx,
            algorithm,
            config.hash_workers,
        )),
        tokio::spawn(lookup::run(
            control.clone(),
            store.clone(),
            lookup_rx,
            upload_tx,
            config.lookup_batch_size,
        )),
        tokio::spawn(upload::run(
            control,
            store,
            upload_rx,
            config.upload_workers,
        )),
    ]
}

/// Waits for a worker slot, giving up once the archiver is canceled.
async fn acquire(control: &Control, permits: &Arc<Semaphore>) -> Option<OwnedSemaphorePermit> {
    tokio::select! {
        biased;
        _ = control.cancel_token().cancelled() => None,
        permit = permits.clone().acquire_owned() => permit.ok(),
    }
}

fn log_worker_exit(stage: &str, result: Result<(), JoinError>) {
    if let Err(e) = result {
        warn!(stage, "worker task failed: {e}");
    }
}

/// Collects workers that already finished so the set does not grow with
/// the number of requests.
fn reap(stage: &str, running: &mut JoinSet<()>) {
    while let Some(result) = running.try_join_next() {
        log_worker_exit(stage, result);
    }
}

async fn drain(stage: &str, running: &mut JoinSet<()>) {
    while let Some(result) = running.join_next().await {
        log_worker_exit(stage, result);
    }
}
