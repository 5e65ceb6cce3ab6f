// SPDX-License-Identifier: MIT

use std::sync::Arc;
use std::time::Instant;

use isolate_utils_hash::Algorithm;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, instrument, trace};

use super::{HashJob, Hashed, acquire, drain, reap};
use crate::ArchiveError;
use crate::control::Control;

pub(super) async fn run(
    control: Arc<Control>,
    mut jobs: mpsc::UnboundedReceiver<HashJob>,
    lookups: mpsc::Sender<Hashed>,
    algorithm: Algorithm,
    workers: usize,
) {
    let permits = Arc::new(Semaphore::new(workers));
    let mut running = JoinSet::new();

    while let Some(job) = jobs.recv().await {
        reap("hash", &mut running);
        let Some(permit) = acquire(&control, &permits).await else {
            job.resolver.cancel();
            continue;
        };
        let control = control.clone();
        let lookups = lookups.clone();
        running.spawn(async move {
            let _permit = permit;
            hash_one(&control, job, algorithm, &lookups).await;
        });
    }

    drain("hash", &mut running).await;
    debug!("hash stage finished");
}

#[instrument(skip_all, fields(name = %job.resolver.display_name()))]
async fn hash_one(control: &Control, job: HashJob, algorithm: Algorithm, lookups: &mpsc::Sender<Hashed>) {
    let HashJob { mut source, resolver } = job;
    let started = Instant::now();

    match source.digest(algorithm).await {
        Ok((size, digest)) => {
            if let Some(metrics) = control.metrics() {
                metrics.hash_duration.observe(started.elapsed().as_secs_f64());
            }
            trace!(%digest, size, "hashed");
            resolver.set_hashed(digest, size);
            let hashed = Hashed {
                source,
                resolver,
                digest,
                size,
            };
            if lookups.send(hashed).await.is_err() {
                debug!("lookup stage is gone, request canceled");
            }
        }
        Err(source) => {
            let error = ArchiveError::Hash {
                name: resolver.display_name().to_owned(),
                source,
            };
            control.fail(error.clone());
            resolver.fail(error);
        }
    }
}
