// SPDX-License-Identifier: MIT

use std::sync::Arc;
use std::time::Instant;

use isolate_store::ContentStore;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, instrument, trace, warn};

use super::{Hashed, acquire, drain, reap};
use crate::control::Control;
use crate::{ArchiveError, Outcome};

pub(super) async fn run<S: ContentStore>(
    control: Arc<Control>,
    store: Arc<S>,
    mut uploads: mpsc::Receiver<Hashed>,
    workers: usize,
) {
    let permits = Arc::new(Semaphore::new(workers));
    let mut running = JoinSet::new();

    while let Some(item) = uploads.recv().await {
        reap("upload", &mut running);
        let Some(permit) = acquire(&control, &permits).await else {
            item.resolver.cancel();
            continue;
        };
        let control = control.clone();
        let store = store.clone();
        running.spawn(async move {
            let _permit = permit;
            upload_one(&control, &*store, item).await;
        });
    }

    drain("upload", &mut running).await;
    debug!("upload stage finished");
}

#[instrument(skip_all, fields(name = %item.resolver.display_name(), digest = %item.digest))]
async fn upload_one<S: ContentStore>(control: &Control, store: &S, item: Hashed) {
    let Hashed {
        mut source,
        resolver,
        digest,
        size,
    } = item;

    let content = match source.read_verified(&digest, size).await {
        Ok(content) => content,
        Err(source) => {
            let error = ArchiveError::Read {
                name: resolver.display_name().to_owned(),
                source,
            };
            control.fail(error.clone());
            resolver.fail(error);
            return;
        }
    };

    let started = Instant::now();
    match store.upload(&digest, content).await {
        Ok(()) => {
            if let Some(metrics) = control.metrics() {
                metrics.upload_duration.observe(started.elapsed().as_secs_f64());
            }
            trace!(size, "uploaded");
            control.record_miss(size);
            resolver.finish(Outcome::Miss);
        }
        Err(source) => {
            warn!("upload failed: {source}");
            let error = ArchiveError::Upload {
                name: resolver.display_name().to_owned(),
                source,
            };
            control.fail(error.clone());
            resolver.fail(error);
        }
    }
}
