// SPDX-License-Identifier: MIT

use std::collections::HashSet;
use std::sync::Arc;

use isolate_store::ContentStore;
use isolate_utils_hash::Hash;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use super::Hashed;
use crate::control::Control;
use crate::{ArchiveError, Outcome};

pub(super) async fn run<S: ContentStore>(
    control: Arc<Control>,
    store: Arc<S>,
    mut hashed: mpsc::Receiver<Hashed>,
    uploads: mpsc::Sender<Hashed>,
    batch_size: usize,
) {
    let mut batch = Vec::with_capacity(batch_size);
    while hashed.recv_many(&mut batch, batch_size).await > 0 {
        lookup_batch(&control, &*store, &mut batch, &uploads).await;
    }
    debug!("lookup stage finished");
}

/// Asks the store which digests of `batch` it lacks; hands those to the
/// upload stage and completes the rest as hits.
#[instrument(skip_all, fields(batch = batch.len()))]
async fn lookup_batch<S: ContentStore>(
    control: &Control,
    store: &S,
    batch: &mut Vec<Hashed>,
    uploads: &mpsc::Sender<Hashed>,
) {
    if control.is_canceled() {
        batch.drain(..).for_each(|item| item.resolver.cancel());
        return;
    }

    let digests: Vec<Hash> = batch.iter().map(|item| item.digest).collect();
    if let Some(metrics) = control.metrics() {
        metrics.lookup_batch_size.observe(digests.len() as f64);
    }

    match store.contains(&digests).await {
        Ok(missing) => {
            debug!(missing = missing.len(), "lookup done");
            let missing: HashSet<Hash> = missing.into_iter().collect();
            for item in batch.drain(..) {
                if missing.contains(&item.digest) {
                    if uploads.send(item).await.is_err() {
                        debug!("upload stage is gone, request canceled");
                    }
                } else {
                    control.record_hit(item.size);
                    item.resolver.finish(Outcome::Hit);
                }
            }
        }
        Err(source) => {
            warn!("lookup failed: {source}");
            for item in batch.drain(..) {
                let error = ArchiveError::Lookup {
                    name: item.resolver.display_name().to_owned(),
                    source: source.clone(),
                };
                control.fail(error.clone());
                item.resolver.fail(error);
            }
        }
    }
}
