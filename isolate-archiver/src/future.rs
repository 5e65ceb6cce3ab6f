// SPDX-License-Identifier: MIT

//! Per-request result handles.
//!
//! A [`PushFuture`] is handed to the caller; its [`Resolver`] travels
//! through the pipeline with the request and is the only thing that can
//! change what the future reports. Both sides share a `watch` channel, so
//! any number of callers can wait concurrently.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use isolate_utils_hash::Hash;
use tokio::sync::watch;

use crate::ArchiveError;

/// How a request that reached the store was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The store already held the content.
    Hit,
    /// The content was uploaded.
    Miss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureState {
    Pending,
    Hashed,
    Done,
}

#[derive(Debug, Clone)]
struct Slot {
    state: FutureState,
    hashed: Option<(Hash, u64)>,
    outcome: Option<Outcome>,
    error: Option<ArchiveError>,
}

impl Slot {
    const PENDING: Slot = Slot {
        state: FutureState::Pending,
        hashed: None,
        outcome: None,
        error: None,
    };
}

/// Handle to the eventual result of one push request.
///
/// Cloning is cheap; all clones observe the same request. Deduplicated
/// pushes hand out clones of the original future.
#[derive(Debug, Clone)]
pub struct PushFuture {
    display_name: Arc<str>,
    slot: watch::Receiver<Slot>,
}

impl PushFuture {
    /// Creates a pending future and the resolver that completes it.
    ///
    /// `in_flight` is incremented now and decremented once when the future
    /// reaches [`FutureState::Done`].
    pub(crate) fn pending(
        display_name: impl Into<Arc<str>>,
        in_flight: Arc<AtomicU64>,
    ) -> (PushFuture, Resolver) {
        let (tx, rx) = watch::channel(Slot::PENDING);
        in_flight.fetch_add(1, Ordering::SeqCst);
        let display_name = display_name.into();
        (
            PushFuture {
                display_name: display_name.clone(),
                slot: rx,
            },
            Resolver {
                display_name,
                slot: tx,
                in_flight,
            },
        )
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn state(&self) -> FutureState {
        self.slot.borrow().state
    }

    pub fn is_hashed(&self) -> bool {
        self.state() != FutureState::Pending
    }

    pub fn is_done(&self) -> bool {
        self.state() == FutureState::Done
    }

    /// Content digest, once hashing succeeded.
    pub fn digest(&self) -> Option<Hash> {
        self.slot.borrow().hashed.map(|(digest, _)| digest)
    }

    /// Content length in bytes, once hashing succeeded.
    pub fn size(&self) -> Option<u64> {
        self.slot.borrow().hashed.map(|(_, size)| size)
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.slot.borrow().outcome
    }

    pub fn error(&self) -> Option<ArchiveError> {
        self.slot.borrow().error.clone()
    }

    /// Waits until the digest is known or the request failed.
    ///
    /// Returns as soon as hashing finished; the store may still be
    /// consulted afterwards.
    pub async fn wait_for_hashed(&self) {
        self.wait_until(FutureState::Hashed).await;
    }

    /// Waits until the request is done and returns its digest or error.
    pub async fn wait(&self) -> Result<Hash, ArchiveError> {
        self.wait_until(FutureState::Done).await;
        let slot = self.slot.borrow();
        match (&slot.error, slot.hashed) {
            (Some(err), _) => Err(err.clone()),
            (None, Some((digest, _))) => Ok(digest),
            (None, None) => Err(ArchiveError::Canceled),
        }
    }

    async fn wait_until(&self, target: FutureState) {
        let mut slot = self.slot.clone();
        let reached = |s: &Slot| match target {
            FutureState::Pending => true,
            FutureState::Hashed => s.state != FutureState::Pending,
            FutureState::Done => s.state == FutureState::Done,
        };
        // The resolver always publishes Done before its sender goes away,
        // so a closed channel already holds the final state.
        let _ = slot.wait_for(reached).await;
    }
}

/// Write side of a [`PushFuture`].
///
/// Consumed by the terminal transitions. Dropping an unresolved resolver
/// completes the future with [`ArchiveError::Canceled`].
#[derive(Debug)]
pub(crate) struct Resolver {
    display_name: Arc<str>,
    slot: watch::Sender<Slot>,
    in_flight: Arc<AtomicU64>,
}

impl Resolver {
    pub(crate) fn display_name(&self) -> &str {
        &self.display_name
    }

    pub(crate) fn set_hashed(&self, digest: Hash, size: u64) {
        self.slot.send_modify(|slot| {
            if slot.state == FutureState::Pending {
                slot.state = FutureState::Hashed;
                slot.hashed = Some((digest, size));
            }
        });
    }

    pub(crate) fn finish(self, outcome: Outcome) {
        self.complete(Some(outcome), None);
    }

    pub(crate) fn fail(self, error: ArchiveError) {
        self.complete(None, Some(error));
    }

    pub(crate) fn cancel(self) {
        self.fail(ArchiveError::Canceled);
    }

    fn complete(&self, outcome: Option<Outcome>, error: Option<ArchiveError>) {
        let mut completed = false;
        self.slot.send_if_modified(|slot| {
            if slot.state == FutureState::Done {
                return false;
            }
            slot.state = FutureState::Done;
            slot.outcome = outcome;
            slot.error = error;
            completed = true;
            true
        });
        if completed {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for Resolver {
    fn drop(&mut self) {
        self.complete(None, Some(ArchiveError::Canceled));
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use isolate_utils_hash::Algorithm;

    use super::*;

    fn pending(name: &str) -> (PushFuture, Resolver, Arc<AtomicU64>) {
        let in_flight = Arc::new(AtomicU64::new(0));
        let (future, resolver) = PushFuture::pending(name, in_flight.clone());
        (future, resolver, in_flight)
    }

    #[tokio::test]
    async fn resolves_through_hashed_to_done() {
        let (future, resolver, in_flight) = pending("foo");
        let foo = Algorithm::SHA1.digest("foo");
        assert_eq!(future.state(), FutureState::Pending);
        assert_eq!(future.digest(), None);
        assert_eq!(in_flight.load(Ordering::SeqCst), 1);

        resolver.set_hashed(foo, 3);
        future.wait_for_hashed().await;
        assert_eq!(future.state(), FutureState::Hashed);
        assert_eq!(future.digest(), Some(foo));
        assert_eq!(future.size(), Some(3));
        assert_eq!(future.outcome(), None);

        resolver.finish(Outcome::Miss);
        assert_eq!(future.wait().await.unwrap(), foo);
        assert_eq!(future.outcome(), Some(Outcome::Miss));
        assert!(future.error().is_none());
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failure_unblocks_hashed_waiters() {
        let (future, resolver, _) = pending("foo");
        let waiter = tokio::spawn({
            let future = future.clone();
            async move { future.wait_for_hashed().await }
        });
        tokio::task::yield_now().await;

        resolver.fail(ArchiveError::Canceled);
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(future.is_done());
        assert_eq!(future.digest(), None);
        assert!(future.error().unwrap().is_canceled());
    }

    #[tokio::test]
    async fn dropped_resolver_cancels_once() {
        let (future, resolver, in_flight) = pending("foo");
        drop(resolver);

        assert!(future.wait().await.unwrap_err().is_canceled());
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn done_is_final() {
        let (future, resolver, _) = pending("foo");
        let foo = Algorithm::SHA1.digest("foo");
        resolver.set_hashed(foo, 3);
        resolver.finish(Outcome::Hit);

        // The resolver's drop after `finish` must not overwrite the result.
        assert_eq!(future.outcome(), Some(Outcome::Hit));
        assert!(future.error().is_none());
        assert_eq!(future.display_name(), "foo");
    }
}
