// SPDX-License-Identifier: MIT

use std::io::{self, Cursor, SeekFrom};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use isolate_store::StoreError;
use isolate_utils_test::CanonicalTempDir;
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

use super::harness::memory_archiver;
use crate::{ArchiveError, Lifecycle, Stats};

#[test_log::test(tokio::test)]
async fn unreadable_file_fails_its_request_and_the_archiver() {
    let dir = CanonicalTempDir::new().unwrap();
    let nonexistent = dir.path().join("nonexistent");
    let existent = dir.write_file("existent", b"foo").unwrap();
    let (archiver, store) = memory_archiver();
    let mut errors = archiver.take_errors().unwrap();

    let future1 = archiver.push_file("foo", &nonexistent).unwrap();
    assert_eq!(future1.display_name(), "foo");
    let future2 = archiver.push_file("existent", &existent).unwrap();
    future1.wait_for_hashed().await;
    future2.wait_for_hashed().await;

    let expected_prefix = format!("hash(foo) failed: open {}: ", nonexistent.display());
    let first = errors.recv().await.unwrap();
    assert!(matches!(first, ArchiveError::Hash { .. }));
    assert!(first.to_string().starts_with(&expected_prefix), "{first}");

    let closed = archiver.close().await.unwrap_err();
    assert_eq!(closed.to_string(), first.to_string());
    assert!(store.error().is_none());

    // The failure is per request: the other push still went through.
    assert_eq!(future1.digest(), None);
    assert_eq!(
        future1.error().map(|e| e.to_string()),
        Some(first.to_string())
    );
    assert!(future2.error().is_none());
    assert_eq!(archiver.stats().misses, 1);
}

#[tokio::test]
async fn failure_stops_intake_until_closed() {
    let dir = CanonicalTempDir::new().unwrap();
    let (archiver, _store) = memory_archiver();
    let mut errors = archiver.take_errors().unwrap();

    let future = archiver
        .push_file("missing", dir.path().join("missing"))
        .unwrap();
    future.wait().await.unwrap_err();
    assert_eq!(archiver.lifecycle(), Lifecycle::Closing);
    assert!(archiver.push("late", Cursor::new(b"late".to_vec())).is_none());

    // Give the drained stages time to exit; that alone must not close.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(archiver.lifecycle(), Lifecycle::Closing);

    // Still open enough to be canceled.
    archiver.cancel();
    assert!(matches!(errors.recv().await, Some(ArchiveError::Hash { .. })));
    assert!(matches!(errors.recv().await, Some(ArchiveError::Canceled)));

    let err = archiver.close().await.unwrap_err();
    assert!(matches!(err, ArchiveError::Hash { .. }));
    assert_eq!(archiver.lifecycle(), Lifecycle::Closed);
    assert!(errors.recv().await.is_none());
}

#[tokio::test]
async fn lookup_failure_is_reported_per_request() {
    let (archiver, store) = memory_archiver();
    store.fail_contains(true);

    let future = archiver.push("foo", Cursor::new(b"foo".to_vec())).unwrap();
    let err = archiver.close().await.unwrap_err();

    assert!(matches!(
        err,
        ArchiveError::Lookup {
            source: StoreError::Unavailable { .. },
            ..
        }
    ));
    assert_eq!(
        err.to_string(),
        "contains(foo) failed: store unavailable: lookup rejected by fake store"
    );
    // Hashing succeeded before the store was consulted.
    assert!(future.digest().is_some());
    assert!(future.error().is_some());
    assert_eq!(future.outcome(), None);
    assert_eq!(archiver.stats(), Stats::default());
}

#[tokio::test]
async fn upload_failure_is_reported_per_request() {
    let (archiver, store) = memory_archiver();
    store.fail_uploads(true);

    let future = archiver.push("foo", Cursor::new(b"foo".to_vec())).unwrap();
    let err = archiver.close().await.unwrap_err();

    assert_eq!(
        err.to_string(),
        "push(foo) failed: store unavailable: upload rejected by fake store"
    );
    assert!(matches!(future.error(), Some(ArchiveError::Upload { .. })));
    assert_eq!(archiver.stats(), Stats::default());
    assert!(store.contents().is_empty());
}

#[tokio::test]
async fn error_channel_drains_then_ends_after_close() {
    let dir = CanonicalTempDir::new().unwrap();
    let (archiver, _store) = memory_archiver();
    let mut errors = archiver.take_errors().unwrap();
    assert!(archiver.take_errors().is_none());

    archiver.push_file("a", dir.path().join("a")).unwrap();
    archiver.push_file("b", dir.path().join("b")).unwrap();
    archiver.close().await.unwrap_err();

    let mut received = Vec::new();
    while let Some(error) = errors.recv().await {
        received.push(error.to_string());
    }
    received.sort();
    assert_eq!(received.len(), 2);
    assert!(received[0].starts_with("hash(a) failed: open "));
    assert!(received[1].starts_with("hash(b) failed: open "));
}

#[tokio::test]
async fn missing_file_pushed_twice_fails_once() {
    let dir = CanonicalTempDir::new().unwrap();
    let missing = dir.path().join("missing");
    let (archiver, _store) = memory_archiver();
    let mut errors = archiver.take_errors().unwrap();

    let a = archiver.push_file("a", &missing).unwrap();
    let b = archiver.push_file("b", &missing).unwrap();
    archiver.close().await.unwrap_err();

    assert_eq!(
        a.error().map(|e| e.to_string()),
        b.error().map(|e| e.to_string())
    );
    assert!(errors.recv().await.is_some());
    assert!(errors.recv().await.is_none());
}

/// Readable, but refuses every seek.
struct Unseekable(Cursor<Vec<u8>>);

impl AsyncRead for Unseekable {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

impl AsyncSeek for Unseekable {
    fn start_seek(self: Pin<&mut Self>, _: SeekFrom) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "not seekable"))
    }

    fn poll_complete(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Poll::Ready(Ok(0))
    }
}

#[tokio::test]
async fn stream_that_cannot_rewind_fails_hashing() {
    let (archiver, store) = memory_archiver();
    let mut content = Cursor::new(b"foo".to_vec());
    content.set_position(1);

    let future = archiver.push("s", Unseekable(content)).unwrap();
    let err = archiver.close().await.unwrap_err();

    assert!(matches!(err, ArchiveError::Hash { .. }));
    assert_eq!(err.to_string(), "hash(s) failed: seek stream to start: not seekable");
    assert!(matches!(future.error(), Some(ArchiveError::Hash { .. })));
    assert_eq!(future.digest(), None);
    assert_eq!(store.contains_calls(), 0);
    assert_eq!(store.upload_calls(), 0);
}
