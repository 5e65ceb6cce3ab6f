// SPDX-License-Identifier: MIT

use std::io::Cursor;

use isolate_utils_test::CanonicalTempDir;

use super::harness::{eventually, memory_archiver};
use crate::{ArchiveError, Outcome, Stats};

#[tokio::test]
async fn cancel_before_work_starts_never_touches_the_store() {
    let dir = CanonicalTempDir::new().unwrap();
    let (archiver, store) = memory_archiver();
    let mut errors = archiver.take_errors().unwrap();

    let futures: Vec<_> = (0..3)
        .map(|i| {
            let path = dir.write_file(&format!("f{i}"), format!("{i}")).unwrap();
            archiver.push_file(format!("f{i}"), path).unwrap()
        })
        .collect();
    archiver.cancel();

    assert!(archiver.close().await.unwrap_err().is_canceled());
    for future in &futures {
        assert!(future.is_done());
        assert!(future.error().unwrap().is_canceled());
    }
    assert_eq!(store.contains_calls(), 0);
    assert_eq!(store.upload_calls(), 0);
    assert_eq!(archiver.stats(), Stats::default());

    assert!(matches!(errors.recv().await, Some(ArchiveError::Canceled)));
    assert!(errors.recv().await.is_none());
}

#[tokio::test]
async fn in_flight_upload_completes_after_cancel() {
    let (archiver, store) = memory_archiver();
    store.pause_uploads();

    let future = archiver.push("foo", Cursor::new(b"foo".to_vec())).unwrap();
    eventually(|| store.upload_calls() == 1).await;

    archiver.cancel();
    assert!(archiver.push("late", Cursor::new(b"late".to_vec())).is_none());
    store.resume_uploads();

    assert!(archiver.close().await.unwrap_err().is_canceled());
    assert_eq!(future.outcome(), Some(Outcome::Miss));
    assert!(future.error().is_none());
    assert_eq!(archiver.stats().misses, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn canceler_works_from_another_task() {
    let (archiver, store) = memory_archiver();
    store.pause_uploads();
    let future = archiver.push("foo", Cursor::new(b"foo".to_vec())).unwrap();

    let canceler = archiver.canceler();
    tokio::spawn(async move { canceler.cancel() }).await.unwrap();
    store.resume_uploads();

    assert!(archiver.close().await.unwrap_err().is_canceled());
    assert!(future.is_done());
}

#[tokio::test]
async fn cancel_after_close_changes_nothing() {
    let (archiver, _store) = memory_archiver();
    let mut errors = archiver.take_errors().unwrap();
    archiver.close().await.unwrap();

    archiver.cancel();
    archiver.canceler().cancel();
    archiver.close().await.unwrap();
    assert!(errors.recv().await.is_none());
}

#[tokio::test]
async fn repeated_cancel_reports_once() {
    let (archiver, _store) = memory_archiver();
    let mut errors = archiver.take_errors().unwrap();

    archiver.cancel();
    archiver.cancel();
    assert!(archiver.close().await.unwrap_err().is_canceled());

    assert!(matches!(errors.recv().await, Some(ArchiveError::Canceled)));
    assert!(errors.recv().await.is_none());
}
