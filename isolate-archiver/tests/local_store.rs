// SPDX-License-Identifier: MIT

//! Archiving into a directory-backed store across archiver instances.

use isolate_archiver::{Archiver, Outcome};
use isolate_store::{LocalStore, Namespace};
use isolate_utils_test::CanonicalTempDir;

#[test_log::test(tokio::test)]
async fn second_run_finds_everything_in_the_store() {
    let sources = CanonicalTempDir::new().unwrap();
    let root = CanonicalTempDir::new().unwrap();
    let paths: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|name| sources.write_file(name, format!("content of {name}")).unwrap())
        .collect();

    let store = LocalStore::open(root.path(), Namespace::default()).unwrap();
    let first = Archiver::new(store.clone(), None);
    let futures: Vec<_> = paths
        .iter()
        .map(|path| first.push_file(path.display().to_string(), path).unwrap())
        .collect();
    first.close().await.unwrap();

    assert_eq!(first.stats().misses, 3);
    for future in &futures {
        assert_eq!(future.outcome(), Some(Outcome::Miss));
        let blob = store.path_for(&future.digest().unwrap());
        assert_eq!(
            std::fs::read(blob).unwrap(),
            std::fs::read(future.display_name()).unwrap()
        );
    }

    let second = Archiver::new(store, None);
    for path in &paths {
        second.push_file(path.display().to_string(), path).unwrap();
    }
    second.close().await.unwrap();

    let stats = second.stats();
    assert_eq!(stats.hits, 3);
    assert_eq!(stats.misses, 0);
    assert_eq!(stats.bytes_hits, first.stats().bytes_pushed);
}
