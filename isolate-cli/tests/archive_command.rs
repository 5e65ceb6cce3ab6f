// SPDX-License-Identifier: MIT

//! Runs the `isolate` binary end to end.

use std::process::Command;

use isolate_utils_test::CanonicalTempDir;

fn isolate() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_isolate"));
    cmd.env_remove("ISOLATE_SERVER")
        .env_remove("ISOLATE_CONFIG")
        .env("RUST_LOG", "off");
    cmd
}

#[test]
fn archives_into_fake_server_from_env() {
    let dir = CanonicalTempDir::new().unwrap();
    let foo = dir.write_file("foo", b"foo").unwrap();

    let output = isolate()
        .current_dir(dir.path())
        .env("ISOLATE_SERVER", "fake")
        .args(["archive", "--quiet"])
        .arg(&foo)
        .output()
        .unwrap();

    assert!(output.status.success(), "{output:?}");
    assert_eq!(
        String::from_utf8(output.stdout).unwrap(),
        format!("0beec7b5ea3f0fdbc95d0dd47f3c5bc275da8a33  {}\n", foo.display())
    );
}

#[test]
fn archives_into_directory_and_reports_totals() {
    let dir = CanonicalTempDir::new().unwrap();
    let foo = dir.write_file("foo", b"foo").unwrap();
    let store = dir.path().join("cas");

    let output = isolate()
        .current_dir(dir.path())
        .args(["archive", "-I"])
        .arg(&store)
        .arg(&foo)
        .output()
        .unwrap();

    assert!(output.status.success(), "{output:?}");
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("Misses  :     1 (3b)"), "{stderr}");
    assert!(
        store
            .join("default-gzip/0b/0beec7b5ea3f0fdbc95d0dd47f3c5bc275da8a33")
            .exists()
    );
}

#[test]
fn missing_server_is_a_usage_error() {
    let dir = CanonicalTempDir::new().unwrap();
    let output = isolate()
        .current_dir(dir.path())
        .args(["archive", "foo"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(
        String::from_utf8(output.stderr).unwrap(),
        "isolate: server must be specified\n"
    );
}

#[test]
fn config_file_supplies_server() {
    let dir = CanonicalTempDir::new().unwrap();
    let foo = dir.write_file("foo", b"foo").unwrap();
    dir.write_file("isolate.toml", "server = \"fake\"\nquiet = true\n")
        .unwrap();

    let output = isolate()
        .current_dir(dir.path())
        .args(["archive"])
        .arg(&foo)
        .output()
        .unwrap();

    assert!(output.status.success(), "{output:?}");
    assert!(output.stderr.is_empty());
}

#[test]
fn failed_file_sets_exit_code() {
    let dir = CanonicalTempDir::new().unwrap();
    let output = isolate()
        .current_dir(dir.path())
        .env("ISOLATE_SERVER", "fake")
        .args(["archive", "-q", "missing"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.starts_with("missing  hash(missing) failed: open missing: "));
    assert_eq!(
        String::from_utf8(output.stderr).unwrap(),
        "isolate: 1 of 1 files failed\n"
    );
}
