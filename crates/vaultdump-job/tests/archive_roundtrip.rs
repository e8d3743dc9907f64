//! Archiving with the system tar and reading the result back.

#![cfg(unix)]

mod common;

use std::fs;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use common::{read_archive, write_script};
use vaultdump_job::{ArchiveError, Archiver, archive_path};

#[tokio::test]
async fn archive_preserves_directory_name_and_contents() {
    let root = tempfile::tempdir().unwrap();
    let source = root.path().join("030405");
    fs::create_dir_all(source.join("admin/nested")).unwrap();
    fs::write(source.join("a.txt"), b"hello").unwrap();
    fs::write(source.join("admin/system.bson"), [0u8, 1, 2, 255]).unwrap();
    fs::write(source.join("admin/nested/empty.json"), b"").unwrap();

    let archive = Archiver::new("tar")
        .archive(&source, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(archive, root.path().join("030405.tar.gz"));
    assert_eq!(archive, archive_path(&source));
    assert!(archive.is_file());

    assert_eq!(
        read_archive(&archive),
        vec![
            ("030405/a.txt".to_string(), b"hello".to_vec()),
            ("030405/admin/nested/empty.json".to_string(), Vec::new()),
            ("030405/admin/system.bson".to_string(), vec![0u8, 1, 2, 255]),
        ]
    );

    // The source is left alone; removing it is the caller's job.
    assert!(source.join("a.txt").is_file());
}

#[tokio::test]
async fn failing_tool_leaves_no_partial_archive() {
    let tools = tempfile::tempdir().unwrap();
    // Writes garbage to the -f target, then fails.
    let tool = write_script(tools.path(), "bad-tar", r#"echo partial > "$2"; echo "disk full" >&2; exit 2"#);

    let root = tempfile::tempdir().unwrap();
    let source = root.path().join("030405");
    fs::create_dir_all(&source).unwrap();
    fs::write(source.join("a.txt"), b"hello").unwrap();

    let err = Archiver::new(tool.to_string_lossy())
        .archive(&source, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        ArchiveError::Failed { output, .. } => assert!(output.contains("disk full")),
        other => panic!("expected Failed, got {other:?}"),
    }
    assert!(!archive_path(&source).exists());
    assert!(source.is_dir());
}

#[tokio::test]
async fn cancellation_kills_the_tool() {
    let tools = tempfile::tempdir().unwrap();
    let tool = write_script(tools.path(), "slow-tar", r#"echo partial > "$2"; sleep 30"#);

    let root = tempfile::tempdir().unwrap();
    let source = root.path().join("030405");
    fs::create_dir_all(&source).unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = Archiver::new(tool.to_string_lossy())
        .archive(&source, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, ArchiveError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!archive_path(&source).exists());
}

#[tokio::test]
async fn tool_that_writes_nothing_is_reported() {
    let tools = tempfile::tempdir().unwrap();
    let tool = write_script(tools.path(), "lazy-tar", "exit 0");

    let root = tempfile::tempdir().unwrap();
    let source = root.path().join("030405");
    fs::create_dir_all(&source).unwrap();

    let err = Archiver::new(tool.to_string_lossy())
        .archive(&source, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ArchiveError::Missing { .. }));
}
