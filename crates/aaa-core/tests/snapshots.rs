//! Snapshot workflow across successive runs sharing one snapshot folder.

use aaa_core::testing::RecordingFormatter;
use aaa_core::{Root, SnapshotMode, SnapshotStore, Stages, TestError, TestOptions};
use serde_json::{Value, json};
use std::path::Path;
use tempfile::TempDir;
use tokio::task::LocalSet;

fn options(folder: &Path) -> TestOptions {
    TestOptions {
        snapshots_folder: folder.to_path_buf(),
        ..TestOptions::default()
    }
}

/// Runs one root with a single SNAPSHOT test producing `value`.
async fn run_once(options: TestOptions, value: Value) -> Result<(), TestError> {
    LocalSet::new()
        .run_until(async move {
            let root = Root::new(options);
            root.set_formatter(Box::new(RecordingFormatter::new()));
            let result = root
                .test(
                    "payload",
                    Stages::new().snapshot(move |_, _| async move { Ok(value) }),
                )
                .await;
            root.end().await.unwrap();
            result
        })
        .await
}

fn stored(folder: &Path, chain: &[&str]) -> Value {
    let chain: Vec<String> = chain.iter().map(|s| s.to_string()).collect();
    let path = SnapshotStore::new(folder, SnapshotMode::Record).path_for(&chain);
    let content = std::fs::read_to_string(path).unwrap();
    serde_json::from_str(&content).unwrap()
}

#[tokio::test]
async fn test_snapshot_lifecycle_across_runs() {
    let dir = TempDir::new().unwrap();
    let folder = dir.path();

    // First run records the value and asks for confirmation
    let err = run_once(options(folder), json!({"asd": 1})).await.unwrap_err();
    assert!(err.to_string().starts_with("Confirm snapshot:"), "{err}");
    assert_eq!(
        stored(folder, &["payload"]),
        json!({"validated": false, "data": {"asd": 1}})
    );

    // Confirming the same value validates it
    let confirm = TestOptions {
        confirm_snapshots: true,
        ..options(folder)
    };
    run_once(confirm, json!({"asd": 1})).await.unwrap();
    assert_eq!(stored(folder, &["payload"])["validated"], json!(true));

    // A validated value keeps passing without confirmation
    run_once(options(folder), json!({"asd": 1})).await.unwrap();

    // A changed value fails with a diff mentioning both values
    let err = run_once(options(folder), json!({"asd": 2})).await.unwrap_err();
    assert!(matches!(err, TestError::SnapshotMismatch { .. }), "{err}");
    let text = err.to_string();
    assert!(text.contains("\"asd\": 1"), "{text}");
    assert!(text.contains("\"asd\": 2"), "{text}");
    assert_eq!(
        stored(folder, &["payload"]),
        json!({"validated": false, "data": {"asd": 2}})
    );
}

#[tokio::test]
async fn test_review_fails_and_leaves_files_untouched() {
    let dir = TempDir::new().unwrap();
    let folder = dir.path();
    let _ = run_once(options(folder), json!([1, 2, 3])).await;
    let before = stored(folder, &["payload"]);

    let review = TestOptions {
        review_snapshots: true,
        ..options(folder)
    };
    let err = run_once(review, json!([4])).await.unwrap_err();
    assert!(err.to_string().starts_with("Review snapshot:"), "{err}");
    assert_eq!(stored(folder, &["payload"]), before);
}

#[tokio::test]
async fn test_confirm_without_recorded_snapshot_fails() {
    let dir = TempDir::new().unwrap();
    let confirm = TestOptions {
        confirm_snapshots: true,
        ..options(dir.path())
    };
    let err = run_once(confirm, json!("first")).await.unwrap_err();
    assert!(matches!(err, TestError::SnapshotMissing { .. }), "{err}");
}

#[tokio::test]
async fn test_regenerate_rewrites_validated_snapshots() {
    let dir = TempDir::new().unwrap();
    let folder = dir.path();
    let confirm = TestOptions {
        confirm_snapshots: true,
        ..options(folder)
    };
    let _ = run_once(options(folder), json!(1)).await;
    run_once(confirm.clone(), json!(1)).await.unwrap();

    let regenerate = TestOptions {
        regenerate_snapshots: true,
        ..options(folder)
    };
    let err = run_once(regenerate, json!(1)).await.unwrap_err();
    assert!(matches!(err, TestError::SnapshotConfirmRequired { .. }), "{err}");
    assert_eq!(stored(folder, &["payload"])["validated"], json!(false));

    run_once(confirm, json!(1)).await.unwrap();
}

#[tokio::test]
async fn test_named_snapshots_are_stored_under_the_test() {
    let dir = TempDir::new().unwrap();
    let folder = dir.path().to_path_buf();

    let run = |options: TestOptions| async move {
        LocalSet::new()
            .run_until(async move {
                let root = Root::new(options);
                root.set_formatter(Box::new(RecordingFormatter::new()));
                let result = root
                    .describe("math", |suite, _| async move {
                        let _ = suite.test(
                            "doubles",
                            Stages::new()
                                .act(|_, _| async { Ok(21_i32) })
                                .snapshots("result", |n, _, _| async move { Ok(*n * 2) })
                                .asserts("is odd", |n, _, _| async move {
                                    anyhow::ensure!(*n % 2 == 1, "{n} is even");
                                    Ok(())
                                }),
                        );
                        Ok(())
                    })
                    .await;
                root.end().await.unwrap();
                (result, root.summary())
            })
            .await
    };

    let (result, summary) = run(options(&folder)).await;
    result.unwrap();
    assert_eq!(summary.test.error, 1);
    assert_eq!(summary.assert.error, 1);
    assert_eq!(
        stored(&folder, &["math", "doubles", "result"]),
        json!({"validated": false, "data": 42})
    );

    let confirm = TestOptions {
        confirm_snapshots: true,
        ..options(&folder)
    };
    let (_, summary) = run(confirm).await;
    assert_eq!(summary.test.error, 0);
    assert_eq!(summary.assert.ok, 2);
}
