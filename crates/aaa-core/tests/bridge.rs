//! Process bridge tests. Test files are shell scripts run through `sh`.
#![cfg(unix)]

use aaa_core::testing::RecordingFormatter;
use aaa_core::{BridgeError, Root, SpawnOptions, SuiteConfig, TestOptions, TestSuite};
use aaa_proto::{Envelope, Message, ROOT_ID, TestKind};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::task::LocalSet;

fn passing_messages(description: &str) -> Vec<Message> {
    vec![
        Message::added(1, ROOT_ID, description, TestKind::Test),
        Message::Start { id: 1 },
        Message::added(2, 1, "", TestKind::Assert),
        Message::Start { id: 2 },
        Message::end(2, None),
        Message::end(1, None),
    ]
}

/// Writes a script that prints `messages` as envelopes, then runs `tail`.
fn write_script(dir: &Path, name: &str, messages: &[Message], tail: &str) -> PathBuf {
    let mut script = String::from("#!/bin/sh\n");
    for msg in messages {
        let line = Envelope::new(msg.clone()).encode().unwrap();
        script.push_str(&format!("echo '{line}'\n"));
    }
    script.push_str(tail);
    script.push('\n');
    let path = dir.join(name);
    std::fs::write(&path, script).unwrap();
    path
}

fn sh() -> SpawnOptions {
    SpawnOptions {
        prefix: vec!["sh".to_string()],
        test_options: TestOptions::default(),
    }
}

#[tokio::test]
async fn test_envelopes_are_forwarded_and_noise_ignored() {
    let dir = TempDir::new().unwrap();
    let path = write_script(
        dir.path(),
        "adds.test",
        &passing_messages("adds"),
        "echo 'plain output'\necho '{\"type\":\"other\"}'",
    );

    let mut received = Vec::new();
    aaa_core::spawn_test_file(&path, &sh(), |msg| received.push(msg))
        .await
        .unwrap();

    assert_eq!(received, passing_messages("adds"));
}

#[tokio::test]
async fn test_binary_output_does_not_drop_envelopes() {
    let dir = TempDir::new().unwrap();
    let mut script = String::from("#!/bin/sh\nprintf '\\377\\376 binary noise\\n'\n");
    for msg in passing_messages("adds") {
        let line = Envelope::new(msg).encode().unwrap();
        script.push_str(&format!("echo '{line}'\n"));
    }
    script.push_str("printf '\\377 on stderr\\n' >&2\nexit 4\n");
    let path = dir.path().join("binary.test");
    std::fs::write(&path, script).unwrap();

    let mut received = Vec::new();
    let err = aaa_core::spawn_test_file(&path, &sh(), |msg| received.push(msg))
        .await
        .unwrap_err();

    assert_eq!(received, passing_messages("adds"));
    let BridgeError::ExitCode { code, stdout, stderr } = err else {
        panic!("expected an exit code error");
    };
    assert_eq!(code, 4);
    assert_eq!(stdout, "\u{fffd}\u{fffd} binary noise\n");
    assert_eq!(stderr, "\u{fffd} on stderr\n");
}

#[tokio::test]
async fn test_non_zero_exit_reports_captured_output() {
    let dir = TempDir::new().unwrap();
    let path = write_script(
        dir.path(),
        "crash.test",
        &[],
        "echo \"child=$AAA_TEST_FILE\"\necho 'went wrong' >&2\nexit 3",
    );

    let err = aaa_core::spawn_test_file(&path, &sh(), |_| {})
        .await
        .unwrap_err();

    match &err {
        BridgeError::ExitCode {
            code,
            stdout,
            stderr,
        } => {
            assert_eq!(*code, 3);
            assert_eq!(stdout, "child=1\n");
            assert_eq!(stderr, "went wrong\n");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().starts_with("Test file ended with exit code: 3."));
}

#[tokio::test]
async fn test_options_reach_the_child() {
    let dir = TempDir::new().unwrap();
    let path = write_script(dir.path(), "opts.test", &[], "echo \"$AAA_TEST_OPTIONS\"\nexit 1");
    let options = SpawnOptions {
        test_options: TestOptions {
            confirm_snapshots: true,
            ..TestOptions::default()
        },
        ..sh()
    };

    let err = aaa_core::spawn_test_file(&path, &options, |_| {})
        .await
        .unwrap_err();
    let BridgeError::ExitCode { stdout, .. } = err else {
        panic!("expected an exit code error");
    };
    let sent: TestOptions = serde_json::from_str(stdout.trim()).unwrap();
    assert!(sent.confirm_snapshots);
}

#[tokio::test]
async fn test_missing_program_fails_to_spawn() {
    let dir = TempDir::new().unwrap();
    let path = write_script(dir.path(), "x.test", &[], "");
    let options = SpawnOptions {
        prefix: vec!["aaa-no-such-program".to_string()],
        ..sh()
    };

    let err = aaa_core::spawn_test_file(&path, &options, |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Spawn { .. }));
}

#[tokio::test]
async fn test_root_scopes_each_file_stream() {
    let dir = TempDir::new().unwrap();
    let first = write_script(dir.path(), "a.test", &passing_messages("a"), "");
    let second = write_script(dir.path(), "b.test", &passing_messages("b"), "exit 1");

    LocalSet::new()
        .run_until(async {
            let recorder = RecordingFormatter::new();
            let root = Root::new(TestOptions::default());
            root.set_formatter(Box::new(recorder.clone()));

            root.spawn_test_file(&first, &sh()).await.unwrap();
            assert!(root.spawn_test_file(&second, &sh()).await.is_err());
            root.end().await.unwrap();

            let first_id = first.display().to_string();
            let second_id = second.display().to_string();
            let mut expected = vec![Message::FileStart];
            expected.extend(passing_messages("a"));
            expected.push(Message::FileEnd);
            assert_eq!(recorder.messages_for(&first_id), expected);
            // The failed file still closes its scope.
            assert_eq!(
                recorder.messages_for(&second_id).last(),
                Some(&Message::FileEnd)
            );

            // Both files use id 1 without colliding.
            let summary = root.summary();
            assert_eq!(summary.test.count, 2);
            assert_eq!(summary.test.ok, 2);
        })
        .await;
}

#[tokio::test]
async fn test_suite_runs_discovered_files_in_parallel() {
    let dir = TempDir::new().unwrap();
    write_script(dir.path(), "a.test", &passing_messages("a"), "");
    write_script(dir.path(), "b.test", &passing_messages("b"), "");
    write_script(dir.path(), "notes.txt", &[], "exit 1");

    let config = SuiteConfig {
        parallel: 2,
        folder: dir.path().to_path_buf(),
        prefix: vec!["sh".to_string()],
        ..SuiteConfig::default()
    };

    let result = LocalSet::new()
        .run_until(async move {
            TestSuite::new(config)
                .unwrap()
                .with_formatter(Box::new(RecordingFormatter::new()))
                .run()
                .await
                .unwrap()
        })
        .await;

    assert!(result.ok, "{:?}", result.run_errors);
    assert_eq!(
        result.files,
        vec![dir.path().join("a.test"), dir.path().join("b.test")]
    );
    assert_eq!(result.summary.test.count, 2);
    assert_eq!(result.summary.assert.ok, 2);
}

#[tokio::test]
async fn test_suite_collects_crashed_files() {
    let dir = TempDir::new().unwrap();
    write_script(dir.path(), "a.test", &passing_messages("a"), "");
    write_script(dir.path(), "crash.test", &[], "echo 'segfault' >&2\nexit 2");

    let config = SuiteConfig {
        parallel: 1,
        folder: dir.path().to_path_buf(),
        prefix: vec!["sh".to_string()],
        ..SuiteConfig::default()
    };

    let result = LocalSet::new()
        .run_until(async move {
            TestSuite::new(config)
                .unwrap()
                .with_formatter(Box::new(RecordingFormatter::new()))
                .run()
                .await
                .unwrap()
        })
        .await;

    assert!(!result.ok);
    assert_eq!(result.run_errors.len(), 1);
    assert!(result.run_errors[0].contains("exit code: 2"));
    assert!(result.run_errors[0].contains("segfault"));
    assert_eq!(result.summary.test.ok, 1);
}
