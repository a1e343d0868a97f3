//! In-process suite runs.

use aaa_core::testing::{RecordingFormatter, SharedBuffer};
use aaa_core::{FileFilter, FileSource, OrderedReporter, RunError, Stages, SuiteConfig, TestSuite};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::task::LocalSet;

/// Serves a fixed list of paths instead of walking a folder.
struct FixedFiles(Vec<PathBuf>);

#[async_trait(?Send)]
impl FileSource for FixedFiles {
    async fn get_files(&self, _folder: &Path, filter: &FileFilter) -> Result<Vec<PathBuf>, RunError> {
        Ok(self.0.iter().filter(|p| filter.accepts(p)).cloned().collect())
    }
}

fn in_process(files: &[&str]) -> TestSuite {
    let config = SuiteConfig {
        parallel: 0,
        ..SuiteConfig::default()
    };
    TestSuite::new(config)
        .unwrap()
        .with_source(Box::new(FixedFiles(files.iter().map(PathBuf::from).collect())))
}

fn register_math(suite: &mut TestSuite) {
    suite.register_file("math.test", |suite| {
        let _ = suite.describe("math", |suite, _| async move {
            let _ = suite.test(
                "adds",
                Stages::new()
                    .arrange(|_| async { Ok((2_i32, 3_i32)) })
                    .act(|pair, _| async move { Ok(pair.0 + pair.1) })
                    .assert(|sum, _, _| async move {
                        assert_eq!(*sum, 5);
                        Ok(())
                    }),
            );
            Ok(())
        });
    });
}

#[tokio::test]
async fn test_registered_entries_run_in_process() {
    let mut suite = in_process(&["math.test", "README.md"]);
    register_math(&mut suite);
    let recorder = RecordingFormatter::new();
    let suite = suite.with_formatter(Box::new(recorder.clone()));

    let result = LocalSet::new()
        .run_until(async move { suite.run().await.unwrap() })
        .await;

    assert!(result.ok, "{:?}", result.run_errors);
    assert_eq!(result.files, vec![PathBuf::from("math.test")]);
    assert_eq!(result.summary.describe.ok, 1);
    assert_eq!(result.summary.test.ok, 1);
    assert_eq!(result.summary.assert.ok, 1);
    // In-process files share the root stream.
    assert!(recorder.messages().iter().all(|(file_id, _)| file_id.is_empty()));
    assert_eq!(recorder.summaries().len(), 1);
}

#[tokio::test]
async fn test_missing_entry_is_a_run_error() {
    let mut suite = in_process(&["math.test", "other.test"]);
    register_math(&mut suite);
    let suite = suite.with_formatter(Box::new(RecordingFormatter::new()));

    let result = LocalSet::new()
        .run_until(async move { suite.run().await.unwrap() })
        .await;

    assert!(!result.ok);
    assert_eq!(
        result.run_errors,
        vec!["No in-process entry registered for other.test".to_string()]
    );
    assert_eq!(result.summary.test.ok, 1);
}

#[tokio::test]
async fn test_run_without_tests_fails() {
    let suite = in_process(&[]).with_formatter(Box::new(RecordingFormatter::new()));

    let result = LocalSet::new()
        .run_until(async move { suite.run().await.unwrap() })
        .await;

    assert!(!result.ok);
    assert_eq!(result.run_errors, vec![RunError::NoTests.to_string()]);
}

#[tokio::test]
async fn test_run_without_asserts_fails_only_when_required() {
    for require_asserts in [true, false] {
        let config = SuiteConfig {
            parallel: 0,
            require_asserts,
            ..SuiteConfig::default()
        };
        let mut suite = TestSuite::new(config)
            .unwrap()
            .with_source(Box::new(FixedFiles(vec![PathBuf::from("bare.test")])))
            .with_formatter(Box::new(RecordingFormatter::new()));
        suite.register_file("bare.test", |suite| {
            let _ = suite.test("runs", Stages::new().act(|_, _| async { Ok(()) }));
        });

        let result = LocalSet::new()
            .run_until(async move { suite.run().await.unwrap() })
            .await;

        if require_asserts {
            assert_eq!(result.run_errors, vec![RunError::NoAsserts.to_string()]);
        } else {
            assert!(result.ok, "{:?}", result.run_errors);
        }
    }
}

#[tokio::test]
async fn test_default_reporter_prints_results_and_summary() {
    let buffer = SharedBuffer::new();
    let mut suite = in_process(&["math.test"])
        .with_formatter(Box::new(OrderedReporter::new(buffer.clone(), false)));
    register_math(&mut suite);

    let result = LocalSet::new()
        .run_until(async move { suite.run().await.unwrap() })
        .await;

    assert!(result.ok, "{:?}", result.run_errors);
    let output = buffer.contents();
    assert!(output.starts_with("► math\n  √ adds\n√ math\n"), "{output}");
    assert!(output.contains("\nSummary:\n"), "{output}");
    assert!(output.contains("- Total: 3"), "{output}");
}

#[tokio::test]
async fn test_invalid_pattern_is_rejected_up_front() {
    let config = SuiteConfig {
        include: vec!["(".to_string()],
        ..SuiteConfig::default()
    };
    assert!(matches!(TestSuite::new(config), Err(RunError::Config(_))));
}
