//! File-backed snapshot store.
//!
//! Each snapshot lives at a path derived from the description chain of the
//! node that produced it, and is stored as `{"validated": bool, "data": ..}`.
//! A snapshot passes only once it has been validated, which happens on a run
//! with confirmation enabled that finds an unchanged unvalidated value.
//!
//! The path does not include the test file. Two files that register the same
//! description chain share one snapshot, and running them concurrently races
//! on it, so top-level describes should be unique across a suite.

use crate::config::TestOptions;
use crate::error::TestError;
use difference::{Changeset, Difference};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::debug;

const MAX_SEGMENT_LEN: usize = 48;

/// How the store treats candidate values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotMode {
    /// Record new values, fail until they are confirmed.
    Record,
    /// Promote matching unvalidated values to validated.
    Confirm,
    /// Fail every check without touching the files.
    Review,
    /// Overwrite every file as unvalidated.
    Regenerate,
}

impl SnapshotMode {
    /// Review wins over regenerate, which wins over confirm.
    pub fn from_options(options: &TestOptions) -> Self {
        if options.review_snapshots {
            SnapshotMode::Review
        } else if options.regenerate_snapshots {
            SnapshotMode::Regenerate
        } else if options.confirm_snapshots {
            SnapshotMode::Confirm
        } else {
            SnapshotMode::Record
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    validated: bool,
    data: Value,
}

/// Reads and writes snapshot files below one folder.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    folder: PathBuf,
    mode: SnapshotMode,
}

impl SnapshotStore {
    pub fn new(folder: impl Into<PathBuf>, mode: SnapshotMode) -> Self {
        Self {
            folder: folder.into(),
            mode,
        }
    }

    pub fn from_options(options: &TestOptions) -> Self {
        Self::new(options.snapshots_folder.clone(), SnapshotMode::from_options(options))
    }

    /// File holding the snapshot for a description chain.
    ///
    /// Every segment becomes a directory except the last, which becomes the
    /// file name together with a hash of the whole chain so that segments
    /// that sanitize to the same text do not collide.
    pub fn path_for(&self, chain: &[String]) -> PathBuf {
        let mut path = self.folder.clone();
        let Some((last, parents)) = chain.split_last() else {
            return path.join(format!("_.{}.json", chain_hash(chain)));
        };
        for segment in parents {
            path.push(sanitize(segment));
        }
        path.push(format!("{}.{}.json", sanitize(last), chain_hash(chain)));
        path
    }

    /// Checks a candidate value against the stored snapshot for `chain`.
    pub fn check(&self, chain: &[String], value: &Value) -> Result<(), TestError> {
        let path = self.path_for(chain);
        let shown = path.display().to_string();

        if self.mode == SnapshotMode::Review {
            return Err(TestError::SnapshotReviewRequired { path: shown });
        }
        if self.mode == SnapshotMode::Regenerate {
            write_file(&path, false, value)?;
            debug!(path = %shown, "Snapshot regenerated");
            return Err(TestError::SnapshotConfirmRequired { path: shown });
        }

        let confirm = self.mode == SnapshotMode::Confirm;
        match read_file(&path)? {
            None if confirm => Err(TestError::SnapshotMissing { path: shown }),
            None => {
                write_file(&path, false, value)?;
                debug!(path = %shown, "Snapshot recorded");
                Err(TestError::SnapshotConfirmRequired { path: shown })
            }
            Some(stored) if stored.data != *value => {
                let diff = render_diff(&stored.data, value);
                write_file(&path, false, value)?;
                debug!(path = %shown, was_validated = stored.validated, "Snapshot changed");
                Err(TestError::SnapshotMismatch { path: shown, diff })
            }
            Some(stored) if stored.validated => Ok(()),
            Some(_) if confirm => {
                write_file(&path, true, value)?;
                debug!(path = %shown, "Snapshot validated");
                Ok(())
            }
            Some(_) => Err(TestError::SnapshotConfirmRequired { path: shown }),
        }
    }
}

fn sanitize(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_SEGMENT_LEN)
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        cleaned.to_string()
    }
}

fn chain_hash(chain: &[String]) -> String {
    let digest = Sha256::digest(chain.join("\u{1f}").as_bytes());
    digest.iter().take(5).fold(String::new(), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

fn snapshot_error(path: &Path, message: impl ToString) -> TestError {
    TestError::Snapshot {
        path: path.display().to_string(),
        message: message.to_string(),
    }
}

fn read_file(path: &Path) -> Result<Option<SnapshotFile>, TestError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path).map_err(|e| snapshot_error(path, e))?;
    let file = serde_json::from_str(&content).map_err(|e| snapshot_error(path, e))?;
    Ok(Some(file))
}

fn write_file(path: &Path, validated: bool, data: &Value) -> Result<(), TestError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| snapshot_error(path, e))?;
    }
    let file = SnapshotFile {
        validated,
        data: data.clone(),
    };
    let content = serde_json::to_string_pretty(&file).map_err(|e| snapshot_error(path, e))?;
    std::fs::write(path, content).map_err(|e| snapshot_error(path, e))
}

/// Line diff of two values, old lines prefixed `- ` and new lines `+ `.
fn render_diff(old: &Value, new: &Value) -> String {
    let old = serde_json::to_string_pretty(old).unwrap_or_default();
    let new = serde_json::to_string_pretty(new).unwrap_or_default();
    let changeset = Changeset::new(&old, &new, "\n");

    let mut out = Vec::new();
    for diff in &changeset.diffs {
        let (prefix, text) = match diff {
            Difference::Same(text) => ("  ", text),
            Difference::Rem(text) => ("- ", text),
            Difference::Add(text) => ("+ ", text),
        };
        out.extend(text.split('\n').map(|line| format!("{prefix}{line}")));
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn chain(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| (*p).to_string()).collect()
    }

    #[test]
    fn test_path_mirrors_chain() {
        let store = SnapshotStore::new("snaps", SnapshotMode::Record);
        let path = store.path_for(&chain(&["math", "adds: 1/2"]));
        let name = path.file_name().unwrap().to_string_lossy().to_string();

        assert!(path.starts_with("snaps/math"));
        assert!(name.starts_with("adds_ 1_2."));
        assert!(name.ends_with(".json"));
        assert_eq!(name.len(), "adds_ 1_2.".len() + 10 + ".json".len());
    }

    #[test]
    fn test_same_chain_shares_a_file_across_stores() {
        let first = SnapshotStore::new("snaps", SnapshotMode::Record);
        let second = SnapshotStore::new("snaps", SnapshotMode::Confirm);
        let path = chain(&["math", "adds"]);
        assert_eq!(first.path_for(&path), second.path_for(&path));
    }

    #[test]
    fn test_similar_chains_do_not_collide() {
        let store = SnapshotStore::new("snaps", SnapshotMode::Record);
        assert_ne!(
            store.path_for(&chain(&["a/b"])),
            store.path_for(&chain(&["a?b"]))
        );
    }

    #[test]
    fn test_hostile_segments_are_sanitized() {
        assert_eq!(sanitize(".."), "_");
        assert_eq!(sanitize(""), "_");
        assert_eq!(sanitize("../etc"), ".._etc");
        assert_eq!(sanitize(&"x".repeat(100)).len(), MAX_SEGMENT_LEN);
    }

    #[test]
    fn test_confirm_without_file_is_missing() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path(), SnapshotMode::Confirm);
        let err = store.check(&chain(&["t"]), &json!(1)).unwrap_err();
        assert!(matches!(err, TestError::SnapshotMissing { .. }));
        assert!(!store.path_for(&chain(&["t"])).exists());
    }

    #[test]
    fn test_review_never_writes() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path(), SnapshotMode::Review);
        let err = store.check(&chain(&["t"]), &json!(1)).unwrap_err();
        assert!(matches!(err, TestError::SnapshotReviewRequired { .. }));
        assert!(!store.path_for(&chain(&["t"])).exists());
    }

    #[test]
    fn test_diff_marks_old_and_new_lines() {
        let diff = render_diff(&json!({"a": 1}), &json!({"a": 2}));
        assert!(diff.contains("-   \"a\": 1"));
        assert!(diff.contains("+   \"a\": 2"));
    }

    #[test]
    fn test_mode_precedence() {
        let options = TestOptions {
            confirm_snapshots: true,
            review_snapshots: true,
            ..TestOptions::default()
        };
        assert_eq!(SnapshotMode::from_options(&options), SnapshotMode::Review);
    }
}
