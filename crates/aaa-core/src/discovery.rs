//! Test file discovery.

use crate::error::{ConfigError, RunError};
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Compiled include/exclude patterns.
///
/// A path is tested with both `/` and `\` separators so patterns work the
/// same on every platform. Exclusions also prune whole directories.
#[derive(Debug, Clone)]
pub struct FileFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|source| ConfigError::Pattern {
                pattern: pattern.clone(),
                source,
            })
        })
        .collect()
}

fn matches_any(patterns: &[Regex], path: &Path) -> bool {
    let text = path.to_string_lossy();
    let forward = text.replace('\\', "/");
    let backward = text.replace('/', "\\");
    patterns
        .iter()
        .any(|re| re.is_match(&forward) || re.is_match(&backward))
}

impl FileFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, ConfigError> {
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        matches_any(&self.exclude, path)
    }

    /// True for a file that is included and not excluded.
    pub fn accepts(&self, path: &Path) -> bool {
        matches_any(&self.include, path) && !self.is_excluded(path)
    }
}

/// Enumerates the test files of a run.
#[async_trait(?Send)]
pub trait FileSource {
    async fn get_files(&self, folder: &Path, filter: &FileFilter) -> Result<Vec<PathBuf>, RunError>;
}

/// Recursive walk of the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectorySource;

impl DirectorySource {
    fn walk(dir: &Path, filter: &FileFilter, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
        let mut entries = std::fs::read_dir(dir)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .collect::<Vec<_>>();
        entries.sort();
        for path in entries {
            if filter.is_excluded(&path) {
                continue;
            }
            if path.is_dir() {
                if let Err(e) = Self::walk(&path, filter, files) {
                    debug!(path = %path.display(), error = %e, "Skipping unreadable directory");
                }
            } else if filter.accepts(&path) {
                files.push(path);
            }
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl FileSource for DirectorySource {
    async fn get_files(&self, folder: &Path, filter: &FileFilter) -> Result<Vec<PathBuf>, RunError> {
        let mut files = Vec::new();
        Self::walk(folder, filter, &mut files).map_err(|source| RunError::Discovery {
            folder: folder.display().to_string(),
            source,
        })?;
        debug!(folder = %folder.display(), count = files.len(), "Discovered test files");
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|p| (*p).to_string()).collect()
    }

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("subfolder")).unwrap();
        for file in [
            "index.txt",
            "file1.mytest-ok",
            "file1.mytest-invalid",
            "subfolder/file2.mytest-ok",
        ] {
            fs::write(dir.path().join(file), "").unwrap();
        }
        dir
    }

    fn names(dir: &TempDir, files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|f| {
                f.strip_prefix(dir.path())
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }

    #[tokio::test]
    async fn test_includes_matching_files_recursively() {
        let dir = fixture();
        let filter = FileFilter::new(&patterns(&[r"\.mytest"]), &[]).unwrap();
        let files = DirectorySource.get_files(dir.path(), &filter).await.unwrap();
        assert_eq!(
            names(&dir, &files),
            vec!["file1.mytest-invalid", "file1.mytest-ok", "subfolder/file2.mytest-ok"]
        );
    }

    #[tokio::test]
    async fn test_exclusion_prunes_directories() {
        let dir = fixture();
        let filter = FileFilter::new(&patterns(&[r"\.mytest"]), &patterns(&["subfolder"])).unwrap();
        let files = DirectorySource.get_files(dir.path(), &filter).await.unwrap();
        assert_eq!(
            names(&dir, &files),
            vec!["file1.mytest-invalid", "file1.mytest-ok"]
        );
    }

    #[tokio::test]
    async fn test_missing_folder_is_a_discovery_error() {
        let dir = TempDir::new().unwrap();
        let filter = FileFilter::new(&patterns(&[".*"]), &[]).unwrap();
        let err = DirectorySource
            .get_files(&dir.path().join("nope"), &filter)
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Discovery { .. }));
    }

    #[test]
    fn test_bad_pattern_is_reported() {
        let err = FileFilter::new(&patterns(&["("]), &[]).unwrap_err();
        assert!(matches!(err, ConfigError::Pattern { .. }));
    }
}
