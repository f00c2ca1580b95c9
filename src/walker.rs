//! Recursive directory traversal driving a per-file operation.
//!
//! The walker lists every regular file below a root (depth-first,
//! entries sorted by name), applies optional include/exclude globs and
//! a file limit, then hands each relative path to a [`FileVisitor`]
//! one at a time together with a caller-owned accumulator.
//!
//! The walker never inspects outcomes. Only an unreadable root is an
//! error; unreadable entries below it are logged and skipped.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum TraversalError {
    #[error("cannot list {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] globset::Error),
}

/// Per-file operation invoked by [`Walker::walk`].
#[async_trait]
pub trait FileVisitor<C: Send>: Send + Sync {
    /// Process one file. `relative` is relative to the walk root.
    async fn visit(&self, relative: &Path, ctx: &mut C);
}

pub struct Walker {
    root: PathBuf,
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
    limit: Option<usize>,
}

impl Walker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            include: None,
            exclude: None,
            limit: None,
        }
    }

    /// Visit at most `limit` files.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Only visit relative paths matching one of `include` (if non-empty)
    /// and none of `exclude`.
    pub fn with_globs(
        mut self,
        include: &[String],
        exclude: &[String],
    ) -> Result<Self, TraversalError> {
        self.include = build_globset(include)?;
        self.exclude = build_globset(exclude)?;
        Ok(self)
    }

    /// Relative paths of every file the walk would visit, in visit order.
    pub fn files(&self) -> Result<Vec<PathBuf>, TraversalError> {
        std::fs::read_dir(&self.root).map_err(|source| TraversalError::Unreadable {
            path: self.root.clone(),
            source,
        })?;

        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root).sort_by_file_name();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = match entry.path().strip_prefix(&self.root) {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => continue,
            };

            if let Some(exclude) = &self.exclude {
                if exclude.is_match(&relative) {
                    continue;
                }
            }
            if let Some(include) = &self.include {
                if !include.is_match(&relative) {
                    continue;
                }
            }

            if self.limit.is_some_and(|limit| files.len() >= limit) {
                break;
            }
            files.push(relative);
        }
        Ok(files)
    }

    /// Run `visitor` over every file in order. Returns the number visited.
    pub async fn walk<C, V>(&self, visitor: &V, ctx: &mut C) -> Result<usize, TraversalError>
    where
        C: Send,
        V: FileVisitor<C> + ?Sized,
    {
        let files = self.files()?;
        tracing::debug!(root = %self.root.display(), files = files.len(), "walking");
        for relative in &files {
            visitor.visit(relative, ctx).await;
        }
        Ok(files.len())
    }
}

fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>, TraversalError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(Some(builder.build()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct Collect;

    #[async_trait]
    impl FileVisitor<Vec<PathBuf>> for Collect {
        async fn visit(&self, relative: &Path, ctx: &mut Vec<PathBuf>) {
            ctx.push(relative.to_path_buf());
        }
    }

    fn tree() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("b/nested")).unwrap();
        fs::write(tmp.path().join("c.txt"), "c").unwrap();
        fs::write(tmp.path().join("a.txt"), "a").unwrap();
        fs::write(tmp.path().join("b/nested/d.md"), "d").unwrap();
        fs::write(tmp.path().join("b/e.txt"), "e").unwrap();
        tmp
    }

    #[tokio::test]
    async fn test_visits_every_file_sorted() {
        let tmp = tree();
        let mut seen = Vec::new();
        let n = Walker::new(tmp.path())
            .walk(&Collect, &mut seen)
            .await
            .unwrap();
        assert_eq!(n, 4);
        assert_eq!(
            seen,
            vec![
                PathBuf::from("a.txt"),
                PathBuf::from("b/e.txt"),
                PathBuf::from("b/nested/d.md"),
                PathBuf::from("c.txt"),
            ]
        );
    }

    #[tokio::test]
    async fn test_limit_and_globs() {
        let tmp = tree();
        let walker = Walker::new(tmp.path())
            .with_globs(&["**/*.txt".to_string()], &["b/**".to_string()])
            .unwrap();
        assert_eq!(
            walker.files().unwrap(),
            vec![PathBuf::from("a.txt"), PathBuf::from("c.txt")]
        );

        let limited = Walker::new(tmp.path()).with_limit(Some(2));
        assert_eq!(limited.files().unwrap().len(), 2);
    }

    #[test]
    fn test_missing_root_is_traversal_error() {
        let err = Walker::new("/nonexistent/semse-root").files().unwrap_err();
        assert!(matches!(err, TraversalError::Unreadable { .. }));
    }

    #[test]
    fn test_empty_root_yields_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(Walker::new(tmp.path()).files().unwrap().is_empty());
    }
}
