// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Path Sanitizer Domain Service
//!
//! Turns a path received off the wire into a location under the exported
//! root. Path validation is a domain rule, not a storage detail: the client
//! uses the same normalization before keying its cache.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Traversal prevention and path normalization

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Path sanitization errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathSanitizerError {
    #[error("Path traversal attempt detected: {0}")]
    PathTraversal(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Path too long: {0}")]
    PathTooLong(String),
}

/// Path sanitizer domain service
///
/// # Security Guarantees
/// - Rejects paths containing `..` components
/// - Rejects embedded NUL bytes
/// - Re-roots absolute paths under the export root
#[derive(Debug, Clone)]
pub struct PathSanitizer {
    /// Maximum allowed path length (default: 1024)
    max_path_len: usize,
}

impl PathSanitizer {
    pub fn new() -> Self {
        Self { max_path_len: 1024 }
    }

    pub fn with_max_length(max_path_len: usize) -> Self {
        Self { max_path_len }
    }

    /// Resolve a wire path against `root`
    ///
    /// # Examples
    /// ```
    /// use rfa_core::domain::path_sanitizer::PathSanitizer;
    /// use std::path::{Path, PathBuf};
    ///
    /// let sanitizer = PathSanitizer::new();
    /// let safe = sanitizer.resolve("/docs/./a.txt", Path::new("/srv/rfa")).unwrap();
    /// assert_eq!(safe, PathBuf::from("/srv/rfa/docs/a.txt"));
    ///
    /// assert!(sanitizer.resolve("../etc/passwd", Path::new("/srv/rfa")).is_err());
    /// ```
    pub fn resolve(&self, path: &str, root: &Path) -> Result<PathBuf, PathSanitizerError> {
        Ok(root.join(self.relative(path)?))
    }

    /// Strip root, `.` and duplicate separators, leaving a root-relative path
    ///
    /// The empty path and `/` both name the root itself.
    pub fn relative(&self, path: &str) -> Result<PathBuf, PathSanitizerError> {
        if path.len() > self.max_path_len {
            return Err(PathSanitizerError::PathTooLong(path.to_string()));
        }
        if path.contains('\0') {
            tracing::warn!(path = %path, "Path contains null byte");
            return Err(PathSanitizerError::InvalidPath(
                "Path contains null byte".to_string(),
            ));
        }

        let mut normalized = PathBuf::new();
        for component in Path::new(path).components() {
            match component {
                Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
                Component::Normal(part) => normalized.push(part),
                Component::ParentDir => {
                    tracing::warn!(
                        path = %path,
                        "Path traversal attempt detected: contains '..' component"
                    );
                    return Err(PathSanitizerError::PathTraversal(path.to_string()));
                }
            }
        }
        Ok(normalized)
    }

    /// Lexically collapse `.` and `..` for client-side use
    ///
    /// Unlike [`relative`](Self::relative), `..` is resolved rather than
    /// rejected; climbing above the root clamps at the root. Used so that
    /// `./a/../b` and `b` share one cache entry.
    pub fn normalize(&self, path: &str) -> Result<String, PathSanitizerError> {
        if path.len() > self.max_path_len {
            return Err(PathSanitizerError::PathTooLong(path.to_string()));
        }
        let mut parts: Vec<&str> = Vec::new();
        for part in path.split('/') {
            match part {
                "" | "." => {}
                ".." => {
                    parts.pop();
                }
                other => parts.push(other),
            }
        }
        Ok(parts.join("/"))
    }
}

impl Default for PathSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_path() {
        let sanitizer = PathSanitizer::new();
        let result = sanitizer.resolve("dir/file.txt", Path::new("/srv"));
        assert_eq!(result.unwrap(), PathBuf::from("/srv/dir/file.txt"));
    }

    #[test]
    fn test_absolute_path_is_rerooted() {
        let sanitizer = PathSanitizer::new();
        let result = sanitizer.resolve("/etc/passwd", Path::new("/srv"));
        assert_eq!(result.unwrap(), PathBuf::from("/srv/etc/passwd"));
    }

    #[test]
    fn test_reject_parent_dir() {
        let sanitizer = PathSanitizer::new();
        let result = sanitizer.resolve("a/../../etc/passwd", Path::new("/srv"));
        assert!(matches!(result.unwrap_err(), PathSanitizerError::PathTraversal(_)));
    }

    #[test]
    fn test_normalize_current_dir() {
        let sanitizer = PathSanitizer::new();
        let result = sanitizer.relative("./subdir/./file.txt");
        assert_eq!(result.unwrap(), PathBuf::from("subdir/file.txt"));
    }

    #[test]
    fn test_empty_path_is_root() {
        let sanitizer = PathSanitizer::new();
        assert_eq!(sanitizer.relative("").unwrap(), PathBuf::new());
        assert_eq!(sanitizer.relative("/").unwrap(), PathBuf::new());
    }

    #[test]
    fn test_path_too_long() {
        let sanitizer = PathSanitizer::with_max_length(10);
        let result = sanitizer.relative("/very/long/path/that/exceeds/limit");
        assert!(matches!(result.unwrap_err(), PathSanitizerError::PathTooLong(_)));
    }

    #[test]
    fn test_null_byte_rejected() {
        let sanitizer = PathSanitizer::new();
        assert!(matches!(
            sanitizer.relative("a\0b"),
            Err(PathSanitizerError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_client_normalize_collapses_parent() {
        let sanitizer = PathSanitizer::new();
        assert_eq!(sanitizer.normalize("./a/../b").unwrap(), "b");
        assert_eq!(sanitizer.normalize("/x//y/").unwrap(), "x/y");
        assert_eq!(sanitizer.normalize("../../z").unwrap(), "z");
    }
}
