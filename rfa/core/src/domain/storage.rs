// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! File Store Trait - Anti-Corruption Layer for server-side storage
//!
//! Abstracts the filesystem the server exports so request handling can be
//! tested against mocks and run against other backends.

use async_trait::async_trait;
use thiserror::Error;

/// File type for attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
}

/// File metadata returned by every operation that touches a file
///
/// Timestamps are milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttributes {
    pub file_type: FileType,
    pub size: u64,
    pub mtime: i64,
    pub atime: i64,
}

/// Server-side file storage
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Read a whole file
    ///
    /// # Returns
    /// * `Ok((content, attrs))` - File content and its attributes after the read
    /// * `Err(StorageError::NotFound)` if the path does not exist
    async fn read(&self, path: &str) -> Result<(Vec<u8>, FileAttributes), StorageError>;

    /// Insert `data` at byte `offset`, shifting the existing tail right
    ///
    /// Fails with `InvalidArgument` when `offset` is past end of file or the
    /// target is a directory.
    async fn insert(&self, path: &str, offset: u64, data: &[u8])
        -> Result<FileAttributes, StorageError>;

    /// Append `data` to the end of a file
    async fn append(&self, path: &str, data: &[u8]) -> Result<FileAttributes, StorageError>;

    /// Get file attributes (stat)
    async fn stat(&self, path: &str) -> Result<FileAttributes, StorageError>;

    /// List directory entries, directories suffixed with `/`, sorted by name
    async fn list_dir(&self, path: &str) -> Result<Vec<String>, StorageError>;

    /// Create the file if missing, otherwise set its access time to now
    ///
    /// # Returns
    /// * `Ok(atime)` - The new access time
    async fn touch(&self, path: &str) -> Result<i64, StorageError>;
}

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError(err.to_string())
    }
}

impl From<crate::domain::path_sanitizer::PathSanitizerError> for StorageError {
    fn from(err: crate::domain::path_sanitizer::PathSanitizerError) -> Self {
        StorageError::InvalidPath(err.to_string())
    }
}
