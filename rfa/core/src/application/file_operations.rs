// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! File Operations
//!
//! User-level file API backing the interactive shell. Reads go through the
//! coherence protocol; writes write through; metadata calls pass straight to
//! the server.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::application::cache_handler::{CacheHandler, CoherenceError, WriteOp};
use crate::domain::path_sanitizer::{PathSanitizer, PathSanitizerError};
use crate::infrastructure::rpc::{RemoteAttributes, RpcError};

#[derive(Debug, Error)]
pub enum FileOperationError {
    #[error("Invalid path: {0}")]
    InvalidPath(#[from] PathSanitizerError),

    #[error("Offset {offset} out of range for {path} ({len} bytes)")]
    OffsetOutOfRange {
        path: String,
        offset: usize,
        len: usize,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Coherence(#[from] CoherenceError),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

pub struct FileOperations {
    handler: Arc<CacheHandler>,
    sanitizer: PathSanitizer,
}

impl FileOperations {
    pub fn new(handler: Arc<CacheHandler>) -> Self {
        Self {
            handler,
            sanitizer: PathSanitizer::new(),
        }
    }

    pub fn handler(&self) -> &Arc<CacheHandler> {
        &self.handler
    }

    /// Collapse `.`/`..` so equivalent spellings share a cache entry
    pub fn normalize(&self, path: &str) -> Result<String, FileOperationError> {
        Ok(self.sanitizer.normalize(path)?)
    }

    /// Up to `count` bytes starting at `offset`
    ///
    /// A count running past end of file yields the available tail.
    pub async fn read(
        &self,
        path: &str,
        offset: usize,
        count: usize,
    ) -> Result<Vec<u8>, FileOperationError> {
        let path = self.normalize(path)?;
        let content = self.handler.get_file(&path).await?;

        if offset >= content.len() {
            return Err(FileOperationError::OffsetOutOfRange {
                path,
                offset,
                len: content.len(),
            });
        }

        let available = content.len() - offset;
        if count > available {
            warn!(
                path = %path,
                offset,
                count,
                available,
                "Count out of range, returning available bytes"
            );
        }
        let end = offset + count.min(available);
        Ok(content[offset..end].to_vec())
    }

    pub async fn insert(
        &self,
        path: &str,
        offset: usize,
        data: Vec<u8>,
    ) -> Result<i64, FileOperationError> {
        let path = self.normalize(path)?;
        let offset = i32::try_from(offset).map_err(|_| {
            FileOperationError::InvalidArgument(format!("Offset {} does not fit the wire format", offset))
        })?;
        Ok(self
            .handler
            .write_through(&path, WriteOp::Insert { offset }, data)
            .await?)
    }

    pub async fn append(&self, path: &str, data: Vec<u8>) -> Result<i64, FileOperationError> {
        let path = self.normalize(path)?;
        Ok(self.handler.write_through(&path, WriteOp::Append, data).await?)
    }

    pub async fn touch(&self, path: &str) -> Result<i64, FileOperationError> {
        let path = self.normalize(path)?;
        Ok(self.handler.remote().touch(&path).await?)
    }

    pub async fn list_dir(&self, path: &str) -> Result<Vec<String>, FileOperationError> {
        let path = self.normalize(path)?;
        Ok(self.handler.remote().list_dir(&path).await?)
    }

    pub async fn get_attr(&self, path: &str) -> Result<RemoteAttributes, FileOperationError> {
        let path = self.normalize(path)?;
        Ok(self.handler.remote().get_attr(&path).await?)
    }

    /// Receive server pushes for `path` during `interval`
    pub async fn register(&self, path: &str, interval: Duration) -> Result<(), FileOperationError> {
        let path = self.normalize(path)?;
        let secs = i32::try_from(interval.as_secs())
            .ok()
            .filter(|s| *s > 0)
            .ok_or_else(|| {
                FileOperationError::InvalidArgument(format!(
                    "Registration interval must be between 1 and {} seconds",
                    i32::MAX
                ))
            })?;
        self.handler.remote().register(&path, secs).await?;
        info!(path = %path, interval_secs = secs, "Registered for updates");
        Ok(())
    }
}
