// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Local Filesystem File Store
//!
//! Exports a single directory on the server host. Every wire path is resolved
//! under that root by the [`PathSanitizer`] before any filesystem call.
//!
//! **Limitations:**
//! - Whole-file reads; content larger than one datagram fails at encode time
//! - Insert rewrites the whole file
//! - No locking between concurrent writers (the server loop is serial)

use async_trait::async_trait;
use std::fs::{self, File, FileTimes, Metadata, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::domain::path_sanitizer::PathSanitizer;
use crate::domain::storage::{FileAttributes, FileStore, FileType, StorageError};

/// Local filesystem file store
pub struct LocalFileStore {
    /// Exported directory (e.g., "/srv/rfa")
    root: PathBuf,
    sanitizer: PathSanitizer,
}

impl LocalFileStore {
    /// Create a store rooted at `root`, creating the directory if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();

        fs::create_dir_all(&root).map_err(|e| {
            StorageError::IoError(format!(
                "Failed to create root directory {}: {}",
                root.display(),
                e
            ))
        })?;

        Ok(Self {
            root,
            sanitizer: PathSanitizer::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve_path(&self, path: &str) -> Result<PathBuf, StorageError> {
        Ok(self.sanitizer.resolve(path, &self.root)?)
    }

    /// Resolve and require an existing regular file
    fn resolve_file(&self, path: &str) -> Result<PathBuf, StorageError> {
        let fs_path = self.resolve_path(path)?;
        let metadata = fs::metadata(&fs_path).map_err(|e| map_io(path, e))?;
        if metadata.is_dir() {
            return Err(StorageError::InvalidArgument(format!(
                "{} is a directory",
                path
            )));
        }
        Ok(fs_path)
    }

    fn attributes(&self, path: &str, fs_path: &Path) -> Result<FileAttributes, StorageError> {
        let metadata = fs::metadata(fs_path).map_err(|e| map_io(path, e))?;
        Ok(attributes_from(&metadata))
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn read(&self, path: &str) -> Result<(Vec<u8>, FileAttributes), StorageError> {
        let fs_path = self.resolve_file(path)?;
        let content = fs::read(&fs_path).map_err(|e| map_io(path, e))?;
        let attrs = self.attributes(path, &fs_path)?;
        Ok((content, attrs))
    }

    async fn insert(
        &self,
        path: &str,
        offset: u64,
        data: &[u8],
    ) -> Result<FileAttributes, StorageError> {
        let fs_path = self.resolve_file(path)?;
        let mut content = fs::read(&fs_path).map_err(|e| map_io(path, e))?;

        let len = content.len() as u64;
        if offset > len {
            return Err(StorageError::InvalidArgument(format!(
                "Offset {} is past end of {} ({} bytes)",
                offset, path, len
            )));
        }

        let at = offset as usize;
        content.splice(at..at, data.iter().copied());
        fs::write(&fs_path, &content).map_err(|e| map_io(path, e))?;

        self.attributes(path, &fs_path)
    }

    async fn append(&self, path: &str, data: &[u8]) -> Result<FileAttributes, StorageError> {
        let fs_path = self.resolve_file(path)?;
        let mut file = OpenOptions::new()
            .append(true)
            .open(&fs_path)
            .map_err(|e| map_io(path, e))?;
        file.write_all(data).map_err(|e| map_io(path, e))?;
        drop(file);

        self.attributes(path, &fs_path)
    }

    async fn stat(&self, path: &str) -> Result<FileAttributes, StorageError> {
        let fs_path = self.resolve_path(path)?;
        self.attributes(path, &fs_path)
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<String>, StorageError> {
        let fs_path = self.resolve_path(path)?;
        let metadata = fs::metadata(&fs_path).map_err(|e| map_io(path, e))?;
        if !metadata.is_dir() {
            return Err(StorageError::InvalidArgument(format!(
                "{} is not a directory",
                path
            )));
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&fs_path).map_err(|e| map_io(path, e))? {
            let entry = entry.map_err(|e| map_io(path, e))?;
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                name.push('/');
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    async fn touch(&self, path: &str) -> Result<i64, StorageError> {
        let fs_path = self.resolve_path(path)?;

        match fs::metadata(&fs_path) {
            Ok(metadata) if metadata.is_dir() => {
                let now = SystemTime::now();
                File::open(&fs_path)
                    .and_then(|dir| dir.set_times(FileTimes::new().set_accessed(now)))
                    .map_err(|e| map_io(path, e))?;
            }
            Ok(_) => {
                let file = OpenOptions::new()
                    .write(true)
                    .open(&fs_path)
                    .map_err(|e| map_io(path, e))?;
                file.set_times(FileTimes::new().set_accessed(SystemTime::now()))
                    .map_err(|e| map_io(path, e))?;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                File::create(&fs_path).map_err(|e| map_io(path, e))?;
            }
            Err(e) => return Err(map_io(path, e)),
        }

        Ok(self.attributes(path, &fs_path)?.atime)
    }
}

fn map_io(path: &str, err: std::io::Error) -> StorageError {
    match err.kind() {
        ErrorKind::NotFound => StorageError::NotFound(path.to_string()),
        ErrorKind::PermissionDenied => StorageError::PermissionDenied(path.to_string()),
        _ => StorageError::IoError(format!("{}: {}", path, err)),
    }
}

fn attributes_from(metadata: &Metadata) -> FileAttributes {
    let file_type = if metadata.is_dir() {
        FileType::Directory
    } else {
        FileType::File
    };
    FileAttributes {
        file_type,
        size: metadata.len(),
        mtime: metadata.modified().map(epoch_millis).unwrap_or(0),
        atime: metadata.accessed().map(epoch_millis).unwrap_or(0),
    }
}

/// Milliseconds since the Unix epoch; pre-epoch times are negative
pub fn epoch_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_millis() as i64,
        Err(before) => -(before.duration().as_millis() as i64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, LocalFileStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalFileStore::new(temp_dir.path()).unwrap();
        (temp_dir, store)
    }

    #[tokio::test]
    async fn test_read_returns_content_and_mtime() {
        let (dir, store) = store();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();

        let (content, attrs) = store.read("a.txt").await.unwrap();
        assert_eq!(content, b"hello");
        assert_eq!(attrs.size, 5);
        assert!(attrs.mtime > 0);
    }

    #[tokio::test]
    async fn test_insert_shifts_tail() {
        let (dir, store) = store();
        fs::write(dir.path().join("a.txt"), b"held").unwrap();

        store.insert("a.txt", 3, b"lo wor").await.unwrap();
        assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"hello word");

        store.insert("a.txt", 10, b"!").await.unwrap();
        assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"hello word!");
    }

    #[tokio::test]
    async fn test_insert_past_end_is_invalid() {
        let (dir, store) = store();
        fs::write(dir.path().join("a.txt"), b"abc").unwrap();

        let result = store.insert("a.txt", 4, b"x").await;
        assert!(matches!(result, Err(StorageError::InvalidArgument(_))));
        assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_append_and_missing_file() {
        let (dir, store) = store();
        fs::write(dir.path().join("log"), b"a").unwrap();

        store.append("log", b"bc").await.unwrap();
        assert_eq!(fs::read(dir.path().join("log")).unwrap(), b"abc");

        assert!(matches!(
            store.append("nope", b"x").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_dir_marks_directories_and_sorts() {
        let (dir, store) = store();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("b.txt"), b"").unwrap();
        fs::write(dir.path().join("a.txt"), b"").unwrap();

        let names = store.list_dir("").await.unwrap();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub/"]);

        assert!(matches!(
            store.list_dir("a.txt").await,
            Err(StorageError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_touch_creates_missing_file() {
        let (dir, store) = store();
        let atime = store.touch("new.txt").await.unwrap();
        assert!(dir.path().join("new.txt").exists());
        assert!(atime > 0);
    }

    #[tokio::test]
    async fn test_touch_updates_access_time() {
        let (dir, store) = store();
        let file_path = dir.path().join("old.txt");
        fs::write(&file_path, b"x").unwrap();
        let past = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_000_000);
        OpenOptions::new()
            .write(true)
            .open(&file_path)
            .unwrap()
            .set_times(FileTimes::new().set_accessed(past))
            .unwrap();

        let atime = store.touch("old.txt").await.unwrap();
        assert!(atime > epoch_millis(past));
    }

    #[tokio::test]
    async fn test_traversal_is_rejected() {
        let (_dir, store) = store();
        assert!(matches!(
            store.read("../etc/passwd").await,
            Err(StorageError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn test_stat_missing_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(
            store.stat("missing").await,
            Err(StorageError::NotFound(_))
        ));
    }
}
