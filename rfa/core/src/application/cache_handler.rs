// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Cache Coherence Protocol
//!
//! Decides for each read whether the cached copy can be served as is, must
//! be revalidated against the server's modification time, or must be fetched
//! again. Writes go to the server first and only a confirmed write evicts
//! the cached copy.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Client-side coherence over the [`RemoteFiles`] seam
//!
//! Per path:
//!
//! | cached | fresh | server mtime vs cached | action                      |
//! |--------|-------|------------------------|-----------------------------|
//! | no     |       |                        | READ                        |
//! | yes    | yes   |                        | serve cached                |
//! | yes    | no    | newer                  | GET_ATTR, READ              |
//! | yes    | no    | equal                  | GET_ATTR, refresh Tc        |
//! | yes    | no    | older                  | GET_ATTR, evict (violation) |

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::cache::Cache;
use crate::infrastructure::rpc::{RemoteFiles, RpcError};

#[derive(Debug, Error)]
pub enum CoherenceError {
    #[error(transparent)]
    Remote(#[from] RpcError),

    #[error("Server mtime {server} is older than cached mtime {cached} for {path}")]
    Inconsistent {
        path: String,
        cached: i64,
        server: i64,
    },
}

impl CoherenceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoherenceError::Remote(e) if e.is_not_found())
    }
}

/// Mutations that write through to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Insert { offset: i32 },
    Append,
}

pub struct CacheHandler {
    remote: Arc<dyn RemoteFiles>,
    cache: Arc<Cache>,
}

impl CacheHandler {
    pub fn new(remote: Arc<dyn RemoteFiles>, cache: Arc<Cache>) -> Self {
        Self { remote, cache }
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    pub fn remote(&self) -> &Arc<dyn RemoteFiles> {
        &self.remote
    }

    /// Current content of `path`, from cache when coherent
    ///
    /// Any error means the file is treated as absent and nothing stale is
    /// left cached for it.
    pub async fn get_file(&self, path: &str) -> Result<Vec<u8>, CoherenceError> {
        let Some(entry) = self.cache.lookup(path) else {
            debug!(path = %path, "Cache miss");
            return self.fetch(path).await;
        };

        if self.cache.is_fresh(&entry) {
            debug!(path = %path, "Cache hit (fresh)");
            metrics::counter!("rfa_cache_hits_total").increment(1);
            return Ok(entry.content);
        }

        debug!(path = %path, "Cache entry stale, validating");
        let attrs = match self.remote.get_attr(path).await {
            Ok(attrs) => attrs,
            Err(e) => {
                self.cache.evict(path);
                return Err(e.into());
            }
        };

        if entry.server_mtime < attrs.mtime {
            info!(
                path = %path,
                cached_mtime = entry.server_mtime,
                server_mtime = attrs.mtime,
                "File modified on server, fetching"
            );
            self.fetch(path).await
        } else if entry.server_mtime == attrs.mtime {
            debug!(path = %path, "Cache entry validated");
            self.cache.revalidate(path);
            metrics::counter!("rfa_cache_hits_total").increment(1);
            Ok(entry.content)
        } else {
            warn!(
                path = %path,
                cached_mtime = entry.server_mtime,
                server_mtime = attrs.mtime,
                "Server modification time went backwards, evicting"
            );
            self.cache.evict(path);
            Err(CoherenceError::Inconsistent {
                path: path.to_string(),
                cached: entry.server_mtime,
                server: attrs.mtime,
            })
        }
    }

    async fn fetch(&self, path: &str) -> Result<Vec<u8>, CoherenceError> {
        metrics::counter!("rfa_cache_fetches_total").increment(1);
        match self.remote.read(path).await {
            Ok((content, mtime)) => Ok(self.cache.store_fetched(path, content, mtime)),
            Err(e) => {
                self.cache.evict(path);
                Err(e.into())
            }
        }
    }

    /// Apply a mutation on the server, then evict the cached copy
    ///
    /// Returns the server mtime after the write. A rejected write leaves the
    /// cache untouched.
    pub async fn write_through(
        &self,
        path: &str,
        op: WriteOp,
        data: Vec<u8>,
    ) -> Result<i64, RpcError> {
        let mtime = match op {
            WriteOp::Insert { offset } => self.remote.insert(path, offset, data).await?,
            WriteOp::Append => self.remote.append(path, data).await?,
        };
        self.cache.evict(path);
        debug!(path = %path, op = ?op, mtime, "Write confirmed, cache entry evicted");
        Ok(mtime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cache::{Clock, ManualClock, UpdateListener};
    use crate::domain::message::Status;
    use crate::infrastructure::rpc::RemoteAttributes;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    /// In-memory server with call counters
    #[derive(Default)]
    struct MockRemote {
        file: Mutex<Option<(Vec<u8>, i64)>>,
        reads: Mutex<usize>,
        attrs: Mutex<usize>,
        reject_writes: bool,
        /// READ fails even though GET_ATTR still answers
        fail_reads: Mutex<bool>,
        /// Applied to the cache while a READ is in flight
        push_during_read: Mutex<Option<(Arc<Cache>, Vec<u8>, i64)>>,
    }

    impl MockRemote {
        fn with_file(content: &[u8], mtime: i64) -> Self {
            let remote = Self::default();
            *remote.file.lock() = Some((content.to_vec(), mtime));
            remote
        }

        fn set(&self, content: &[u8], mtime: i64) {
            *self.file.lock() = Some((content.to_vec(), mtime));
        }

        fn counts(&self) -> (usize, usize) {
            (*self.reads.lock(), *self.attrs.lock())
        }

        fn not_found() -> RpcError {
            RpcError::Status {
                status: Status::NotFound,
                message: None,
            }
        }
    }

    #[async_trait]
    impl RemoteFiles for MockRemote {
        async fn read(&self, path: &str) -> Result<(Vec<u8>, i64), RpcError> {
            *self.reads.lock() += 1;
            if *self.fail_reads.lock() {
                return Err(Self::not_found());
            }
            let snapshot = self.file.lock().clone().ok_or_else(Self::not_found)?;
            if let Some((cache, content, mtime)) = self.push_during_read.lock().take() {
                cache.file_updated(path, mtime, content);
            }
            Ok(snapshot)
        }

        async fn get_attr(&self, _path: &str) -> Result<RemoteAttributes, RpcError> {
            *self.attrs.lock() += 1;
            let mtime = self.file.lock().as_ref().map(|(_, m)| *m).ok_or_else(Self::not_found)?;
            Ok(RemoteAttributes { mtime, atime: mtime })
        }

        async fn insert(&self, _path: &str, offset: i32, data: Vec<u8>) -> Result<i64, RpcError> {
            if self.reject_writes {
                return Err(RpcError::Status {
                    status: Status::BadRequest,
                    message: None,
                });
            }
            let mut file = self.file.lock();
            let (content, mtime) = file.as_mut().ok_or_else(Self::not_found)?;
            let at = offset as usize;
            content.splice(at..at, data);
            *mtime += 1;
            Ok(*mtime)
        }

        async fn append(&self, _path: &str, data: Vec<u8>) -> Result<i64, RpcError> {
            let mut file = self.file.lock();
            let (content, mtime) = file.as_mut().ok_or_else(Self::not_found)?;
            content.extend(data);
            *mtime += 1;
            Ok(*mtime)
        }

        async fn touch(&self, _path: &str) -> Result<i64, RpcError> {
            Ok(0)
        }

        async fn list_dir(&self, _path: &str) -> Result<Vec<String>, RpcError> {
            Ok(Vec::new())
        }

        async fn register(&self, _path: &str, _interval_secs: i32) -> Result<(), RpcError> {
            Ok(())
        }
    }

    const F: Duration = Duration::from_secs(10);

    fn handler(remote: Arc<MockRemote>) -> (CacheHandler, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let cache = Arc::new(Cache::with_clock(F, clock.clone()));
        (CacheHandler::new(remote, cache), clock)
    }

    #[tokio::test]
    async fn test_fresh_entry_needs_no_traffic() {
        let remote = Arc::new(MockRemote::with_file(b"v1", 100));
        let (handler, clock) = handler(remote.clone());

        assert_eq!(handler.get_file("f").await.unwrap(), b"v1");
        assert_eq!(remote.counts(), (1, 0));

        clock.advance(F - Duration::from_millis(1));
        assert_eq!(handler.get_file("f").await.unwrap(), b"v1");
        assert_eq!(remote.counts(), (1, 0));
    }

    #[tokio::test]
    async fn test_stale_entry_issues_exactly_one_attribute_round() {
        let remote = Arc::new(MockRemote::with_file(b"v1", 100));
        let (handler, clock) = handler(remote.clone());
        handler.get_file("f").await.unwrap();

        clock.advance(F + Duration::from_millis(1));
        let validated_before = clock.now();
        assert_eq!(handler.get_file("f").await.unwrap(), b"v1");
        assert_eq!(remote.counts(), (1, 1));

        let entry = handler.cache().lookup("f").unwrap();
        assert_eq!(entry.server_mtime, 100);
        assert_eq!(entry.validated_at, validated_before);

        // Revalidated, so fresh again
        handler.get_file("f").await.unwrap();
        assert_eq!(remote.counts(), (1, 1));
    }

    #[tokio::test]
    async fn test_newer_server_mtime_refetches() {
        let remote = Arc::new(MockRemote::with_file(b"v1", 100));
        let (handler, clock) = handler(remote.clone());
        handler.get_file("f").await.unwrap();

        remote.set(b"v2", 200);
        clock.advance(F);
        assert_eq!(handler.get_file("f").await.unwrap(), b"v2");
        assert_eq!(remote.counts(), (2, 1));
        assert_eq!(handler.cache().lookup("f").unwrap().server_mtime, 200);
    }

    #[tokio::test]
    async fn test_failed_refetch_after_newer_mtime_evicts() {
        let remote = Arc::new(MockRemote::with_file(b"v1", 100));
        let (handler, clock) = handler(remote.clone());
        handler.get_file("f").await.unwrap();

        remote.set(b"v2", 101);
        *remote.fail_reads.lock() = true;
        clock.advance(F);
        let err = handler.get_file("f").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(remote.counts(), (2, 1));
        assert!(handler.cache().lookup("f").is_none());
    }

    #[tokio::test]
    async fn test_push_during_read_is_not_overwritten() {
        let remote = Arc::new(MockRemote::with_file(b"v1", 100));
        let (handler, _clock) = handler(remote.clone());
        *remote.push_during_read.lock() = Some((handler.cache().clone(), b"pushed".to_vec(), 300));

        assert_eq!(handler.get_file("f").await.unwrap(), b"pushed");
        let entry = handler.cache().lookup("f").unwrap();
        assert_eq!(entry.content, b"pushed");
        assert_eq!(entry.server_mtime, 300);
    }

    #[tokio::test]
    async fn test_regressed_server_mtime_evicts() {
        let remote = Arc::new(MockRemote::with_file(b"v1", 100));
        let (handler, clock) = handler(remote.clone());
        handler.get_file("f").await.unwrap();

        remote.set(b"v0", 50);
        clock.advance(F);
        let err = handler.get_file("f").await.unwrap_err();
        assert!(matches!(err, CoherenceError::Inconsistent { cached: 100, server: 50, .. }));
        assert!(handler.cache().lookup("f").is_none());
    }

    #[tokio::test]
    async fn test_vanished_file_evicts() {
        let remote = Arc::new(MockRemote::with_file(b"v1", 100));
        let (handler, clock) = handler(remote.clone());
        handler.get_file("f").await.unwrap();

        *remote.file.lock() = None;
        clock.advance(F);
        assert!(handler.get_file("f").await.unwrap_err().is_not_found());
        assert!(handler.cache().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_is_not_cached() {
        let remote = Arc::new(MockRemote::default());
        let (handler, _clock) = handler(remote);
        assert!(handler.get_file("f").await.is_err());
        assert!(handler.cache().is_empty());
    }

    #[tokio::test]
    async fn test_confirmed_write_evicts() {
        let remote = Arc::new(MockRemote::with_file(b"ac", 100));
        let (handler, _clock) = handler(remote.clone());
        handler.get_file("f").await.unwrap();

        let mtime = handler
            .write_through("f", WriteOp::Insert { offset: 1 }, b"b".to_vec())
            .await
            .unwrap();
        assert_eq!(mtime, 101);
        assert!(handler.cache().lookup("f").is_none());

        assert_eq!(handler.get_file("f").await.unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_rejected_write_keeps_cache() {
        let remote = Arc::new(MockRemote {
            reject_writes: true,
            ..MockRemote::with_file(b"ac", 100)
        });
        let (handler, _clock) = handler(remote);
        handler.get_file("f").await.unwrap();

        assert!(handler
            .write_through("f", WriteOp::Insert { offset: 1 }, b"b".to_vec())
            .await
            .is_err());
        assert_eq!(handler.cache().lookup("f").unwrap().content, b"ac");
    }

    #[tokio::test]
    async fn test_pushed_update_is_served_without_traffic() {
        let remote = Arc::new(MockRemote::with_file(b"v1", 100));
        let (handler, _clock) = handler(remote.clone());
        handler.get_file("f").await.unwrap();

        handler.cache().file_updated("f", 300, b"pushed".to_vec());
        assert_eq!(handler.get_file("f").await.unwrap(), b"pushed");
        assert_eq!(remote.counts(), (1, 0));
        assert_eq!(handler.cache().lookup("f").unwrap().server_mtime, 300);
    }
}
