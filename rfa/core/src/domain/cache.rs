// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Client File Cache
//!
//! Per-session map from path to the last known content of that file, with
//! the two timestamps the coherence protocol reasons about:
//!
//! - `server_mtime` (Tmclient): the server modification time the cached
//!   content corresponds to, in milliseconds since the Unix epoch
//! - `validated_at` (Tc): local time of the last successful validation
//!
//! An entry is fresh while `now - validated_at < freshness_interval`.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Shared cache state for the foreground shell and the
//!   callback listener task

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

/// Source of "now" for freshness checks
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let delta = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
        let mut now = self.now.lock();
        *now = now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC);
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Receiver of server-pushed file updates
pub trait UpdateListener: Send + Sync {
    fn file_updated(&self, path: &str, mtime: i64, content: Vec<u8>);
}

/// Snapshot of one cached file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub path: String,
    pub content: Vec<u8>,
    pub server_mtime: i64,
    pub validated_at: DateTime<Utc>,
}

/// Client-side file cache
pub struct Cache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    freshness_interval: Duration,
    clock: Arc<dyn Clock>,
}

impl Cache {
    pub fn new(freshness_interval: Duration) -> Self {
        Self::with_clock(freshness_interval, Arc::new(SystemClock))
    }

    pub fn with_clock(freshness_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            freshness_interval,
            clock,
        }
    }

    pub fn freshness_interval(&self) -> Duration {
        self.freshness_interval
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn lookup(&self, path: &str) -> Option<CacheEntry> {
        self.entries.read().get(path).cloned()
    }

    /// Whether `entry` was validated less than one freshness interval ago
    pub fn is_fresh(&self, entry: &CacheEntry) -> bool {
        // A clock that stepped backwards counts as zero elapsed time
        let elapsed = (self.now() - entry.validated_at)
            .to_std()
            .unwrap_or_default();
        elapsed < self.freshness_interval
    }

    /// Store content fetched from the server, validated as of now
    pub fn store(&self, path: &str, content: Vec<u8>, server_mtime: i64) {
        let entry = CacheEntry {
            path: path.to_string(),
            content,
            server_mtime,
            validated_at: self.now(),
        };
        debug!(path = %path, server_mtime, "Cache store");
        self.entries.write().insert(path.to_string(), entry);
    }

    /// Store a READ result unless a newer copy was pushed meanwhile
    ///
    /// Returns the content left in the cache.
    pub fn store_fetched(&self, path: &str, content: Vec<u8>, server_mtime: i64) -> Vec<u8> {
        let now = self.now();
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(path) {
            if existing.server_mtime > server_mtime {
                debug!(
                    path = %path,
                    cached_mtime = existing.server_mtime,
                    server_mtime,
                    "Keeping newer cached copy over fetched one"
                );
                return existing.content.clone();
            }
        }
        debug!(path = %path, server_mtime, "Cache store");
        entries.insert(
            path.to_string(),
            CacheEntry {
                path: path.to_string(),
                content: content.clone(),
                server_mtime,
                validated_at: now,
            },
        );
        content
    }

    /// Mark an entry as revalidated without touching its content
    pub fn revalidate(&self, path: &str) -> bool {
        let now = self.now();
        match self.entries.write().get_mut(path) {
            Some(entry) => {
                entry.validated_at = now;
                true
            }
            None => false,
        }
    }

    pub fn evict(&self, path: &str) -> bool {
        let removed = self.entries.write().remove(path).is_some();
        if removed {
            debug!(path = %path, "Cache evict");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl UpdateListener for Cache {
    /// Server pushes overwrite unconditionally
    fn file_updated(&self, path: &str, mtime: i64, content: Vec<u8>) {
        debug!(path = %path, mtime, bytes = content.len(), "Applying pushed file update");
        self.store(path, content, mtime);
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("entries", &self.len())
            .field("freshness_interval", &self.freshness_interval)
            .finish()
    }
}
