// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Callback Registry
//!
//! Tracks which client callback sockets want updates for which paths, and
//! until when. Expired registrations are pruned lazily on lookup.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::domain::cache::{Clock, SystemClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Registration {
    subscriber: SocketAddr,
    expires_at: DateTime<Utc>,
}

pub struct CallbackRegistry {
    registrations: Mutex<HashMap<String, Vec<Registration>>>,
    clock: Arc<dyn Clock>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            registrations: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Register or renew `subscriber` for `path`
    pub fn register(&self, path: &str, subscriber: SocketAddr, interval: Duration) -> DateTime<Utc> {
        let delta = chrono::Duration::from_std(interval).unwrap_or(chrono::Duration::MAX);
        let now = self.clock.now();
        let expires_at = now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut registrations = self.registrations.lock();
        let entries = registrations.entry(path.to_string()).or_default();
        entries.retain(|r| r.subscriber != subscriber && r.expires_at > now);
        entries.push(Registration {
            subscriber,
            expires_at,
        });

        info!(path = %path, subscriber = %subscriber, expires_at = %expires_at, "Callback registered");
        expires_at
    }

    /// Unexpired subscribers of `path`
    pub fn subscribers(&self, path: &str) -> Vec<SocketAddr> {
        let now = self.clock.now();
        let mut registrations = self.registrations.lock();
        let Some(entries) = registrations.get_mut(path) else {
            return Vec::new();
        };

        let before = entries.len();
        entries.retain(|r| r.expires_at > now);
        if entries.len() != before {
            debug!(path = %path, pruned = before - entries.len(), "Pruned expired callbacks");
        }

        let subscribers: Vec<SocketAddr> = entries.iter().map(|r| r.subscriber).collect();
        if entries.is_empty() {
            registrations.remove(path);
        }
        subscribers
    }

    /// Number of paths with at least one registration, expired or not
    pub fn path_count(&self) -> usize {
        self.registrations.lock().len()
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}
