// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Invocation Semantics
//!
//! Server-side execution guarantees under client retransmission, and the
//! table of already-computed responses used to suppress duplicates.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** At-least-once vs at-most-once policy and duplicate store

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How many times a retransmitted request may execute
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvocationSemantics {
    /// Every delivery runs the handler
    #[default]
    AtLeastOnce,
    /// Duplicate deliveries replay the stored response
    AtMostOnce,
}

impl fmt::Display for InvocationSemantics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvocationSemantics::AtLeastOnce => f.write_str("at-least-once"),
            InvocationSemantics::AtMostOnce => f.write_str("at-most-once"),
        }
    }
}

impl FromStr for InvocationSemantics {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "at-least-once" | "alo" => Ok(InvocationSemantics::AtLeastOnce),
            "at-most-once" | "amo" => Ok(InvocationSemantics::AtMostOnce),
            other => Err(format!(
                "unknown invocation semantics '{}' (expected at-least-once or at-most-once)",
                other
            )),
        }
    }
}

/// Identity of one logical request: origin endpoint plus correlation id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DuplicateKey {
    pub origin: SocketAddr,
    pub request_id: u32,
}

impl DuplicateKey {
    pub fn new(origin: SocketAddr, request_id: u32) -> Self {
        Self { origin, request_id }
    }
}

impl fmt::Display for DuplicateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.origin, self.request_id)
    }
}

/// Encoded responses already sent, keyed by request identity
///
/// Unbounded unless a capacity is given, in which case the oldest entry is
/// evicted first.
#[derive(Debug, Default)]
pub struct PendingResponseTable {
    responses: HashMap<DuplicateKey, Vec<u8>>,
    order: VecDeque<DuplicateKey>,
    capacity: Option<usize>,
}

impl PendingResponseTable {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            responses: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    pub fn get(&self, key: &DuplicateKey) -> Option<&[u8]> {
        self.responses.get(key).map(Vec::as_slice)
    }

    pub fn insert(&mut self, key: DuplicateKey, frame: Vec<u8>) {
        if self.responses.insert(key, frame).is_some() {
            return;
        }
        self.order.push_back(key);

        if let Some(capacity) = self.capacity {
            while self.responses.len() > capacity {
                match self.order.pop_front() {
                    Some(oldest) => {
                        self.responses.remove(&oldest);
                    }
                    None => break,
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(port: u16, id: u32) -> DuplicateKey {
        DuplicateKey::new(SocketAddr::from(([127, 0, 0, 1], port)), id)
    }

    #[test]
    fn test_same_id_from_different_ports_is_distinct() {
        let mut table = PendingResponseTable::new(None);
        table.insert(key(1000, 1), vec![1]);
        table.insert(key(1001, 1), vec![2]);
        assert_eq!(table.get(&key(1000, 1)), Some(&[1u8][..]));
        assert_eq!(table.get(&key(1001, 1)), Some(&[2u8][..]));
    }

    #[test]
    fn test_capacity_evicts_oldest_first() {
        let mut table = PendingResponseTable::new(Some(2));
        table.insert(key(1, 1), vec![1]);
        table.insert(key(1, 2), vec![2]);
        table.insert(key(1, 3), vec![3]);
        assert_eq!(table.len(), 2);
        assert!(table.get(&key(1, 1)).is_none());
        assert!(table.get(&key(1, 3)).is_some());
    }

    #[test]
    fn test_unbounded_by_default() {
        let mut table = PendingResponseTable::default();
        for id in 0..1000 {
            table.insert(key(1, id), vec![]);
        }
        assert_eq!(table.len(), 1000);
    }

    #[test]
    fn test_parse_semantics() {
        assert_eq!(
            "AT_MOST_ONCE".parse::<InvocationSemantics>().unwrap(),
            InvocationSemantics::AtMostOnce
        );
        assert_eq!(
            "at-least-once".parse::<InvocationSemantics>().unwrap(),
            InvocationSemantics::AtLeastOnce
        );
        assert!("exactly-once".parse::<InvocationSemantics>().is_err());
    }
}
