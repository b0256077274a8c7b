// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Client RPC Infrastructure
//!
//! ## Architecture
//!
//! ### Component Responsibilities
//! - **RpcProxy**: request/response exchange with the server over the
//!   client's main socket; timeout-based retry, send-loss injection and
//!   correlation checking; implements [`RemoteFiles`]
//! - **CallbackChannel**: owns the callback socket; a background task
//!   demultiplexes inbound frames by correlation id, routing id 0 pushes to
//!   the update listener and any other id to the call waiting on it
//!
//! Every retry retransmits the same encoded frame, so the server sees one
//! correlation id per logical call.

pub mod callback;
pub mod proxy;

pub use callback::CallbackChannel;
pub use proxy::RpcProxy;

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::message::{OperationKind, Response, Status};
use crate::domain::wire::{DecodeError, EncodeError, CALLBACK_REQUEST_ID};
use crate::infrastructure::transport::TransportError;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("No response after {attempts} attempts")]
    NoResponse { attempts: u32 },

    #[error("Correlation mismatch: expected response to {expected}, got {actual}")]
    CorrelationMismatch { expected: u32, actual: u32 },

    #[error("Server responded {status}: {}", .message.as_deref().unwrap_or("no details"))]
    Status {
        status: Status,
        message: Option<String>,
    },

    #[error("Unexpected {kind} result: {reason}")]
    UnexpectedResult {
        kind: OperationKind,
        reason: String,
    },

    #[error("No callback channel configured")]
    CallbackUnavailable,

    #[error("Callback channel closed")]
    ChannelClosed,

    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl RpcError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RpcError::Status {
                status: Status::NotFound,
                ..
            }
        )
    }
}

/// Bound on how long and how often one call is attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub request_timeout: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(request_timeout: Duration, max_attempts: u32) -> Self {
        Self {
            request_timeout,
            max_attempts: max_attempts.max(1),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 5)
    }
}

/// Per-session correlation id source
///
/// Starts at 1 and skips the reserved callback id on wrap-around.
#[derive(Debug)]
pub struct RequestIdGenerator {
    next: AtomicU32,
}

impl RequestIdGenerator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u32) -> Self {
        Self {
            next: AtomicU32::new(first),
        }
    }

    pub fn next_id(&self) -> u32 {
        loop {
            let id = self.next.fetch_add(1, Ordering::Relaxed);
            if id != CALLBACK_REQUEST_ID {
                return id;
            }
        }
    }
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Server timestamps for one path, milliseconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteAttributes {
    pub mtime: i64,
    pub atime: i64,
}

/// Typed remote file operations
///
/// The coherence layer depends on this seam rather than on the proxy so it
/// can be driven by counting mocks in tests.
#[async_trait]
pub trait RemoteFiles: Send + Sync {
    /// Whole content plus server mtime
    async fn read(&self, path: &str) -> Result<(Vec<u8>, i64), RpcError>;

    async fn get_attr(&self, path: &str) -> Result<RemoteAttributes, RpcError>;

    /// Returns the new server mtime
    async fn insert(&self, path: &str, offset: i32, data: Vec<u8>) -> Result<i64, RpcError>;

    /// Returns the new server mtime
    async fn append(&self, path: &str, data: Vec<u8>) -> Result<i64, RpcError>;

    /// Returns the new access time
    async fn touch(&self, path: &str) -> Result<i64, RpcError>;

    async fn list_dir(&self, path: &str) -> Result<Vec<String>, RpcError>;

    /// Ask the server to push updates of `path` for `interval_secs`
    async fn register(&self, path: &str, interval_secs: i32) -> Result<(), RpcError>;
}

/// Validate correlation and status of a reply
pub(crate) fn check_reply(expected_id: u32, response: Response) -> Result<Response, RpcError> {
    if response.id != expected_id {
        return Err(RpcError::CorrelationMismatch {
            expected: expected_id,
            actual: response.id,
        });
    }
    if !response.status.is_ok() {
        return Err(RpcError::Status {
            status: response.status,
            message: response.diagnostic().map(str::to_string),
        });
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value::Value;

    #[test]
    fn test_ids_start_at_one_and_skip_zero() {
        let ids = RequestIdGenerator::new();
        assert_eq!(ids.next_id(), 1);
        assert_eq!(ids.next_id(), 2);

        let wrapping = RequestIdGenerator::starting_at(u32::MAX);
        assert_eq!(wrapping.next_id(), u32::MAX);
        assert_eq!(wrapping.next_id(), 1);
    }

    #[test]
    fn test_check_reply() {
        assert!(check_reply(3, Response::ok(3, vec![])).is_ok());
        assert!(matches!(
            check_reply(3, Response::ok(4, vec![])),
            Err(RpcError::CorrelationMismatch { expected: 3, actual: 4 })
        ));

        let not_found = check_reply(3, Response::status_only(3, Status::NotFound)).unwrap_err();
        assert!(not_found.is_not_found());

        let with_message = Response {
            id: 3,
            status: Status::InternalError,
            values: vec![Value::from("boom")],
        };
        match check_reply(3, with_message) {
            Err(RpcError::Status { status, message }) => {
                assert_eq!(status, Status::InternalError);
                assert_eq!(message.as_deref(), Some("boom"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_retry_policy_needs_one_attempt() {
        assert_eq!(RetryPolicy::new(Duration::from_millis(5), 0).max_attempts, 1);
    }
}
