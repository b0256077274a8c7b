// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mod
//!
//! Server request handling and invocation semantics; client cache coherence
//! and the user-level file API.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Use cases on top of the domain types and transports

pub mod registry;
pub mod servicer;
pub mod invocation;
pub mod cache_handler;
pub mod file_operations;
pub mod session;

pub use file_operations::{FileOperationError, FileOperations};
pub use session::{ClientSession, SessionError};
