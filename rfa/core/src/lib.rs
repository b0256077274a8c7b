// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Lib
//!
//! Remote file access over datagrams: wire codec, RPC invocation with retry,
//! server invocation semantics and client cache coherence.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Library shared by the `rfa` server and client binaries

pub mod domain;
pub mod application;
pub mod infrastructure;
