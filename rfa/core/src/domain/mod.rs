// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mod
//!
//! Wire types, cache state, storage contracts and configuration.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Implements mod

pub mod wire;
pub mod value;
pub mod message;
pub mod cache;
pub mod semantics;
pub mod storage;
pub mod path_sanitizer;
pub mod config;
