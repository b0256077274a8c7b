// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod transport;
pub mod storage;
pub mod rpc;
pub mod server;

pub use server::{FileServer, ServerError};
