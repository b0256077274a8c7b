// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for RFA CLI

pub mod client;
pub mod config;
pub mod server;
pub mod shell;

pub use self::client::ClientArgs;
pub use self::config::ConfigCommand;
pub use self::server::ServerArgs;
