// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Client Session
//!
//! Wires one client from its configuration: the cache, the callback channel
//! on its own socket, the RPC proxy on the main socket, the cache handler and
//! the user-level file operations.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::cache_handler::CacheHandler;
use crate::application::file_operations::FileOperations;
use crate::domain::cache::{Cache, Clock, SystemClock};
use crate::domain::config::ClientConfig;
use crate::infrastructure::rpc::{CallbackChannel, RetryPolicy, RpcError, RpcProxy};
use crate::infrastructure::transport::{
    DatagramTransport, LossSimulator, TransportError, UdpTransport,
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Cannot resolve server address {0}")]
    Resolve(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

pub struct ClientSession {
    server: SocketAddr,
    cache: Arc<Cache>,
    callback: Arc<CallbackChannel>,
    operations: FileOperations,
}

impl ClientSession {
    pub async fn connect(config: &ClientConfig) -> Result<Self, SessionError> {
        Self::connect_with_clock(config, Arc::new(SystemClock)).await
    }

    pub async fn connect_with_clock(
        config: &ClientConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SessionError> {
        let server = resolve(&config.server_address, config.server_port).await?;

        let cache = Arc::new(Cache::with_clock(config.freshness_interval, clock));

        let callback_transport: Arc<dyn DatagramTransport> =
            Arc::new(UdpTransport::bind_ephemeral_for(server).await?);
        let callback = Arc::new(CallbackChannel::new(callback_transport, cache.clone()));
        callback.start();

        let transport: Arc<dyn DatagramTransport> =
            Arc::new(UdpTransport::bind_ephemeral_for(server).await?);
        let proxy = RpcProxy::new(
            transport,
            server,
            RetryPolicy::new(config.request_timeout, config.max_attempts),
            LossSimulator::new(config.request_loss_probability),
        )
        .with_callback_channel(callback.clone());

        let handler = Arc::new(CacheHandler::new(Arc::new(proxy), cache.clone()));

        info!(
            server = %server,
            callback = %callback.local_addr()?,
            freshness_interval = ?config.freshness_interval,
            "Client session ready"
        );

        Ok(Self {
            server,
            cache,
            callback,
            operations: FileOperations::new(handler),
        })
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    pub fn operations(&self) -> &FileOperations {
        &self.operations
    }

    pub fn close(&self) {
        self.callback.stop();
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.callback.stop();
    }
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr, SessionError> {
    let target = format!("{}:{}", host, port);
    let addr = tokio::net::lookup_host(target.as_str())
        .await
        .map_err(|e| SessionError::Resolve(format!("{}: {}", target, e)))?
        .next();
    addr.ok_or(SessionError::Resolve(target))
}
