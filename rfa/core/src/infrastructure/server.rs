// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! File Server
//!
//! ## Architecture
//!
//! ### Component Responsibilities
//! - **FileServer**: owns the UDP socket and the receive loop
//!   - Spawns one tokio task that reads a datagram, hands it to the
//!     [`Invoker`], and sends back the reply (if any) to the origin
//!   - Optional reply-loss injection to exercise client retry and duplicate
//!     suppression
//!   - Shutdown by task abort; health via `AbortHandle::is_finished()`
//! - **Invoker**: decoding and invocation semantics (application layer)
//! - **FileServicer**: request handling against the [`FileStore`]
//!
//! The loop handles one datagram at a time and never exits because of a
//! single bad message.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use crate::application::invocation::Invoker;
use crate::application::registry::CallbackRegistry;
use crate::application::servicer::FileServicer;
use crate::domain::config::ServerConfig;
use crate::domain::storage::{FileStore, StorageError};
use crate::domain::wire::MAX_FRAME_SIZE;
use crate::infrastructure::storage::LocalFileStore;
use crate::infrastructure::transport::{
    DatagramTransport, LossSimulator, TransportError, UdpTransport,
};

/// Pause after a failed receive before reading the socket again
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// File server errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Server already running")]
    AlreadyRunning,
}

pub struct FileServer {
    transport: Arc<dyn DatagramTransport>,
    invoker: Arc<Invoker>,
    response_loss: LossSimulator,
    server_handle: Arc<Mutex<Option<AbortHandle>>>,
}

impl FileServer {
    pub fn new(
        transport: Arc<dyn DatagramTransport>,
        invoker: Arc<Invoker>,
        response_loss: LossSimulator,
    ) -> Self {
        Self {
            transport,
            invoker,
            response_loss,
            server_handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Bind the configured address and export `config.root_dir`
    pub async fn from_config(config: &ServerConfig) -> Result<Self, ServerError> {
        let store: Arc<dyn FileStore> = Arc::new(LocalFileStore::new(&config.root_dir)?);
        Self::bind(config, store).await
    }

    /// Bind the configured address and serve `store`
    pub async fn bind(config: &ServerConfig, store: Arc<dyn FileStore>) -> Result<Self, ServerError> {
        let address = format!("{}:{}", config.bind_address, config.port);
        let transport: Arc<dyn DatagramTransport> = Arc::new(UdpTransport::bind(address.as_str()).await?);

        let registry = Arc::new(CallbackRegistry::new());
        let servicer = FileServicer::new(store, registry).with_notifier(transport.clone());
        let invoker = Invoker::with_capacity(
            Arc::new(servicer),
            config.semantics,
            config.pending_response_capacity,
        );

        Ok(Self::new(
            transport,
            Arc::new(invoker),
            LossSimulator::new(config.response_loss_probability),
        ))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.transport.local_addr()?)
    }

    pub fn invoker(&self) -> &Arc<Invoker> {
        &self.invoker
    }

    /// Spawn the receive loop
    pub async fn start(&self) -> Result<(), ServerError> {
        let mut server_handle = self.server_handle.lock();
        if server_handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return Err(ServerError::AlreadyRunning);
        }

        let local_addr = self.local_addr()?;
        info!(
            "Starting file server on {} ({})",
            local_addr,
            self.invoker.semantics()
        );

        let transport = self.transport.clone();
        let invoker = self.invoker.clone();
        let response_loss = self.response_loss;

        let handle = tokio::spawn(async move {
            info!("File server task started");
            let mut buf = vec![0u8; MAX_FRAME_SIZE];
            loop {
                let (len, origin) = match transport.recv_from(&mut buf, None).await {
                    Ok(received) => received,
                    Err(e) => {
                        error!("Receive failed: {}", e);
                        metrics::counter!("rfa_server_receive_errors_total").increment(1);
                        tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                        continue;
                    }
                };
                debug!(origin = %origin, len, "Datagram received");

                let Some(reply) = invoker.handle_frame(&buf[..len], origin).await else {
                    continue;
                };

                if response_loss.should_drop() {
                    warn!(origin = %origin, "Simulated loss: reply not sent");
                    metrics::counter!("rfa_server_dropped_replies_total").increment(1);
                    continue;
                }

                if let Err(e) = transport.send_to(&reply, origin).await {
                    error!(origin = %origin, "Failed to send reply: {}", e);
                }
            }
        });

        *server_handle = Some(handle.abort_handle());
        info!("File server started successfully");

        Ok(())
    }

    pub async fn stop(&self) -> Result<(), ServerError> {
        info!("Stopping file server");

        if let Some(handle) = self.server_handle.lock().take() {
            handle.abort();
            info!("File server stopped");
        } else {
            warn!("File server was not running");
        }

        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.server_handle
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}
