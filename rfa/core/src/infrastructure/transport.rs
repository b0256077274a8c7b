// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Datagram Transport
//!
//! Thin async seam over a UDP socket, used identically by the server's
//! receive loop, the client proxy and the client callback listener.
//! Fault injection for lossy-network experiments lives here as well.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::{ToSocketAddrs, UdpSocket};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to bind {address}: {error}")]
    BindFailed { address: String, error: String },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Unreliable, unordered datagram delivery
#[async_trait]
pub trait DatagramTransport: Send + Sync {
    async fn send_to(&self, frame: &[u8], target: SocketAddr) -> Result<(), TransportError>;

    /// Receive one datagram into `buf`, waiting at most `timeout` when given
    async fn recv_from(
        &self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<(usize, SocketAddr), TransportError>;

    fn local_addr(&self) -> Result<SocketAddr, TransportError>;
}

/// Tokio UDP socket transport
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    pub async fn bind<A: ToSocketAddrs + std::fmt::Display>(address: A) -> Result<Self, TransportError> {
        let label = address.to_string();
        let socket = UdpSocket::bind(address)
            .await
            .map_err(|e| TransportError::BindFailed {
                address: label,
                error: e.to_string(),
            })?;
        Ok(Self { socket })
    }

    /// Ephemeral port on the wildcard address of `peer`'s family
    pub async fn bind_ephemeral_for(peer: SocketAddr) -> Result<Self, TransportError> {
        let local: SocketAddr = if peer.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        Self::bind(local).await
    }
}

#[async_trait]
impl DatagramTransport for UdpTransport {
    async fn send_to(&self, frame: &[u8], target: SocketAddr) -> Result<(), TransportError> {
        self.socket.send_to(frame, target).await?;
        Ok(())
    }

    async fn recv_from(
        &self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<(usize, SocketAddr), TransportError> {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, self.socket.recv_from(buf))
                .await
                .map_err(|_| TransportError::Timeout(limit))?
                .map_err(TransportError::from),
            None => Ok(self.socket.recv_from(buf).await?),
        }
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }
}

/// Drops outgoing datagrams with a fixed probability
#[derive(Debug, Clone, Copy)]
pub struct LossSimulator {
    probability: f64,
}

impl LossSimulator {
    /// `probability` is clamped to [0, 1]
    pub fn new(probability: f64) -> Self {
        let probability = if probability.is_nan() {
            0.0
        } else {
            probability.clamp(0.0, 1.0)
        };
        Self { probability }
    }

    pub fn disabled() -> Self {
        Self::new(0.0)
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    pub fn should_drop(&self) -> bool {
        if self.probability <= 0.0 {
            return false;
        }
        rand::random::<f64>() < self.probability
    }
}

impl Default for LossSimulator {
    fn default() -> Self {
        Self::disabled()
    }
}
