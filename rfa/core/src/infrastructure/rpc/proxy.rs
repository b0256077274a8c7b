// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Client-side RPC proxy
//!
//! Sends a request to the file server and waits for the matching reply,
//! retransmitting the same frame on timeout until the retry budget is spent.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::message::{OperationKind, Request, Response};
use crate::domain::value::Value;
use crate::domain::wire::MAX_FRAME_SIZE;
use crate::infrastructure::rpc::callback::CallbackChannel;
use crate::infrastructure::rpc::{
    check_reply, RemoteAttributes, RemoteFiles, RequestIdGenerator, RetryPolicy, RpcError,
};
use crate::infrastructure::transport::{DatagramTransport, LossSimulator, TransportError};

pub struct RpcProxy {
    transport: Arc<dyn DatagramTransport>,
    server: SocketAddr,
    policy: RetryPolicy,
    loss: LossSimulator,
    ids: Arc<RequestIdGenerator>,
    callback: Option<Arc<CallbackChannel>>,
    /// One outstanding exchange per socket
    in_flight: Mutex<()>,
}

impl RpcProxy {
    pub fn new(
        transport: Arc<dyn DatagramTransport>,
        server: SocketAddr,
        policy: RetryPolicy,
        loss: LossSimulator,
    ) -> Self {
        Self {
            transport,
            server,
            policy,
            loss,
            ids: Arc::new(RequestIdGenerator::new()),
            callback: None,
            in_flight: Mutex::new(()),
        }
    }

    /// Route registrations through `channel` so the server learns its address
    pub fn with_callback_channel(mut self, channel: Arc<CallbackChannel>) -> Self {
        self.callback = Some(channel);
        self
    }

    /// Share an id generator with other senders of the same session
    pub fn with_id_generator(mut self, ids: Arc<RequestIdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn next_id(&self) -> u32 {
        self.ids.next_id()
    }

    /// Perform one call, returning the OK response
    ///
    /// Fails with `NoResponse` after `max_attempts` attempts without a reply,
    /// `CorrelationMismatch` when the server's reply carries a newer id, and
    /// `Status` when the server answers with a non-OK status.
    pub async fn invoke(&self, request: &Request) -> Result<Response, RpcError> {
        let frame = request.encode()?;
        let _guard = self.in_flight.lock().await;
        let mut buf = vec![0u8; MAX_FRAME_SIZE];

        for attempt in 1..=self.policy.max_attempts {
            if attempt > 1 {
                metrics::counter!("rfa_rpc_retries_total", "kind" => request.kind.as_str())
                    .increment(1);
            }

            if self.loss.should_drop() {
                warn!(
                    request_id = request.id,
                    kind = %request.kind,
                    attempt,
                    "Simulated loss: request not sent"
                );
                metrics::counter!("rfa_rpc_dropped_sends_total").increment(1);
                tokio::time::sleep(self.policy.request_timeout).await;
                continue;
            }

            debug!(
                request_id = request.id,
                kind = %request.kind,
                attempt,
                server = %self.server,
                "Sending request"
            );
            self.transport.send_to(&frame, self.server).await?;

            if let Some(response) = self.await_reply(request, &mut buf).await? {
                return check_reply(request.id, response);
            }
            warn!(
                request_id = request.id,
                kind = %request.kind,
                attempt,
                max_attempts = self.policy.max_attempts,
                "Request timed out"
            );
        }

        Err(RpcError::NoResponse {
            attempts: self.policy.max_attempts,
        })
    }

    /// Wait out one attempt for a reply from the server
    ///
    /// Datagrams from other origins and late replies to earlier requests are
    /// discarded without restarting the attempt timer. `None` on timeout.
    async fn await_reply(
        &self,
        request: &Request,
        buf: &mut [u8],
    ) -> Result<Option<Response>, RpcError> {
        let deadline = Instant::now() + self.policy.request_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let (len, origin) = match self.transport.recv_from(buf, Some(remaining)).await {
                Ok(received) => received,
                Err(TransportError::Timeout(_)) => return Ok(None),
                Err(e) => return Err(e.into()),
            };

            if origin != self.server {
                debug!(origin = %origin, server = %self.server, "Ignoring datagram from unexpected origin");
                metrics::counter!("rfa_rpc_discarded_replies_total", "reason" => "origin").increment(1);
                continue;
            }

            let response = Response::decode(&buf[..len])?;
            if response.id < request.id {
                debug!(
                    request_id = request.id,
                    reply_id = response.id,
                    "Ignoring late reply to an earlier request"
                );
                metrics::counter!("rfa_rpc_discarded_replies_total", "reason" => "stale").increment(1);
                continue;
            }

            debug!(
                request_id = response.id,
                status = %response.status,
                origin = %origin,
                "Received response"
            );
            return Ok(Some(response));
        }
    }
}

fn unexpected(kind: OperationKind, reason: &str) -> RpcError {
    RpcError::UnexpectedResult {
        kind,
        reason: reason.to_string(),
    }
}

#[async_trait]
impl RemoteFiles for RpcProxy {
    async fn read(&self, path: &str) -> Result<(Vec<u8>, i64), RpcError> {
        let response = self.invoke(&Request::read(self.next_id(), path)).await?;
        let content = response
            .bytes_at(0)
            .ok_or_else(|| unexpected(OperationKind::Read, "missing content"))?
            .to_vec();
        let mtime = response
            .int64_at(1)
            .ok_or_else(|| unexpected(OperationKind::Read, "missing mtime"))?;
        Ok((content, mtime))
    }

    async fn get_attr(&self, path: &str) -> Result<RemoteAttributes, RpcError> {
        let response = self.invoke(&Request::get_attr(self.next_id(), path)).await?;
        match (response.int64_at(0), response.int64_at(1)) {
            (Some(mtime), Some(atime)) => Ok(RemoteAttributes { mtime, atime }),
            _ => Err(unexpected(OperationKind::GetAttr, "missing timestamps")),
        }
    }

    async fn insert(&self, path: &str, offset: i32, data: Vec<u8>) -> Result<i64, RpcError> {
        let response = self
            .invoke(&Request::insert(self.next_id(), path, offset, data))
            .await?;
        response
            .int64_at(0)
            .ok_or_else(|| unexpected(OperationKind::Insert, "missing mtime"))
    }

    async fn append(&self, path: &str, data: Vec<u8>) -> Result<i64, RpcError> {
        let response = self
            .invoke(&Request::append(self.next_id(), path, data))
            .await?;
        response
            .int64_at(0)
            .ok_or_else(|| unexpected(OperationKind::Append, "missing mtime"))
    }

    async fn touch(&self, path: &str) -> Result<i64, RpcError> {
        let response = self.invoke(&Request::touch(self.next_id(), path)).await?;
        response
            .int64_at(0)
            .ok_or_else(|| unexpected(OperationKind::Touch, "missing atime"))
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<String>, RpcError> {
        let response = self.invoke(&Request::list_dir(self.next_id(), path)).await?;
        response
            .values
            .into_iter()
            .map(|value| match value {
                Value::Str(name) => Ok(name),
                other => Err(unexpected(
                    OperationKind::ListDir,
                    &format!("expected string entry, got {}", other.value_type()),
                )),
            })
            .collect()
    }

    async fn register(&self, path: &str, interval_secs: i32) -> Result<(), RpcError> {
        let channel = self.callback.as_ref().ok_or(RpcError::CallbackUnavailable)?;
        let request = Request::register(self.next_id(), path, interval_secs);
        channel
            .call(&request, self.server, self.policy, self.loss)
            .await?;
        Ok(())
    }
}
