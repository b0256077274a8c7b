// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Callback Channel
//!
//! Owns the client's callback socket. The server learns this socket's
//! address from the REGISTER request sent through it and later pushes
//! FILE_UPDATED frames to it.
//!
//! A single listener task reads every inbound frame and routes it on the
//! first four bytes:
//! - id 0: unsolicited push, decoded and handed to the [`UpdateListener`]
//! - any other id: reply, handed to the call waiting on that id through a
//!   one-shot channel; replies nobody waits for are dropped

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use crate::domain::cache::UpdateListener;
use crate::domain::message::{OperationKind, Request, Response};
use crate::domain::wire::{peek_correlation_id, CALLBACK_REQUEST_ID, MAX_FRAME_SIZE};
use crate::infrastructure::rpc::{check_reply, RetryPolicy, RpcError};
use crate::infrastructure::transport::{DatagramTransport, LossSimulator, TransportError};

type PendingReplies = Arc<Mutex<HashMap<u32, oneshot::Sender<Response>>>>;

pub struct CallbackChannel {
    transport: Arc<dyn DatagramTransport>,
    listener: Arc<dyn UpdateListener>,
    pending: PendingReplies,
    task: Mutex<Option<AbortHandle>>,
}

/// Removes a waiter from the pending map however the call ends
struct PendingGuard<'a> {
    pending: &'a PendingReplies,
    id: u32,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}

impl CallbackChannel {
    pub fn new(transport: Arc<dyn DatagramTransport>, listener: Arc<dyn UpdateListener>) -> Self {
        Self {
            transport,
            listener,
            pending: Arc::new(Mutex::new(HashMap::new())),
            task: Mutex::new(None),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RpcError> {
        Ok(self.transport.local_addr()?)
    }

    /// Spawn the listener task
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            warn!("Callback listener already running");
            return;
        }

        let transport = self.transport.clone();
        let listener = self.listener.clone();
        let pending = self.pending.clone();

        let handle = tokio::spawn(async move {
            info!("Callback listener task started");
            let mut buf = vec![0u8; MAX_FRAME_SIZE];
            loop {
                match transport.recv_from(&mut buf, None).await {
                    Ok((len, origin)) => {
                        dispatch(&buf[..len], origin, listener.as_ref(), &pending);
                    }
                    Err(TransportError::Timeout(_)) => continue,
                    Err(e) => {
                        error!("Callback socket receive failed: {}", e);
                        break;
                    }
                }
            }
            info!("Callback listener task stopped");
        });

        *task = Some(handle.abort_handle());
    }

    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
            info!("Callback listener stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Send `request` from the callback socket and wait for its reply
    ///
    /// Same retry contract as the main proxy: one encoded frame, resent on
    /// each timeout, `NoResponse` after `max_attempts`.
    pub async fn call(
        &self,
        request: &Request,
        server: SocketAddr,
        policy: RetryPolicy,
        loss: LossSimulator,
    ) -> Result<Response, RpcError> {
        let frame = request.encode()?;
        let (tx, mut rx) = oneshot::channel();
        self.pending.lock().insert(request.id, tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id: request.id,
        };

        for attempt in 1..=policy.max_attempts {
            if attempt > 1 {
                metrics::counter!("rfa_rpc_retries_total", "kind" => request.kind.as_str())
                    .increment(1);
            }

            if loss.should_drop() {
                warn!(
                    request_id = request.id,
                    kind = %request.kind,
                    attempt,
                    "Simulated loss: request not sent"
                );
                metrics::counter!("rfa_rpc_dropped_sends_total").increment(1);
            } else {
                debug!(
                    request_id = request.id,
                    kind = %request.kind,
                    attempt,
                    "Sending request from callback socket"
                );
                self.transport.send_to(&frame, server).await?;
            }

            match tokio::time::timeout(policy.request_timeout, &mut rx).await {
                Ok(Ok(response)) => return check_reply(request.id, response),
                Ok(Err(_)) => return Err(RpcError::ChannelClosed),
                Err(_) => {
                    warn!(
                        request_id = request.id,
                        kind = %request.kind,
                        attempt,
                        max_attempts = policy.max_attempts,
                        "Request timed out"
                    );
                }
            }
        }

        Err(RpcError::NoResponse {
            attempts: policy.max_attempts,
        })
    }
}

impl Drop for CallbackChannel {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}

fn dispatch(
    frame: &[u8],
    origin: SocketAddr,
    listener: &dyn UpdateListener,
    pending: &PendingReplies,
) {
    let Some(id) = peek_correlation_id(frame) else {
        warn!(origin = %origin, len = frame.len(), "Dropping runt frame on callback socket");
        return;
    };

    if id == CALLBACK_REQUEST_ID {
        apply_push(frame, origin, listener);
        return;
    }

    let response = match Response::decode(frame) {
        Ok(response) => response,
        Err(e) => {
            warn!(request_id = id, origin = %origin, "Undecodable reply on callback socket: {}", e);
            return;
        }
    };

    match pending.lock().remove(&id) {
        Some(waiter) => {
            // The caller may have given up between lookup and send
            let _ = waiter.send(response);
        }
        None => debug!(request_id = id, "Dropping reply nobody is waiting for"),
    }
}

fn apply_push(frame: &[u8], origin: SocketAddr, listener: &dyn UpdateListener) {
    let request = match Request::decode(frame) {
        Ok(request) if request.kind == OperationKind::FileUpdated => request,
        Ok(request) => {
            warn!(kind = %request.kind, origin = %origin, "Ignoring unexpected push");
            return;
        }
        Err(e) => {
            warn!(origin = %origin, "Undecodable push: {}", e);
            return;
        }
    };

    match (request.path(), request.mtime(), request.data()) {
        (Ok(path), Ok(mtime), Ok(data)) => {
            info!(path = %path, mtime, bytes = data.len(), "File update pushed by server");
            metrics::counter!("rfa_callbacks_received_total").increment(1);
            listener.file_updated(path, mtime, data.to_vec());
        }
        _ => warn!(origin = %origin, "Malformed FILE_UPDATED push"),
    }
}
