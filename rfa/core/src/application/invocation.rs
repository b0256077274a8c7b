// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Invocation Semantics Wrapper
//!
//! Turns one received datagram into at most one reply datagram, applying the
//! configured execution guarantee around the servicer:
//!
//! ```text
//! RECEIVED -> DECODED -> (DUPLICATE_SHORT_CIRCUIT | DISPATCHED) -> RESPONDED
//! ```
//!
//! Under at-most-once the encoded reply is stored before it is returned, so a
//! retransmission from the same origin with the same correlation id gets the
//! byte-identical reply without the handler running again.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::application::servicer::Servicer;
use crate::domain::message::{Request, Response, Status};
use crate::domain::semantics::{DuplicateKey, InvocationSemantics, PendingResponseTable};
use crate::domain::wire::peek_correlation_id;

pub struct Invoker {
    servicer: Arc<dyn Servicer>,
    semantics: InvocationSemantics,
    responses: Mutex<PendingResponseTable>,
}

impl Invoker {
    pub fn new(servicer: Arc<dyn Servicer>, semantics: InvocationSemantics) -> Self {
        Self::with_capacity(servicer, semantics, None)
    }

    /// `capacity` bounds the at-most-once response table
    pub fn with_capacity(
        servicer: Arc<dyn Servicer>,
        semantics: InvocationSemantics,
        capacity: Option<usize>,
    ) -> Self {
        info!(semantics = %semantics, capacity = ?capacity, "Invocation semantics configured");
        Self {
            servicer,
            semantics,
            responses: Mutex::new(PendingResponseTable::new(capacity)),
        }
    }

    pub fn semantics(&self) -> InvocationSemantics {
        self.semantics
    }

    pub fn stored_responses(&self) -> usize {
        self.responses.lock().len()
    }

    /// Process one inbound frame, returning the reply to send, if any
    ///
    /// Frames too short to carry a correlation id are dropped; other
    /// undecodable frames are answered with BAD_REQUEST.
    pub async fn handle_frame(&self, frame: &[u8], origin: SocketAddr) -> Option<Vec<u8>> {
        let request = match Request::decode(frame) {
            Ok(request) => request,
            Err(e) => {
                let id = peek_correlation_id(frame);
                warn!(origin = %origin, request_id = ?id, "Failed to decode request: {}", e);
                return id.and_then(|id| encode_or_log(&Response::status_only(id, Status::BadRequest)));
            }
        };

        debug!(
            request_id = request.id,
            kind = %request.kind,
            origin = %origin,
            "Request decoded"
        );

        match self.semantics {
            InvocationSemantics::AtLeastOnce => self.dispatch(&request, origin).await,
            InvocationSemantics::AtMostOnce => {
                let key = DuplicateKey::new(origin, request.id);
                let stored = self.responses.lock().get(&key).map(<[u8]>::to_vec);
                if let Some(stored) = stored {
                    info!(key = %key, kind = %request.kind, "Duplicate request, replaying stored response");
                    metrics::counter!("rfa_duplicate_requests_total").increment(1);
                    return Some(stored);
                }

                let reply = self.dispatch(&request, origin).await?;
                self.responses.lock().insert(key, reply.clone());
                Some(reply)
            }
        }
    }

    async fn dispatch(&self, request: &Request, origin: SocketAddr) -> Option<Vec<u8>> {
        let response = match self.servicer.handle(request, origin).await {
            Ok(values) => Response::ok(request.id, values),
            Err(e) => {
                match e.status() {
                    Status::InternalError => error!(request_id = request.id, kind = %request.kind, "Handler failed: {}", e),
                    _ => debug!(request_id = request.id, kind = %request.kind, "Request rejected: {}", e),
                }
                Response::status_only(request.id, e.status())
            }
        };
        metrics::counter!("rfa_requests_handled_total", "kind" => request.kind.as_str()).increment(1);

        match response.encode() {
            Ok(frame) => Some(frame),
            Err(e) => {
                error!(request_id = request.id, kind = %request.kind, "Failed to encode response: {}", e);
                encode_or_log(&Response::status_only(request.id, Status::InternalError))
            }
        }
    }
}

fn encode_or_log(response: &Response) -> Option<Vec<u8>> {
    match response.encode() {
        Ok(frame) => Some(frame),
        Err(e) => {
            error!(request_id = response.id, "Failed to encode status response: {}", e);
            None
        }
    }
}
