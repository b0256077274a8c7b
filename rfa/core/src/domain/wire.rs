// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Wire Framing Primitives
//!
//! Shared constants, protocol errors and a bounds-checked frame reader used by
//! the value codec and the request/response codecs.
//!
//! ## Frame Layout
//! ```text
//! request:  [u32 id][u8 kind  ][u32 count][Value...]
//! response: [u32 id][u8 status][u32 count][Value...]
//! value:    [u8 tag][payload]   (string/blob payload = [u32 len][bytes])
//! ```
//! All integers are big-endian. Frames are sent unpadded; decoders ignore
//! trailing bytes so peers that ship the whole fixed buffer still parse.

use bytes::Buf;
use thiserror::Error;

use crate::domain::message::OperationKind;

/// Datagram buffer capacity shared by client and server
pub const MAX_FRAME_SIZE: usize = 4096;

/// Size of `[u32 id][u8 kind|status][u32 count]`
pub const HEADER_SIZE: usize = 4 + 1 + 4;

/// Correlation id reserved for unsolicited server-to-client pushes
pub const CALLBACK_REQUEST_ID: u32 = 0;

/// Errors raised while parsing a frame
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Truncated frame: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("Unknown value type tag: {0}")]
    UnknownValueType(u8),

    #[error("Unknown operation kind index: {0}")]
    UnknownOperation(u8),

    #[error("Wrong number of parameters for {kind}: expected {expected}, declared {actual}")]
    ParameterCountMismatch {
        kind: OperationKind,
        expected: usize,
        actual: usize,
    },

    #[error("String value is not valid UTF-8")]
    InvalidUtf8,
}

/// Errors raised while building a frame
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("Wrong number of parameters for {kind}: expected {expected}, actual {actual}")]
    ParameterCountMismatch {
        kind: OperationKind,
        expected: usize,
        actual: usize,
    },

    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Value too large for a u32 length prefix: {0} bytes")]
    ValueTooLarge(usize),
}

/// Read the correlation id from the first four bytes of a frame
///
/// Used by demultiplexers that must route a frame before fully decoding it.
pub fn peek_correlation_id(frame: &[u8]) -> Option<u32> {
    let mut head = frame.get(..4)?;
    Some(head.get_u32())
}

/// Bounds-checked big-endian reader over a received frame
#[derive(Debug)]
pub struct FrameReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Start reading at `offset` (clamped to the buffer length)
    pub fn at(buf: &'a [u8], offset: usize) -> Self {
        Self {
            buf,
            pos: offset.min(buf.len()),
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < needed {
            return Err(DecodeError::Truncated {
                needed,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?.get_u8())
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(self.take(4)?.get_u32())
    }

    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(self.take(4)?.get_i32())
    }

    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        Ok(self.take(8)?.get_i64())
    }

    /// Read a `[u32 len][bytes]` payload
    pub fn read_length_prefixed(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.read_u32()? as usize;
        self.take(len)
    }
}
