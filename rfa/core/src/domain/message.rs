// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Request/Response Messages
//!
//! Operation kinds, response statuses and the two datagram message types
//! exchanged between client and server.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Framing and structural validation of RPC messages
//!
//! Each operation kind has a fixed arity and parameter order:
//!
//! | kind           | parameters                      |
//! |----------------|---------------------------------|
//! | `Empty`        | none                            |
//! | `Read`         | path                            |
//! | `Insert`       | offset, path, data              |
//! | `GetAttr`      | path                            |
//! | `ListDir`      | path                            |
//! | `Touch`        | path                            |
//! | `Register`     | interval_secs, path             |
//! | `Append`       | path, data                      |
//! | `FileUpdated`  | path, mtime, data (server push) |

use std::fmt;

use bytes::BufMut;
use thiserror::Error;

use crate::domain::value::{Value, ValueType};
use crate::domain::wire::{
    DecodeError, EncodeError, FrameReader, CALLBACK_REQUEST_ID, HEADER_SIZE, MAX_FRAME_SIZE,
};

/// Closed set of remote operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OperationKind {
    Empty = 0,
    Read = 1,
    Insert = 2,
    GetAttr = 3,
    ListDir = 4,
    Touch = 5,
    Register = 6,
    Append = 7,
    FileUpdated = 8,
}

impl OperationKind {
    pub const ALL: [OperationKind; 9] = [
        OperationKind::Empty,
        OperationKind::Read,
        OperationKind::Insert,
        OperationKind::GetAttr,
        OperationKind::ListDir,
        OperationKind::Touch,
        OperationKind::Register,
        OperationKind::Append,
        OperationKind::FileUpdated,
    ];

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    /// Number of parameters a request of this kind carries
    pub fn arity(self) -> usize {
        match self {
            OperationKind::Empty => 0,
            OperationKind::Read
            | OperationKind::GetAttr
            | OperationKind::ListDir
            | OperationKind::Touch => 1,
            OperationKind::Register | OperationKind::Append => 2,
            OperationKind::Insert | OperationKind::FileUpdated => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Empty => "EMPTY",
            OperationKind::Read => "READ",
            OperationKind::Insert => "INSERT",
            OperationKind::GetAttr => "GET_ATTR",
            OperationKind::ListDir => "LIST_DIR",
            OperationKind::Touch => "TOUCH",
            OperationKind::Register => "REGISTER",
            OperationKind::Append => "APPEND",
            OperationKind::FileUpdated => "FILE_UPDATED",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    Ok = 0,
    BadRequest = 1,
    NotFound = 2,
    InternalError = 3,
    Unknown = 4,
}

impl Status {
    /// Out-of-range indices map to `Unknown`
    pub fn from_index(index: u8) -> Self {
        match index {
            0 => Status::Ok,
            1 => Status::BadRequest,
            2 => Status::NotFound,
            3 => Status::InternalError,
            _ => Status::Unknown,
        }
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Ok => "OK",
            Status::BadRequest => "BAD_REQUEST",
            Status::NotFound => "NOT_FOUND",
            Status::InternalError => "INTERNAL_ERROR",
            Status::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// A request parameter is absent or has the wrong type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParameterError {
    #[error("Bad parameter '{name}' for {kind}: expected {expected}")]
    BadParameter {
        kind: OperationKind,
        name: &'static str,
        expected: ValueType,
    },

    #[error("{kind} has no parameter '{name}'")]
    NotApplicable {
        kind: OperationKind,
        name: &'static str,
    },
}

/// An RPC request datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub id: u32,
    pub kind: OperationKind,
    pub params: Vec<Value>,
}

impl Request {
    /// Build a request from raw parameters; arity is checked at encode time
    pub fn new(id: u32, kind: OperationKind, params: Vec<Value>) -> Self {
        Self { id, kind, params }
    }

    pub fn empty(id: u32) -> Self {
        Self::new(id, OperationKind::Empty, Vec::new())
    }

    pub fn read(id: u32, path: impl Into<String>) -> Self {
        Self::new(id, OperationKind::Read, vec![Value::Str(path.into())])
    }

    pub fn insert(id: u32, path: impl Into<String>, offset: i32, data: Vec<u8>) -> Self {
        Self::new(
            id,
            OperationKind::Insert,
            vec![Value::Int32(offset), Value::Str(path.into()), Value::Bytes(data)],
        )
    }

    pub fn get_attr(id: u32, path: impl Into<String>) -> Self {
        Self::new(id, OperationKind::GetAttr, vec![Value::Str(path.into())])
    }

    pub fn list_dir(id: u32, path: impl Into<String>) -> Self {
        Self::new(id, OperationKind::ListDir, vec![Value::Str(path.into())])
    }

    pub fn touch(id: u32, path: impl Into<String>) -> Self {
        Self::new(id, OperationKind::Touch, vec![Value::Str(path.into())])
    }

    pub fn register(id: u32, path: impl Into<String>, interval_secs: i32) -> Self {
        Self::new(
            id,
            OperationKind::Register,
            vec![Value::Int32(interval_secs), Value::Str(path.into())],
        )
    }

    pub fn append(id: u32, path: impl Into<String>, data: Vec<u8>) -> Self {
        Self::new(
            id,
            OperationKind::Append,
            vec![Value::Str(path.into()), Value::Bytes(data)],
        )
    }

    /// Unsolicited server push; always carries the reserved id
    pub fn file_updated(path: impl Into<String>, mtime: i64, data: Vec<u8>) -> Self {
        Self::new(
            CALLBACK_REQUEST_ID,
            OperationKind::FileUpdated,
            vec![Value::Str(path.into()), Value::Int64(mtime), Value::Bytes(data)],
        )
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.params.iter().map(Value::encoded_len).sum::<usize>()
    }

    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let expected = self.kind.arity();
        if self.params.len() != expected {
            return Err(EncodeError::ParameterCountMismatch {
                kind: self.kind,
                expected,
                actual: self.params.len(),
            });
        }
        let size = self.encoded_len();
        if size > MAX_FRAME_SIZE {
            return Err(EncodeError::FrameTooLarge {
                size,
                max: MAX_FRAME_SIZE,
            });
        }

        let mut out = Vec::with_capacity(size);
        out.put_u32(self.id);
        out.put_u8(self.kind.index());
        out.put_u32(expected as u32);
        for param in &self.params {
            param.encode(&mut out)?;
        }
        Ok(out)
    }

    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = FrameReader::new(frame);
        let id = reader.read_u32()?;
        let index = reader.read_u8()?;
        let kind = OperationKind::from_index(index).ok_or(DecodeError::UnknownOperation(index))?;
        let declared = reader.read_u32()? as usize;
        if declared != kind.arity() {
            return Err(DecodeError::ParameterCountMismatch {
                kind,
                expected: kind.arity(),
                actual: declared,
            });
        }

        let mut params = Vec::with_capacity(declared);
        for _ in 0..declared {
            params.push(Value::read(&mut reader)?);
        }
        Ok(Self { id, kind, params })
    }

    fn param_index(&self, name: &'static str) -> Result<usize, ParameterError> {
        use OperationKind::*;
        let index = match (self.kind, name) {
            (Read | GetAttr | ListDir | Touch | Append | FileUpdated, "path") => 0,
            (Insert | Register, "path") => 1,
            (Insert, "offset") => 0,
            (Register, "interval_secs") => 0,
            (FileUpdated, "mtime") => 1,
            (Append, "data") => 1,
            (Insert | FileUpdated, "data") => 2,
            _ => {
                return Err(ParameterError::NotApplicable {
                    kind: self.kind,
                    name,
                })
            }
        };
        Ok(index)
    }

    fn bad(&self, name: &'static str, expected: ValueType) -> ParameterError {
        ParameterError::BadParameter {
            kind: self.kind,
            name,
            expected,
        }
    }

    pub fn path(&self) -> Result<&str, ParameterError> {
        let index = self.param_index("path")?;
        self.params
            .get(index)
            .and_then(Value::as_str)
            .ok_or_else(|| self.bad("path", ValueType::Str))
    }

    pub fn offset(&self) -> Result<i32, ParameterError> {
        let index = self.param_index("offset")?;
        self.params
            .get(index)
            .and_then(Value::as_i32)
            .ok_or_else(|| self.bad("offset", ValueType::Int32))
    }

    pub fn interval_secs(&self) -> Result<i32, ParameterError> {
        let index = self.param_index("interval_secs")?;
        self.params
            .get(index)
            .and_then(Value::as_i32)
            .ok_or_else(|| self.bad("interval_secs", ValueType::Int32))
    }

    pub fn mtime(&self) -> Result<i64, ParameterError> {
        let index = self.param_index("mtime")?;
        self.params
            .get(index)
            .and_then(Value::as_i64)
            .ok_or_else(|| self.bad("mtime", ValueType::Int64))
    }

    pub fn data(&self) -> Result<&[u8], ParameterError> {
        let index = self.param_index("data")?;
        self.params
            .get(index)
            .and_then(Value::as_bytes)
            .ok_or_else(|| self.bad("data", ValueType::Bytes))
    }
}

/// An RPC response datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub id: u32,
    pub status: Status,
    pub values: Vec<Value>,
}

impl Response {
    pub fn ok(id: u32, values: Vec<Value>) -> Self {
        Self {
            id,
            status: Status::Ok,
            values,
        }
    }

    /// Error responses carry no values
    pub fn status_only(id: u32, status: Status) -> Self {
        Self {
            id,
            status,
            values: Vec::new(),
        }
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.values.iter().map(Value::encoded_len).sum::<usize>()
    }

    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let size = self.encoded_len();
        if size > MAX_FRAME_SIZE {
            return Err(EncodeError::FrameTooLarge {
                size,
                max: MAX_FRAME_SIZE,
            });
        }

        let mut out = Vec::with_capacity(size);
        out.put_u32(self.id);
        out.put_u8(self.status.index());
        out.put_u32(self.values.len() as u32);
        for value in &self.values {
            value.encode(&mut out)?;
        }
        Ok(out)
    }

    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = FrameReader::new(frame);
        let id = reader.read_u32()?;
        let status = Status::from_index(reader.read_u8()?);
        let count = reader.read_u32()? as usize;

        // Every value is at least a tag plus four bytes
        let mut values = Vec::with_capacity(count.min(reader.remaining() / 5));
        for _ in 0..count {
            values.push(Value::read(&mut reader)?);
        }
        Ok(Self { id, status, values })
    }

    /// Free-form diagnostic some peers attach to error responses
    pub fn diagnostic(&self) -> Option<&str> {
        if self.status.is_ok() {
            return None;
        }
        self.values.first().and_then(Value::as_str)
    }

    pub fn int64_at(&self, index: usize) -> Option<i64> {
        self.values.get(index).and_then(Value::as_i64)
    }

    pub fn bytes_at(&self, index: usize) -> Option<&[u8]> {
        self.values.get(index).and_then(Value::as_bytes)
    }
}
