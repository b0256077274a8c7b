// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Value Codec
//!
//! Tagged scalar and blob values carried as RPC parameters and results.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Self-describing encoding of a single parameter

use std::fmt;

use bytes::BufMut;

use crate::domain::wire::{DecodeError, EncodeError, FrameReader};

/// Type tag written before every encoded value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueType {
    Str = 0,
    Bytes = 1,
    Int32 = 2,
    Int64 = 3,
}

impl ValueType {
    pub fn from_tag(tag: u8) -> Result<Self, DecodeError> {
        match tag {
            0 => Ok(ValueType::Str),
            1 => Ok(ValueType::Bytes),
            2 => Ok(ValueType::Int32),
            3 => Ok(ValueType::Int64),
            other => Err(DecodeError::UnknownValueType(other)),
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Str => "string",
            ValueType::Bytes => "bytes",
            ValueType::Int32 => "int32",
            ValueType::Int64 => "int64",
        };
        f.write_str(name)
    }
}

/// A single RPC parameter or result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Bytes(Vec<u8>),
    Int32(i32),
    Int64(i64),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Str(_) => ValueType::Str,
            Value::Bytes(_) => ValueType::Bytes,
            Value::Int32(_) => ValueType::Int32,
            Value::Int64(_) => ValueType::Int64,
        }
    }

    /// Bytes this value occupies on the wire, tag included
    pub fn encoded_len(&self) -> usize {
        1 + match self {
            Value::Str(s) => 4 + s.len(),
            Value::Bytes(b) => 4 + b.len(),
            Value::Int32(_) => 4,
            Value::Int64(_) => 8,
        }
    }

    /// Append the tagged encoding of this value to `out`
    pub fn encode<B: BufMut>(&self, out: &mut B) -> Result<(), EncodeError> {
        out.put_u8(self.value_type().tag());
        match self {
            Value::Str(s) => put_length_prefixed(out, s.as_bytes())?,
            Value::Bytes(b) => put_length_prefixed(out, b)?,
            Value::Int32(v) => out.put_i32(*v),
            Value::Int64(v) => out.put_i64(*v),
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode(&mut out)?;
        Ok(out)
    }

    /// Decode one value starting at `offset`, returning it with the offset
    /// just past its last byte
    pub fn decode(buf: &[u8], offset: usize) -> Result<(Value, usize), DecodeError> {
        let mut reader = FrameReader::at(buf, offset);
        let value = Self::read(&mut reader)?;
        Ok((value, reader.position()))
    }

    pub(crate) fn read(reader: &mut FrameReader<'_>) -> Result<Value, DecodeError> {
        let value = match ValueType::from_tag(reader.read_u8()?)? {
            ValueType::Str => {
                let raw = reader.read_length_prefixed()?;
                let s = std::str::from_utf8(raw).map_err(|_| DecodeError::InvalidUtf8)?;
                Value::Str(s.to_string())
            }
            ValueType::Bytes => Value::Bytes(reader.read_length_prefixed()?.to_vec()),
            ValueType::Int32 => Value::Int32(reader.read_i32()?),
            ValueType::Int64 => Value::Int64(reader.read_i64()?),
        };
        Ok(value)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }
}

fn put_length_prefixed<B: BufMut>(out: &mut B, payload: &[u8]) -> Result<(), EncodeError> {
    let len = u32::try_from(payload.len()).map_err(|_| EncodeError::ValueTooLarge(payload.len()))?;
    out.put_u32(len);
    out.put_slice(payload);
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_layout() {
        let bytes = Value::from("ab").to_bytes().unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 0, 2, b'a', b'b']);
    }

    #[test]
    fn test_int_layout_is_big_endian() {
        assert_eq!(Value::Int32(0x0102_0304).to_bytes().unwrap(), vec![2, 1, 2, 3, 4]);
        assert_eq!(
            Value::Int64(1).to_bytes().unwrap(),
            vec![3, 0, 0, 0, 0, 0, 0, 0, 1]
        );
    }

    #[test]
    fn test_encoded_len_matches_output() {
        let values = [
            Value::from(""),
            Value::Bytes(vec![0xff; 17]),
            Value::Int32(-7),
            Value::Int64(i64::MIN),
        ];
        for value in values {
            assert_eq!(value.encoded_len(), value.to_bytes().unwrap().len());
        }
    }

    #[test]
    fn test_decode_at_offset_returns_next_offset() {
        let mut frame = vec![0xaa, 0xbb];
        Value::Int32(42).encode(&mut frame).unwrap();
        Value::from("x").encode(&mut frame).unwrap();

        let (first, next) = Value::decode(&frame, 2).unwrap();
        assert_eq!(first, Value::Int32(42));
        assert_eq!(next, 7);

        let (second, end) = Value::decode(&frame, next).unwrap();
        assert_eq!(second, Value::from("x"));
        assert_eq!(end, frame.len());
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        assert_eq!(
            Value::decode(&[9, 0, 0, 0, 0], 0),
            Err(DecodeError::UnknownValueType(9))
        );
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        let frame = [0, 0, 0, 0, 2, 0xc3, 0x28];
        assert_eq!(Value::decode(&frame, 0), Err(DecodeError::InvalidUtf8));
    }

    #[test]
    fn test_truncated_blob_is_rejected() {
        let frame = [1, 0, 0, 0, 10, 1, 2];
        assert!(matches!(
            Value::decode(&frame, 0),
            Err(DecodeError::Truncated { .. })
        ));
    }
}
