//! Wire records exchanged between peers.
//!
//! Records are fixed-size little-endian layouts with fields in declaration
//! order. They carry no version tag and no length prefix; the transport frame
//! supplies the tag and the byte count.

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::error::ProtocolError;

/// Message kind carried in every transport frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    Get,
    GetResponse,
    Bulk,
}

impl Tag {
    pub fn code(self) -> u32 {
        match self {
            Tag::Get => 1,
            Tag::GetResponse => 2,
            Tag::Bulk => 3,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Tag::Get),
            2 => Some(Tag::GetResponse),
            3 => Some(Tag::Bulk),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub key: i32,
}

impl Request {
    pub const SIZE: usize = 4;

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_i32_le(self.key);
        buf.freeze()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let raw: [u8; Self::SIZE] = bytes.try_into().map_err(|_| ProtocolError::RecordSize {
            tag: Tag::Get,
            expected: Self::SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self {
            key: i32::from_le_bytes(raw),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    pub key: i32,
    pub value: i32,
}

impl Response {
    pub const SIZE: usize = 8;

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_i32_le(self.key);
        buf.put_i32_le(self.value);
        buf.freeze()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() != Self::SIZE {
            return Err(ProtocolError::RecordSize {
                tag: Tag::GetResponse,
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }
        let (key, value) = bytes.split_at(4);
        Ok(Self {
            key: i32::from_le_bytes([key[0], key[1], key[2], key[3]]),
            value: i32::from_le_bytes([value[0], value[1], value[2], value[3]]),
        })
    }
}
