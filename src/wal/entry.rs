//! Log record definitions
//!
//! Defines the logical mutations the log stores and their byte encoding.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{BufMut, BytesMut};

/// A single logged mutation
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// Store a value, optionally with an absolute deadline
    Set {
        key: Arc<str>,
        value: Arc<str>,
        expires_at: Option<SystemTime>,
    },

    /// Remove a key
    Delete { key: Arc<str> },

    /// Remove every key
    FlushDb,
}

impl Record {
    /// Append the encoded record to `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Record::Set {
                key,
                value,
                expires_at: None,
            } => {
                put_array_header(buf, 3);
                put_bulk(buf, b"set");
                put_bulk(buf, key.as_bytes());
                put_bulk(buf, value.as_bytes());
            }
            Record::Set {
                key,
                value,
                expires_at: Some(deadline),
            } => {
                put_array_header(buf, 5);
                put_bulk(buf, b"set");
                put_bulk(buf, key.as_bytes());
                put_bulk(buf, value.as_bytes());
                put_bulk(buf, b"pxat");
                put_bulk(buf, to_unix_millis(*deadline).to_string().as_bytes());
            }
            Record::Delete { key } => {
                put_array_header(buf, 2);
                put_bulk(buf, b"del");
                put_bulk(buf, key.as_bytes());
            }
            Record::FlushDb => {
                put_array_header(buf, 1);
                put_bulk(buf, b"flushdb");
            }
        }
    }

    /// Encode into a fresh buffer
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf
    }
}

fn put_array_header(buf: &mut BytesMut, len: usize) {
    buf.put_u8(b'*');
    buf.put_slice(len.to_string().as_bytes());
    buf.put_slice(b"\r\n");
}

fn put_bulk(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u8(b'$');
    buf.put_slice(data.len().to_string().as_bytes());
    buf.put_slice(b"\r\n");
    buf.put_slice(data);
    buf.put_slice(b"\r\n");
}

pub(crate) fn to_unix_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub(crate) fn from_unix_millis(millis: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(millis)
}
