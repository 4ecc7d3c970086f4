//! Log reader
//!
//! Decodes records sequentially from any buffered byte source.

use std::io::{BufRead, Read};
use std::sync::Arc;

use super::entry::from_unix_millis;
use super::Record;
use crate::error::{AtlasError, Result};

/// Largest number of elements a record array may have
const MAX_ARRAY_LEN: usize = 5;

/// Longest `*<n>` or `$<len>` header line, terminator included
const MAX_HEADER_LEN: usize = 32;

/// Largest bulk string a record may carry
const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// What the reader found at the current position
#[derive(Debug, PartialEq)]
pub enum ReadOutcome {
    /// A complete, well-formed record
    Record(Record),

    /// Clean end of input
    End,

    /// Input ended in the middle of a record
    Torn,
}

/// Reads records from a log
pub struct WalReader<R> {
    reader: R,
    /// Offset just past the last complete record
    offset: u64,
}

impl<R: BufRead> WalReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, offset: 0 }
    }

    /// Byte offset just past the last complete record read
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read the next record
    ///
    /// Returns `Torn` when input ends inside a record and `Corruption` for
    /// anything that is not a record.
    pub fn next_record(&mut self) -> Result<ReadOutcome> {
        if self.reader.fill_buf()?.is_empty() {
            return Ok(ReadOutcome::End);
        }

        let start = self.offset;
        let mut consumed = 0u64;

        let header = match self.line(start, &mut consumed)? {
            Some(line) => line,
            None => return Ok(ReadOutcome::Torn),
        };
        let count = parse_len(start, &header, b'*')?;
        if count == 0 || count > MAX_ARRAY_LEN {
            return Err(AtlasError::corruption(
                start,
                format!("unexpected array length {count}"),
            ));
        }

        let mut args = Vec::with_capacity(count);
        for _ in 0..count {
            match self.bulk(start, &mut consumed)? {
                Some(arg) => args.push(arg),
                None => return Ok(ReadOutcome::Torn),
            }
        }

        let record = decode(start, args)?;
        self.offset += consumed;
        Ok(ReadOutcome::Record(record))
    }

    /// One `\r\n`-terminated line without its terminator; None at EOF
    fn line(&mut self, start: u64, consumed: &mut u64) -> Result<Option<Vec<u8>>> {
        let mut buf = Vec::new();
        let n = (&mut self.reader)
            .take(MAX_HEADER_LEN as u64)
            .read_until(b'\n', &mut buf)?;
        *consumed += n as u64;

        if buf.last() != Some(&b'\n') {
            if n == MAX_HEADER_LEN {
                return Err(AtlasError::corruption(start, "header line too long"));
            }
            return Ok(None);
        }
        if !buf.ends_with(b"\r\n") {
            return Err(AtlasError::corruption(start, "line not terminated by CRLF"));
        }
        buf.truncate(buf.len() - 2);
        Ok(Some(buf))
    }

    /// One `$<len>\r\n<data>\r\n` bulk string; None at EOF
    fn bulk(&mut self, start: u64, consumed: &mut u64) -> Result<Option<Vec<u8>>> {
        let header = match self.line(start, consumed)? {
            Some(line) => line,
            None => return Ok(None),
        };
        let len = parse_len(start, &header, b'$')?;
        let framed = match len.checked_add(2) {
            Some(framed) if len <= MAX_BULK_LEN => framed,
            _ => return Err(AtlasError::corruption(start, "invalid length")),
        };

        let mut data = Vec::with_capacity(framed.min(64 * 1024));
        let n = (&mut self.reader)
            .take(framed as u64)
            .read_to_end(&mut data)?;
        *consumed += n as u64;

        if n < framed {
            return Ok(None);
        }
        if !data.ends_with(b"\r\n") {
            return Err(AtlasError::corruption(start, "bulk string not terminated by CRLF"));
        }
        data.truncate(len);
        Ok(Some(data))
    }
}

fn parse_len(start: u64, line: &[u8], marker: u8) -> Result<usize> {
    let digits = match line.split_first() {
        Some((m, digits)) if *m == marker => digits,
        _ => {
            return Err(AtlasError::corruption(
                start,
                format!("expected '{}'", marker as char),
            ))
        }
    };
    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| AtlasError::corruption(start, "invalid length"))
}

fn decode(start: u64, args: Vec<Vec<u8>>) -> Result<Record> {
    let mut args = args
        .into_iter()
        .map(|arg| String::from_utf8(arg).map_err(|_| AtlasError::corruption(start, "invalid utf-8")))
        .collect::<Result<Vec<String>>>()?;

    let command = args[0].to_ascii_lowercase();
    match (command.as_str(), args.len()) {
        ("set", 3) => {
            let value = args.pop().unwrap_or_default();
            let key = args.pop().unwrap_or_default();
            Ok(Record::Set {
                key: Arc::from(key),
                value: Arc::from(value),
                expires_at: None,
            })
        }
        ("set", 5) => {
            if !args[3].eq_ignore_ascii_case("pxat") {
                return Err(AtlasError::corruption(start, format!("unknown set option {:?}", args[3])));
            }
            let millis = args[4]
                .parse::<u64>()
                .map_err(|_| AtlasError::corruption(start, "invalid expiry"))?;
            Ok(Record::Set {
                key: Arc::from(args[1].as_str()),
                value: Arc::from(args[2].as_str()),
                expires_at: Some(from_unix_millis(millis)),
            })
        }
        ("del", 2) => Ok(Record::Delete {
            key: Arc::from(args[1].as_str()),
        }),
        ("flushdb", 1) => Ok(Record::FlushDb),
        (other, n) => Err(AtlasError::corruption(
            start,
            format!("unknown command {other:?} with {n} arguments"),
        )),
    }
}
