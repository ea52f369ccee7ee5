//! RESP2 (REdis Serialization Protocol) frames
//!
//! Incremental parser: [`RespValue::parse`] returns `Ok(None)` until a whole
//! frame is buffered and only then consumes its bytes.

use std::io::Cursor;

use bytes::{Buf, BufMut, BytesMut};

/// Maximum bulk string size (512MB)
const MAX_BULK_STRING_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array size (1M elements)
const MAX_ARRAY_SIZE: usize = 1024 * 1024;

/// Malformed RESP input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// First byte is not a RESP type marker
    #[error("unknown RESP type byte {0:#04x}")]
    UnknownType(u8),
    /// A length or integer line did not parse
    #[error("invalid number `{0}`")]
    InvalidNumber(String),
    /// A simple string or error line is not UTF-8
    #[error("invalid UTF-8 in line")]
    InvalidUtf8,
    /// Bulk string larger than the limit
    #[error("bulk string too large: {0} bytes")]
    BulkTooLarge(usize),
    /// Array longer than the limit
    #[error("array too large: {0} elements")]
    ArrayTooLarge(usize),
    /// Bulk payload not followed by CRLF
    #[error("expected CRLF after bulk string")]
    MissingCrlf,
}

type ParseResult = Result<Option<RespValue>, FrameError>;

/// RESP data types
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// Simple string: +OK\r\n
    SimpleString(String),
    /// Error: -Error message\r\n
    Error(String),
    /// Integer: :1000\r\n
    Integer(i64),
    /// Bulk string: $6\r\nfoobar\r\n
    BulkString(Option<Vec<u8>>),
    /// Array: *2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    /// Build a command frame: an array of bulk strings
    pub fn command<I, A>(args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Vec<u8>>,
    {
        RespValue::Array(Some(
            args.into_iter()
                .map(|arg| RespValue::BulkString(Some(arg.into())))
                .collect(),
        ))
    }

    /// Append the wire form to `out`
    pub fn write_to(&self, out: &mut BytesMut) {
        match self {
            RespValue::SimpleString(s) => write_line(out, b'+', s.as_bytes()),
            RespValue::Error(e) => write_line(out, b'-', e.as_bytes()),
            RespValue::Integer(i) => write_line(out, b':', i.to_string().as_bytes()),
            RespValue::BulkString(None) => out.put_slice(b"$-1\r\n"),
            RespValue::BulkString(Some(data)) => {
                write_line(out, b'$', data.len().to_string().as_bytes());
                out.put_slice(data);
                out.put_slice(b"\r\n");
            }
            RespValue::Array(None) => out.put_slice(b"*-1\r\n"),
            RespValue::Array(Some(items)) => {
                write_line(out, b'*', items.len().to_string().as_bytes());
                for item in items {
                    item.write_to(out);
                }
            }
        }
    }

    /// Serialize to RESP format
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = BytesMut::new();
        self.write_to(&mut out);
        out.to_vec()
    }

    /// Parse one frame from the front of `buf`
    pub fn parse(buf: &mut BytesMut) -> ParseResult {
        if buf.is_empty() {
            return Ok(None);
        }

        let mut cursor = Cursor::new(&buf[..]);
        let value = parse_value(&mut cursor)?;
        if value.is_some() {
            let consumed = cursor.position() as usize;
            buf.advance(consumed);
        }
        Ok(value)
    }

    /// Payload of a bulk string, if this is one
    pub fn as_bulk(&self) -> Option<&[u8]> {
        match self {
            RespValue::BulkString(Some(data)) => Some(data),
            _ => None,
        }
    }
}

fn write_line(out: &mut BytesMut, marker: u8, body: &[u8]) {
    out.put_u8(marker);
    out.put_slice(body);
    out.put_slice(b"\r\n");
}

fn parse_value(cursor: &mut Cursor<&[u8]>) -> ParseResult {
    if !cursor.has_remaining() {
        return Ok(None);
    }

    match cursor.get_u8() {
        b'+' => Ok(read_text(cursor)?.map(RespValue::SimpleString)),
        b'-' => Ok(read_text(cursor)?.map(RespValue::Error)),
        b':' => Ok(read_number(cursor)?.map(RespValue::Integer)),
        b'$' => parse_bulk_string(cursor),
        b'*' => parse_array(cursor),
        other => Err(FrameError::UnknownType(other)),
    }
}

fn parse_bulk_string(cursor: &mut Cursor<&[u8]>) -> ParseResult {
    let len = match read_number(cursor)? {
        Some(len) => len,
        None => return Ok(None),
    };
    if len < 0 {
        return Ok(Some(RespValue::BulkString(None)));
    }

    let len = len as usize;
    if len > MAX_BULK_STRING_SIZE {
        return Err(FrameError::BulkTooLarge(len));
    }
    if cursor.remaining() < len + 2 {
        return Ok(None);
    }

    let mut data = vec![0u8; len];
    cursor.copy_to_slice(&mut data);
    if cursor.get_u8() != b'\r' || cursor.get_u8() != b'\n' {
        return Err(FrameError::MissingCrlf);
    }

    Ok(Some(RespValue::BulkString(Some(data))))
}

fn parse_array(cursor: &mut Cursor<&[u8]>) -> ParseResult {
    let len = match read_number(cursor)? {
        Some(len) => len,
        None => return Ok(None),
    };
    if len < 0 {
        return Ok(Some(RespValue::Array(None)));
    }

    let len = len as usize;
    if len > MAX_ARRAY_SIZE {
        return Err(FrameError::ArrayTooLarge(len));
    }

    let mut items = Vec::with_capacity(len);
    for _ in 0..len {
        match parse_value(cursor)? {
            Some(item) => items.push(item),
            None => return Ok(None),
        }
    }

    Ok(Some(RespValue::Array(Some(items))))
}

fn read_text(cursor: &mut Cursor<&[u8]>) -> Result<Option<String>, FrameError> {
    match read_line(cursor) {
        Some(line) => String::from_utf8(line.to_vec())
            .map(Some)
            .map_err(|_| FrameError::InvalidUtf8),
        None => Ok(None),
    }
}

fn read_number(cursor: &mut Cursor<&[u8]>) -> Result<Option<i64>, FrameError> {
    let line = match read_line(cursor) {
        Some(line) => line,
        None => return Ok(None),
    };
    let text = std::str::from_utf8(line).map_err(|_| FrameError::InvalidUtf8)?;
    text.parse::<i64>()
        .map(Some)
        .map_err(|_| FrameError::InvalidNumber(text.to_string()))
}

/// Next CRLF-terminated line, without the terminator
fn read_line<'a>(cursor: &mut Cursor<&'a [u8]>) -> Option<&'a [u8]> {
    let data: &'a [u8] = *cursor.get_ref();
    let start = cursor.position() as usize;
    let end = start + data[start..].windows(2).position(|window| window == b"\r\n")?;
    cursor.set_position((end + 2) as u64);
    Some(&data[start..end])
}
