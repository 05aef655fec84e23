//! RESP wire values: parser and encoder.
//!
//! Requests, replies, propagated frames and the replication backlog all
//! use this representation. The parser distinguishes an incomplete buffer
//! (`Ok(None)`, wait for more bytes) from a malformed one (`Err`), so the
//! connection layer can keep accumulating partial commands.

use bytes::Bytes;

#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Option<Vec<u8>>),
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    #[inline]
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    #[inline]
    pub fn queued() -> Self {
        RespValue::SimpleString("QUEUED".to_string())
    }

    #[inline]
    pub fn simple(s: &str) -> Self {
        RespValue::SimpleString(s.to_string())
    }

    #[inline]
    pub fn err(msg: &str) -> Self {
        RespValue::Error(msg.to_string())
    }

    #[inline]
    pub fn nil() -> Self {
        RespValue::BulkString(None)
    }

    /// The null multi-bulk reply: how a CAS-cancelled EXEC reports itself.
    #[inline]
    pub fn null_array() -> Self {
        RespValue::Array(None)
    }

    #[inline]
    pub fn bulk(data: impl Into<Vec<u8>>) -> Self {
        RespValue::BulkString(Some(data.into()))
    }
}

pub struct RespParser;

impl RespParser {
    /// Parse one value from the front of `input`.
    ///
    /// Returns `Ok(Some((value, consumed)))` on success, `Ok(None)` when the
    /// buffer holds only a prefix of a value, and `Err` on malformed input.
    pub fn parse(input: &[u8]) -> Result<Option<(RespValue, usize)>, String> {
        if input.is_empty() {
            return Ok(None);
        }

        match input[0] {
            b'+' => Self::parse_line(input, |s| RespValue::SimpleString(s)),
            b'-' => Self::parse_line(input, |s| RespValue::Error(s)),
            b':' => Self::parse_integer(input),
            b'$' => Self::parse_bulk_string(input),
            b'*' => Self::parse_array(input),
            other => Err(format!("unknown RESP type byte: {}", other as char)),
        }
    }

    fn parse_line(
        input: &[u8],
        wrap: fn(String) -> RespValue,
    ) -> Result<Option<(RespValue, usize)>, String> {
        match Self::find_crlf(input) {
            Some(pos) => {
                let s = String::from_utf8_lossy(&input[1..pos]).to_string();
                Ok(Some((wrap(s), pos + 2)))
            }
            None => Ok(None),
        }
    }

    fn parse_integer(input: &[u8]) -> Result<Option<(RespValue, usize)>, String> {
        match Self::find_crlf(input) {
            Some(pos) => {
                let s = String::from_utf8_lossy(&input[1..pos]);
                let n = s.parse::<i64>().map_err(|e| e.to_string())?;
                Ok(Some((RespValue::Integer(n), pos + 2)))
            }
            None => Ok(None),
        }
    }

    fn parse_bulk_string(input: &[u8]) -> Result<Option<(RespValue, usize)>, String> {
        let Some(pos) = Self::find_crlf(input) else {
            return Ok(None);
        };
        let len_str = String::from_utf8_lossy(&input[1..pos]);
        let len = len_str.parse::<i64>().map_err(|e| e.to_string())?;

        if len == -1 {
            return Ok(Some((RespValue::BulkString(None), pos + 2)));
        }
        if len < 0 {
            return Err(format!("invalid bulk string length: {}", len));
        }

        let start = pos + 2;
        let end = start + len as usize;
        if end + 2 > input.len() {
            return Ok(None);
        }
        if &input[end..end + 2] != b"\r\n" {
            return Err("bulk string missing trailing CRLF".to_string());
        }

        let data = input[start..end].to_vec();
        Ok(Some((RespValue::BulkString(Some(data)), end + 2)))
    }

    fn parse_array(input: &[u8]) -> Result<Option<(RespValue, usize)>, String> {
        let Some(pos) = Self::find_crlf(input) else {
            return Ok(None);
        };
        let len_str = String::from_utf8_lossy(&input[1..pos]);
        let len = len_str.parse::<i64>().map_err(|e| e.to_string())?;

        if len == -1 {
            return Ok(Some((RespValue::Array(None), pos + 2)));
        }
        if len < 0 {
            return Err(format!("invalid array length: {}", len));
        }

        let mut elements = Vec::with_capacity(len as usize);
        let mut offset = pos + 2;

        for _ in 0..len {
            match Self::parse(&input[offset..])? {
                Some((value, consumed)) => {
                    elements.push(value);
                    offset += consumed;
                }
                None => return Ok(None),
            }
        }

        Ok(Some((RespValue::Array(Some(elements)), offset)))
    }

    fn find_crlf(input: &[u8]) -> Option<usize> {
        input.windows(2).position(|w| w == b"\r\n")
    }

    pub fn encode(value: &RespValue) -> Vec<u8> {
        match value {
            RespValue::SimpleString(s) => format!("+{}\r\n", s).into_bytes(),
            RespValue::Error(s) => format!("-{}\r\n", s).into_bytes(),
            RespValue::Integer(n) => format!(":{}\r\n", n).into_bytes(),
            RespValue::BulkString(None) => b"$-1\r\n".to_vec(),
            RespValue::BulkString(Some(data)) => {
                let mut out = format!("${}\r\n", data.len()).into_bytes();
                out.extend_from_slice(data);
                out.extend_from_slice(b"\r\n");
                out
            }
            RespValue::Array(None) => b"*-1\r\n".to_vec(),
            RespValue::Array(Some(elements)) => {
                let mut out = format!("*{}\r\n", elements.len()).into_bytes();
                for element in elements {
                    out.extend_from_slice(&Self::encode(element));
                }
                out
            }
        }
    }
}

/// Encode a raw argument vector as a RESP array of bulk strings.
///
/// This is the frame format fed to the write-ahead log and the replication
/// backlog, and the format in which clients send commands.
pub fn encode_command_frame(argv: &[Bytes]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", argv.len()).into_bytes();
    for arg in argv {
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Extract a raw argument vector from a parsed client request.
///
/// Requests must be arrays of bulk strings; anything else is a protocol
/// error and the connection is dropped.
pub fn request_argv(value: &RespValue) -> Result<Vec<Bytes>, String> {
    match value {
        RespValue::Array(Some(elements)) if !elements.is_empty() => elements
            .iter()
            .map(|e| match e {
                RespValue::BulkString(Some(data)) => Ok(Bytes::from(data.clone())),
                _ => Err("protocol error: expected bulk string".to_string()),
            })
            .collect(),
        _ => Err("protocol error: expected non-empty array".to_string()),
    }
}
