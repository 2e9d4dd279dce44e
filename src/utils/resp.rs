//! RESP (Redis Serialization Protocol) encoder and decoder
//!
//! Commands are encoded as arrays of bulk strings; replies are decoded
//! one value at a time from a buffered stream.

use std::io::{self, BufRead, Read};

/// RESP value types
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// Simple string (+OK\r\n)
    SimpleString(String),
    /// Error (-ERR message\r\n)
    Error(String),
    /// Integer (:1000\r\n)
    Integer(i64),
    /// Bulk string ($6\r\nfoobar\r\n)
    BulkString(Vec<u8>),
    /// Null bulk string or null array ($-1\r\n)
    Null,
    /// Array (*2\r\n...)
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Get as string (for simple string or bulk string)
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RespValue::SimpleString(s) => Some(s),
            RespValue::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Get as integer
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RespValue::Integer(i) => Some(*i),
            RespValue::BulkString(b) => std::str::from_utf8(b).ok()?.parse().ok(),
            _ => None,
        }
    }

    /// Get as array
    pub fn as_array(&self) -> Option<&[RespValue]> {
        match self {
            RespValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Consume into owned text, replacing invalid UTF-8
    pub fn into_text(self) -> Option<String> {
        match self {
            RespValue::SimpleString(s) => Some(s),
            RespValue::BulkString(b) => Some(match String::from_utf8(b) {
                Ok(s) => s,
                Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
            }),
            _ => None,
        }
    }

    /// Short type label for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            RespValue::SimpleString(_) => "simple-string",
            RespValue::Error(_) => "error",
            RespValue::Integer(_) => "integer",
            RespValue::BulkString(_) => "bulk-string",
            RespValue::Null => "null",
            RespValue::Array(_) => "array",
        }
    }

    /// Convert to JSON for the REST pass-through
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            RespValue::SimpleString(s) => serde_json::Value::String(s.clone()),
            RespValue::Error(e) => serde_json::json!({ "error": e }),
            RespValue::Integer(i) => serde_json::Value::from(*i),
            RespValue::BulkString(b) => {
                serde_json::Value::String(String::from_utf8_lossy(b).into_owned())
            }
            RespValue::Null => serde_json::Value::Null,
            RespValue::Array(items) => {
                serde_json::Value::Array(items.iter().map(RespValue::to_json).collect())
            }
        }
    }
}

/// RESP encoder with pre-allocated buffer
pub struct RespEncoder {
    buf: Vec<u8>,
}

impl RespEncoder {
    /// Create new encoder with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Clear buffer for reuse
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Get encoded bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Encode a command as RESP array
    /// Each argument is encoded as a bulk string
    pub fn encode_command(&mut self, args: &[&[u8]]) {
        // Array header: *<count>\r\n
        self.buf.push(b'*');
        self.write_int(args.len() as i64);
        self.buf.extend_from_slice(b"\r\n");

        // Each argument as bulk string: $<len>\r\n<data>\r\n
        for arg in args {
            self.buf.push(b'$');
            self.write_int(arg.len() as i64);
            self.buf.extend_from_slice(b"\r\n");
            self.buf.extend_from_slice(arg);
            self.buf.extend_from_slice(b"\r\n");
        }
    }

    /// Encode a command from string slices
    pub fn encode_command_str(&mut self, args: &[&str]) {
        let byte_args: Vec<&[u8]> = args.iter().map(|s| s.as_bytes()).collect();
        self.encode_command(&byte_args);
    }

    #[inline]
    fn write_int(&mut self, value: i64) {
        let mut buffer = itoa::Buffer::new();
        let s = buffer.format(value);
        self.buf.extend_from_slice(s.as_bytes());
    }
}

/// RESP decoder for streaming reads
pub struct RespDecoder<R> {
    reader: R,
    line_buf: String,
}

impl<R: BufRead> RespDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_buf: String::with_capacity(256),
        }
    }

    /// Decode next RESP value from stream
    pub fn decode(&mut self) -> io::Result<RespValue> {
        self.line_buf.clear();
        self.reader.read_line(&mut self.line_buf)?;

        if self.line_buf.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Connection closed",
            ));
        }

        let line = self.line_buf.trim_end_matches(&['\r', '\n'][..]);
        if line.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "Empty RESP line"));
        }

        let mut chars = line.chars();
        let type_char = chars.next().unwrap_or_default();
        let content = chars.as_str();

        match type_char {
            '+' => Ok(RespValue::SimpleString(content.to_string())),
            '-' => Ok(RespValue::Error(content.to_string())),
            ':' => {
                let value: i64 = content
                    .parse()
                    .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "Invalid integer"))?;
                Ok(RespValue::Integer(value))
            }
            '$' => {
                let len = parse_length(content, "bulk string")?;
                let Some(len) = len else {
                    return Ok(RespValue::Null);
                };

                // Grow as bytes arrive instead of trusting the announced length
                let mut data = Vec::with_capacity(len.min(PREALLOC_LIMIT));
                (&mut self.reader).take(len as u64).read_to_end(&mut data)?;
                if data.len() != len {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "Connection closed inside bulk string",
                    ));
                }

                // Trailing \r\n
                let mut crlf = [0u8; 2];
                self.reader.read_exact(&mut crlf)?;

                Ok(RespValue::BulkString(data))
            }
            '*' => {
                let count = parse_length(content, "array")?;
                let Some(count) = count else {
                    return Ok(RespValue::Null);
                };

                let mut elements = Vec::with_capacity(count.min(PREALLOC_LIMIT));
                for _ in 0..count {
                    elements.push(self.decode()?);
                }

                Ok(RespValue::Array(elements))
            }
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid RESP type byte: {:?}", other),
            )),
        }
    }
}

/// Largest bulk string or array the decoder accepts (the server's own bulk limit)
pub const MAX_RESP_LENGTH: usize = 512 * 1024 * 1024;

/// Upper bound for up-front allocation; longer values grow while reading
const PREALLOC_LIMIT: usize = 64 * 1024;

/// Parse a `$` / `*` length; `None` is the null marker
fn parse_length(content: &str, what: &str) -> io::Result<Option<usize>> {
    let len: i64 = content.parse().map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidData, format!("Invalid {} length", what))
    })?;
    if len < 0 {
        return Ok(None);
    }
    let len = len as u64;
    if len > MAX_RESP_LENGTH as u64 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} length {} over the {} byte limit", what, len, MAX_RESP_LENGTH),
        ));
    }
    Ok(Some(len as usize))
}
