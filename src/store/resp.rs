//! RESP2 reply parsing and command encoding for the store client

use bytes::{BufMut, BytesMut};

#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Option<Vec<u8>>),
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    /// Render a reply for error messages, truncated to keep logs readable
    pub fn describe(&self) -> String {
        let mut text = format!("{:?}", self);
        if text.len() > 120 {
            let mut cut = 120;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
            text.push_str("...");
        }
        text
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespError {
    /// More bytes are needed to finish the frame
    Incomplete,
    Invalid(String),
}

pub struct RespParser;

impl RespParser {
    /// Parse one reply frame, returning it with the number of bytes consumed
    pub fn parse(input: &[u8]) -> Result<(RespValue, usize), RespError> {
        if input.is_empty() {
            return Err(RespError::Incomplete);
        }

        match input[0] {
            b'+' => Self::parse_simple_string(input),
            b'-' => Self::parse_error(input),
            b':' => Self::parse_integer(input),
            b'$' => Self::parse_bulk_string(input),
            b'*' => Self::parse_array(input),
            other => Err(RespError::Invalid(format!(
                "Unknown RESP type: {}",
                other as char
            ))),
        }
    }

    fn parse_simple_string(input: &[u8]) -> Result<(RespValue, usize), RespError> {
        let pos = Self::find_crlf(input).ok_or(RespError::Incomplete)?;
        let s = String::from_utf8_lossy(&input[1..pos]).to_string();
        Ok((RespValue::SimpleString(s), pos + 2))
    }

    fn parse_error(input: &[u8]) -> Result<(RespValue, usize), RespError> {
        let pos = Self::find_crlf(input).ok_or(RespError::Incomplete)?;
        let s = String::from_utf8_lossy(&input[1..pos]).to_string();
        Ok((RespValue::Error(s), pos + 2))
    }

    fn parse_integer(input: &[u8]) -> Result<(RespValue, usize), RespError> {
        let pos = Self::find_crlf(input).ok_or(RespError::Incomplete)?;
        let n = Self::parse_length(&input[1..pos])?;
        Ok((RespValue::Integer(n), pos + 2))
    }

    fn parse_bulk_string(input: &[u8]) -> Result<(RespValue, usize), RespError> {
        let pos = Self::find_crlf(input).ok_or(RespError::Incomplete)?;
        let len = Self::parse_length(&input[1..pos])?;

        if len == -1 {
            return Ok((RespValue::BulkString(None), pos + 2));
        }
        if len < 0 {
            return Err(RespError::Invalid(format!("Negative bulk length {}", len)));
        }

        let start = pos + 2;
        let end = start + len as usize;

        if end + 2 > input.len() {
            return Err(RespError::Incomplete);
        }
        if &input[end..end + 2] != b"\r\n" {
            return Err(RespError::Invalid(
                "Bulk string not terminated by CRLF".to_string(),
            ));
        }

        let data = input[start..end].to_vec();
        Ok((RespValue::BulkString(Some(data)), end + 2))
    }

    fn parse_array(input: &[u8]) -> Result<(RespValue, usize), RespError> {
        let pos = Self::find_crlf(input).ok_or(RespError::Incomplete)?;
        let len = Self::parse_length(&input[1..pos])?;

        if len == -1 {
            return Ok((RespValue::Array(None), pos + 2));
        }
        if len < 0 {
            return Err(RespError::Invalid(format!("Negative array length {}", len)));
        }

        let mut elements = Vec::with_capacity((len as usize).min(1024));
        let mut offset = pos + 2;

        for _ in 0..len {
            let (value, consumed) = Self::parse(&input[offset..])?;
            elements.push(value);
            offset += consumed;
        }

        Ok((RespValue::Array(Some(elements)), offset))
    }

    fn parse_length(digits: &[u8]) -> Result<i64, RespError> {
        let s = std::str::from_utf8(digits)
            .map_err(|_| RespError::Invalid("Non-UTF-8 length".to_string()))?;
        s.parse::<i64>().map_err(|e| RespError::Invalid(e.to_string()))
    }

    #[inline]
    fn find_crlf(input: &[u8]) -> Option<usize> {
        memchr::memmem::find(input, b"\r\n")
    }

    /// Encode a command as an array of bulk strings
    pub fn encode_command(args: &[&[u8]]) -> BytesMut {
        let capacity = 16 + args.iter().map(|a| a.len() + 16).sum::<usize>();
        let mut buf = BytesMut::with_capacity(capacity);
        buf.put_slice(format!("*{}\r\n", args.len()).as_bytes());
        for arg in args {
            buf.put_slice(format!("${}\r\n", arg.len()).as_bytes());
            buf.put_slice(arg);
            buf.put_slice(b"\r\n");
        }
        buf
    }
}

/// Finds where one reply frame ends, resuming across partial reads
///
/// A reply to `LRANGE key 0 -1` on a large list arrives over many reads.
/// Re-parsing the buffer from the start after each read is quadratic in
/// the reply size; the scanner instead remembers how far it has validated
/// and which arrays are still open, so every byte is examined once. Only a
/// complete frame is handed to [`RespParser::parse`].
#[derive(Debug, Default)]
pub struct FrameScanner {
    /// Bytes of the current frame already walked
    offset: usize,
    /// Elements still expected by each open array, innermost last
    open: Vec<i64>,
}

impl FrameScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes of the pending frame walked so far
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Continue scanning `input`, which must start at the same frame and
    /// only ever grow between calls. Returns the frame length once the
    /// whole frame is buffered, then resets for the next frame.
    pub fn scan(&mut self, input: &[u8]) -> Result<Option<usize>, RespError> {
        loop {
            let rest = &input[self.offset..];
            if rest.is_empty() {
                return Ok(None);
            }
            let Some(pos) = RespParser::find_crlf(rest) else {
                return Ok(None);
            };

            match rest[0] {
                b'+' | b'-' => {
                    self.offset += pos + 2;
                    self.element_done();
                }
                b':' => {
                    RespParser::parse_length(&rest[1..pos])?;
                    self.offset += pos + 2;
                    self.element_done();
                }
                b'$' => {
                    let len = RespParser::parse_length(&rest[1..pos])?;
                    if len < -1 {
                        return Err(RespError::Invalid(format!("Negative bulk length {}", len)));
                    }
                    let total = if len == -1 {
                        pos + 2
                    } else {
                        let end = pos + 2 + len as usize;
                        if end + 2 > rest.len() {
                            return Ok(None);
                        }
                        if &rest[end..end + 2] != b"\r\n" {
                            return Err(RespError::Invalid(
                                "Bulk string not terminated by CRLF".to_string(),
                            ));
                        }
                        end + 2
                    };
                    self.offset += total;
                    self.element_done();
                }
                b'*' => {
                    let len = RespParser::parse_length(&rest[1..pos])?;
                    if len < -1 {
                        return Err(RespError::Invalid(format!("Negative array length {}", len)));
                    }
                    self.offset += pos + 2;
                    if len > 0 {
                        self.open.push(len);
                    } else {
                        self.element_done();
                    }
                }
                other => {
                    return Err(RespError::Invalid(format!(
                        "Unknown RESP type: {}",
                        other as char
                    )))
                }
            }

            if self.open.is_empty() {
                let frame = self.offset;
                self.offset = 0;
                return Ok(Some(frame));
            }
        }
    }

    /// One element finished; close every array it completes
    fn element_done(&mut self) {
        while let Some(remaining) = self.open.last_mut() {
            *remaining -= 1;
            if *remaining > 0 {
                break;
            }
            self.open.pop();
        }
    }
}
