//! Incremental RESP2/RESP3 reply parser.
//!
//! [`parse`] inspects a byte slice and either yields the first complete
//! frame together with the number of bytes it occupied, or reports
//! [`ParseError::Incomplete`] without consuming anything. The parser keeps
//! no state between calls — the session buffers raw bytes in its ring
//! buffer and calls [`parse`] in a loop, consuming exactly what each frame
//! used.

use std::{error, fmt, str};

use num_bigint::BigInt;

use crate::types::{PushKind, Value, VerbatimFormat};

/// Maximum nesting depth of aggregate frames. Deeper frames fail with
/// [`ParseError::DepthExceeded`] to bound stack use.
const MAX_RECURSE_DEPTH: usize = 128;

/// Protocol-level limit on a single bulk string (512 MiB, the server-side
/// proto-max-bulk-len default).
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Error produced by [`parse`].
///
/// Only [`ParseError::Incomplete`] is recoverable: the caller supplies more
/// bytes and retries. Every other variant means framing is lost and the
/// connection cannot be resynchronized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// The slice ends before the frame does; read more bytes and retry.
    Incomplete,
    /// A line body did not match its expected shape (bad integer digits,
    /// missing CRLF terminator, non-UTF-8 text, bad boolean or double).
    InvalidFormat,
    /// The first byte of a frame is not a known RESP type marker.
    InvalidType(u8),
    /// A length or element count was negative (other than the `-1` null
    /// marker).
    InvalidLength(i64),
    /// Aggregate nesting exceeded the recursion cap.
    DepthExceeded,
    /// A declared bulk length exceeded the protocol safety cap.
    BufferOverflow,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Incomplete => f.write_str("incomplete frame"),
            ParseError::InvalidFormat => f.write_str("malformed frame body"),
            ParseError::InvalidType(b) => write!(f, "invalid type marker {b:#04x}"),
            ParseError::InvalidLength(len) => write!(f, "invalid length {len}"),
            ParseError::DepthExceeded => f.write_str("nesting exceeds recursion cap"),
            ParseError::BufferOverflow => f.write_str("frame exceeds safety cap"),
        }
    }
}

impl error::Error for ParseError {}

impl ParseError {
    /// Returns true if the error only means more bytes are needed.
    #[inline]
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ParseError::Incomplete)
    }
}

/// Parses the first complete frame out of `buf`.
///
/// Returns the number of bytes the frame occupied and the parsed value.
/// Trailing bytes are ignored, so the result for a given frame is identical
/// no matter how much of the following stream has already arrived.
pub fn parse(buf: &[u8]) -> Result<(usize, Value), ParseError> {
    parse_value(buf, 0)
}

fn parse_value(buf: &[u8], depth: usize) -> Result<(usize, Value), ParseError> {
    if depth >= MAX_RECURSE_DEPTH {
        return Err(ParseError::DepthExceeded);
    }
    let first = *buf.first().ok_or(ParseError::Incomplete)?;
    let body = &buf[1..];
    let (n, value) = match first {
        b'+' => {
            let (n, line) = parse_text_line(body)?;
            (n, Value::SimpleString(line.to_string()))
        }
        b'-' => {
            let (n, line) = parse_text_line(body)?;
            (n, Value::Error(line.to_string()))
        }
        b':' => {
            let (n, v) = parse_int_line(body)?;
            (n, Value::Int(v))
        }
        b'$' => parse_bulk_string(body)?,
        b'*' => parse_aggregate(body, depth, Value::Array)?,
        b',' => {
            let (n, line) = parse_text_line(body)?;
            let v = line
                .trim()
                .parse::<f64>()
                .map_err(|_| ParseError::InvalidFormat)?;
            (n, Value::Double(v))
        }
        b'#' => {
            let (n, line) = parse_text_line(body)?;
            let v = match line {
                "t" => true,
                "f" => false,
                _ => return Err(ParseError::InvalidFormat),
            };
            (n, Value::Boolean(v))
        }
        b'%' => parse_map(body, depth)?,
        b'~' => parse_aggregate(body, depth, Value::Set)?,
        b'>' => parse_push(body, depth)?,
        b'_' => {
            let (n, _) = parse_text_line(body)?;
            (n, Value::Nil)
        }
        b'!' => {
            let (n, v) = parse_bulk_string(body)?;
            let text = match &v {
                Value::BulkString(bytes) => str::from_utf8(bytes)
                    .map_err(|_| ParseError::InvalidFormat)?
                    .to_string(),
                _ => return Err(ParseError::InvalidFormat),
            };
            (n, Value::Error(text))
        }
        b'=' => {
            let (n, v) = parse_bulk_string(body)?;
            let text = match &v {
                Value::BulkString(bytes) => {
                    str::from_utf8(bytes).map_err(|_| ParseError::InvalidFormat)?
                }
                _ => return Err(ParseError::InvalidFormat),
            };
            let (format, text) = text.split_once(':').ok_or(ParseError::InvalidFormat)?;
            let format = match format {
                "txt" => VerbatimFormat::Text,
                "mkd" => VerbatimFormat::Markdown,
                other => VerbatimFormat::Unknown(other.to_string()),
            };
            (
                n,
                Value::Verbatim {
                    format,
                    text: text.to_string(),
                },
            )
        }
        b'(' => {
            let (n, line) = parse_text_line(body)?;
            let v = BigInt::parse_bytes(line.as_bytes(), 10).ok_or(ParseError::InvalidFormat)?;
            (n, Value::BigNumber(v))
        }
        other => return Err(ParseError::InvalidType(other)),
    };
    Ok((n + 1, value))
}

/// Finds the CRLF terminator and returns `(consumed, body)` where
/// `consumed` includes the terminator.
fn parse_line(buf: &[u8]) -> Result<(usize, &[u8]), ParseError> {
    let mut i = 0;
    while i + 1 < buf.len() {
        match buf[i] {
            b'\r' if buf[i + 1] == b'\n' => return Ok((i + 2, &buf[..i])),
            // A bare CR or LF inside a line frame means framing is lost.
            b'\n' => return Err(ParseError::InvalidFormat),
            _ => i += 1,
        }
    }
    Err(ParseError::Incomplete)
}

fn parse_text_line(buf: &[u8]) -> Result<(usize, &str), ParseError> {
    let (n, line) = parse_line(buf)?;
    let text = str::from_utf8(line).map_err(|_| ParseError::InvalidFormat)?;
    Ok((n, text))
}

fn parse_int_line(buf: &[u8]) -> Result<(usize, i64), ParseError> {
    let (n, line) = parse_line(buf)?;
    if line.is_empty() {
        return Err(ParseError::InvalidFormat);
    }
    let text = str::from_utf8(line).map_err(|_| ParseError::InvalidFormat)?;
    let v = text.parse::<i64>().map_err(|_| ParseError::InvalidFormat)?;
    Ok((n, v))
}

fn parse_bulk_string(buf: &[u8]) -> Result<(usize, Value), ParseError> {
    let (header, len) = parse_int_line(buf)?;
    if len == -1 {
        return Ok((header, Value::Nil));
    }
    if len < 0 {
        return Err(ParseError::InvalidLength(len));
    }
    if len > MAX_BULK_LEN {
        return Err(ParseError::BufferOverflow);
    }
    let len = len as usize;
    let rest = &buf[header..];
    if rest.len() < len + 2 {
        return Err(ParseError::Incomplete);
    }
    if &rest[len..len + 2] != b"\r\n" {
        return Err(ParseError::InvalidFormat);
    }
    Ok((header + len + 2, Value::BulkString(rest[..len].to_vec())))
}

fn parse_elements(
    buf: &[u8],
    depth: usize,
    count: usize,
) -> Result<(usize, Vec<Value>), ParseError> {
    let mut consumed = 0;
    let mut items = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let (n, item) = parse_value(&buf[consumed..], depth + 1)?;
        consumed += n;
        items.push(item);
    }
    Ok((consumed, items))
}

fn parse_aggregate(
    buf: &[u8],
    depth: usize,
    make: fn(Vec<Value>) -> Value,
) -> Result<(usize, Value), ParseError> {
    let (header, count) = parse_int_line(buf)?;
    if count == -1 {
        return Ok((header, Value::Nil));
    }
    if count < 0 {
        return Err(ParseError::InvalidLength(count));
    }
    let (n, items) = parse_elements(&buf[header..], depth, count as usize)?;
    Ok((header + n, make(items)))
}

fn parse_map(buf: &[u8], depth: usize) -> Result<(usize, Value), ParseError> {
    let (header, count) = parse_int_line(buf)?;
    if count == -1 {
        return Ok((header, Value::Nil));
    }
    if count < 0 {
        return Err(ParseError::InvalidLength(count));
    }
    let (n, items) = parse_elements(&buf[header..], depth, count as usize * 2)?;
    let mut pairs = Vec::with_capacity(count as usize);
    let mut it = items.into_iter();
    while let (Some(k), Some(v)) = (it.next(), it.next()) {
        pairs.push((k, v));
    }
    Ok((header + n, Value::Map(pairs)))
}

fn parse_push(buf: &[u8], depth: usize) -> Result<(usize, Value), ParseError> {
    let (header, count) = parse_int_line(buf)?;
    if count <= 0 {
        return Ok((
            header,
            Value::Push {
                kind: PushKind::Other(String::new()),
                data: vec![],
            },
        ));
    }
    let (n, items) = parse_elements(&buf[header..], depth, count as usize)?;
    let mut it = items.into_iter();
    let kind = match it.next() {
        Some(Value::BulkString(name)) => {
            let name = str::from_utf8(&name).map_err(|_| ParseError::InvalidFormat)?;
            PushKind::from_name(name)
        }
        Some(Value::SimpleString(name)) => PushKind::from_name(&name),
        _ => return Err(ParseError::InvalidFormat),
    };
    Ok((
        header + n,
        Value::Push {
            kind,
            data: it.collect(),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(bytes: &[u8]) -> Value {
        let (consumed, value) = parse(bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        value
    }

    #[test]
    fn decode_command_array_roundtrip() {
        let bytes = b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$3\r\nval\r\n";
        let value = parse_one(bytes);
        assert_eq!(
            value,
            Value::Array(vec![
                Value::BulkString(b"SET".to_vec()),
                Value::BulkString(b"key".to_vec()),
                Value::BulkString(b"val".to_vec()),
            ])
        );
    }

    #[test]
    fn incomplete_tail_then_complete() {
        let partial = b"*2\r\n$3\r\nfoo\r\n$3\r\nba";
        assert_eq!(parse(partial), Err(ParseError::Incomplete));

        let mut full = partial.to_vec();
        full.extend_from_slice(b"r\r\n");
        let (consumed, value) = parse(&full).unwrap();
        assert_eq!(consumed, full.len());
        assert_eq!(
            value,
            Value::Array(vec![
                Value::BulkString(b"foo".to_vec()),
                Value::BulkString(b"bar".to_vec()),
            ])
        );
    }

    #[test]
    fn null_bulk_and_null_array() {
        let (consumed, value) = parse(b"$-1\r\n").unwrap();
        assert_eq!(consumed, 5);
        assert_eq!(value, Value::Nil);

        let (consumed, value) = parse(b"*-1\r\n").unwrap();
        assert_eq!(consumed, 5);
        assert_eq!(value, Value::Nil);
    }

    #[test]
    fn empty_bulk_is_not_nil() {
        let value = parse_one(b"$0\r\n\r\n");
        assert_eq!(value, Value::BulkString(vec![]));
    }

    #[test]
    fn negative_lengths_other_than_null_fail() {
        assert_eq!(parse(b"$-2\r\n"), Err(ParseError::InvalidLength(-2)));
        assert_eq!(parse(b"*-7\r\n"), Err(ParseError::InvalidLength(-7)));
    }

    #[test]
    fn unknown_type_marker_fails() {
        assert_eq!(parse(b"?garbage\r\n"), Err(ParseError::InvalidType(b'?')));
    }

    #[test]
    fn trailing_bytes_do_not_change_the_first_frame() {
        let frame = b"+PONG\r\n";
        let mut stream = frame.to_vec();
        stream.extend_from_slice(b":42\r\n+OK\r\n");
        let (consumed, value) = parse(&stream).unwrap();
        assert_eq!(consumed, frame.len());
        assert_eq!(value, Value::SimpleString("PONG".into()));

        let (consumed2, value2) = parse(&stream[consumed..]).unwrap();
        assert_eq!(consumed2, 5);
        assert_eq!(value2, Value::Int(42));
    }

    #[test]
    fn prefix_of_any_frame_is_incomplete() {
        let frames: &[&[u8]] = &[
            b"+OK\r\n",
            b":-123\r\n",
            b"$6\r\nfoobar\r\n",
            b"*2\r\n:1\r\n:2\r\n",
            b"%1\r\n+k\r\n+v\r\n",
            b",1.25\r\n",
        ];
        for frame in frames {
            for cut in 0..frame.len() {
                assert_eq!(
                    parse(&frame[..cut]),
                    Err(ParseError::Incomplete),
                    "prefix of {frame:?} at {cut}"
                );
            }
        }
    }

    #[test]
    fn decode_integer_with_sign() {
        assert_eq!(parse_one(b":1000\r\n"), Value::Int(1000));
        assert_eq!(parse_one(b":-1\r\n"), Value::Int(-1));
    }

    #[test]
    fn decode_error_frame_as_value() {
        let value = parse_one(b"-ERR unknown command\r\n");
        assert_eq!(value, Value::Error("ERR unknown command".into()));
        assert!(value.is_error());
    }

    #[test]
    fn decode_resp3_double() {
        assert_eq!(parse_one(b",1.23\r\n"), Value::Double(1.23));
        assert_eq!(parse_one(b",inf\r\n"), Value::Double(f64::INFINITY));
        assert_eq!(parse_one(b",-inf\r\n"), Value::Double(f64::NEG_INFINITY));
        assert_eq!(parse_one(b",2.67923E+8\r\n"), Value::Double(267923000.0));
        match parse_one(b",nan\r\n") {
            Value::Double(v) => assert!(v.is_nan()),
            other => panic!("expected double, got {other:?}"),
        }
    }

    #[test]
    fn decode_resp3_boolean() {
        assert_eq!(parse_one(b"#t\r\n"), Value::Boolean(true));
        assert_eq!(parse_one(b"#f\r\n"), Value::Boolean(false));
        assert_eq!(parse(b"#x\r\n"), Err(ParseError::InvalidFormat));
        assert_eq!(parse(b"#\r\n"), Err(ParseError::InvalidFormat));
    }

    #[test]
    fn decode_resp3_map() {
        let value = parse_one(b"%2\r\n+first\r\n:1\r\n+second\r\n:2\r\n");
        assert_eq!(
            value,
            Value::Map(vec![
                (Value::SimpleString("first".into()), Value::Int(1)),
                (Value::SimpleString("second".into()), Value::Int(2)),
            ])
        );
    }

    #[test]
    fn decode_resp3_set() {
        let value = parse_one(b"~3\r\n+orange\r\n#t\r\n:100\r\n");
        assert_eq!(
            value,
            Value::Set(vec![
                Value::SimpleString("orange".into()),
                Value::Boolean(true),
                Value::Int(100),
            ])
        );
    }

    #[test]
    fn decode_resp3_push() {
        let value = parse_one(b">3\r\n+message\r\n+chan\r\n+payload\r\n");
        match value {
            Value::Push { kind, data } => {
                assert_eq!(kind, PushKind::Message);
                assert_eq!(data.len(), 2);
                assert_eq!(data[0], Value::SimpleString("chan".into()));
            }
            other => panic!("expected push, got {other:?}"),
        }
    }

    #[test]
    fn decode_resp3_null_and_blob_error() {
        assert_eq!(parse_one(b"_\r\n"), Value::Nil);
        assert_eq!(
            parse_one(b"!21\r\nSYNTAX invalid syntax\r\n"),
            Value::Error("SYNTAX invalid syntax".into())
        );
    }

    #[test]
    fn decode_resp3_big_number() {
        let digits = b"3492890328409238509324850943850943825024385";
        let mut frame = b"(".to_vec();
        frame.extend_from_slice(digits);
        frame.extend_from_slice(b"\r\n");
        assert_eq!(
            parse_one(&frame),
            Value::BigNumber(BigInt::parse_bytes(digits, 10).unwrap())
        );
    }

    #[test]
    fn decode_resp3_verbatim() {
        assert_eq!(
            parse_one(b"=15\r\ntxt:Some string\r\n"),
            Value::Verbatim {
                format: VerbatimFormat::Text,
                text: "Some string".into()
            }
        );
    }

    #[test]
    fn recursion_depth_is_capped() {
        let mut bytes = Vec::new();
        for _ in 0..(MAX_RECURSE_DEPTH + 10) {
            bytes.extend_from_slice(b"*1\r\n");
        }
        assert_eq!(parse(&bytes), Err(ParseError::DepthExceeded));
    }

    #[test]
    fn bulk_body_must_end_with_crlf() {
        assert_eq!(parse(b"$3\r\nfooXX"), Err(ParseError::InvalidFormat));
    }
}
