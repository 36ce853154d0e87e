// crates/ontostore-memcached/src/protocol.rs
// ============================================================================
// Module: Memcached Text Protocol
// Description: Key encoding, request framing, and reply parsing.
// Purpose: Speak the memcached text protocol over any byte stream.
// Dependencies: ontostore-core, thiserror
// ============================================================================

//! ## Overview
//! Requests are framed into byte buffers and replies are parsed from any
//! [`BufRead`], so the codec runs unchanged over sockets and in-memory
//! cursors.
//! Invariants:
//! - Encoded keys are at most [`MAX_KEY_LENGTH`] bytes of graphic ASCII.
//! - Text and integer keys encode into disjoint key spaces.
//! - Error replies map onto libmemcached return codes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::io;
use std::io::BufRead;
use std::io::Read;
use std::io::Write;

use ontostore_core::CacheKey;
use ontostore_core::ResourceError;
use thiserror::Error;

// ============================================================================
// SECTION: Limits and Codes
// ============================================================================

/// Maximum key length accepted by memcached servers.
pub const MAX_KEY_LENGTH: usize = 250;
/// Maximum reply line length, terminator included.
const MAX_LINE_BYTES: u64 = 4098;
/// Largest value accepted from a server.
pub const MAX_VALUE_LENGTH: usize = 128 * 1024 * 1024;
/// Hex digits used for hashed keys.
const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Host name resolution failed.
pub const HOST_LOOKUP_FAILURE: i64 = 2;
/// The server could not be reached.
pub const CONNECTION_FAILURE: i64 = 3;
/// Writing a request failed.
pub const WRITE_FAILURE: i64 = 5;
/// Reading a reply failed.
pub const READ_FAILURE: i64 = 6;
/// The server sent a reply the client does not understand.
pub const PROTOCOL_ERROR: i64 = 8;
/// The server rejected the request as malformed.
pub const CLIENT_ERROR: i64 = 9;
/// The server failed while handling the request.
pub const SERVER_ERROR: i64 = 10;
/// The server did not recognize the command.
pub const UNKNOWN_COMMAND: i64 = 11;
/// The server declined to store an item.
pub const NOT_STORED: i64 = 14;
/// No server is configured for the request.
pub const NO_SERVERS: i64 = 20;
/// A socket read or write timed out.
pub const TIMEOUT: i64 = 31;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Failure talking to a memcached server, tagged with a libmemcached code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("memcached error {code}: {message}")]
pub struct MemcachedError {
    /// libmemcached return code.
    pub code: i64,
    /// Human-readable detail.
    pub message: String,
}

impl MemcachedError {
    /// Creates an error with the given code.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Returns true when the connection that produced this error is unusable.
    #[must_use]
    pub const fn drops_connection(&self) -> bool {
        matches!(self.code, CONNECTION_FAILURE | WRITE_FAILURE | READ_FAILURE | PROTOCOL_ERROR | TIMEOUT)
    }

    /// Classifies a socket read failure.
    pub(crate) fn read(err: &io::Error) -> Self {
        Self::transport(READ_FAILURE, "read", err)
    }

    /// Classifies a socket write failure.
    pub(crate) fn write(err: &io::Error) -> Self {
        Self::transport(WRITE_FAILURE, "write", err)
    }

    /// Maps timeouts to [`TIMEOUT`] and everything else to `code`.
    fn transport(code: i64, action: &str, err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
                Self::new(TIMEOUT, format!("{action} timed out"))
            }
            _ => Self::new(code, format!("{action} failed: {err}")),
        }
    }

    /// Builds a protocol error for an unexpected reply line.
    fn unexpected(line: &str) -> Self {
        Self::new(PROTOCOL_ERROR, format!("unexpected reply: {line}"))
    }
}

impl From<MemcachedError> for ResourceError {
    fn from(err: MemcachedError) -> Self {
        Self::cache(err.code, err.message)
    }
}

// ============================================================================
// SECTION: Keys
// ============================================================================

/// Encodes a cache key into a memcached key.
///
/// Integers become `n:<value>`. Text made of graphic ASCII that fits the key
/// limit becomes `s:<text>`; any other text becomes `h:` followed by the hex
/// SHA-256 digest of the key.
#[must_use]
pub fn encode_key(key: &CacheKey) -> String {
    match key {
        CacheKey::Integer(value) => format!("n:{value}"),
        CacheKey::Text(text)
            if text.len() <= MAX_KEY_LENGTH - 2 && text.bytes().all(|byte| byte.is_ascii_graphic()) =>
        {
            format!("s:{text}")
        }
        CacheKey::Text(_) => {
            let digest = key.digest();
            let mut encoded = String::with_capacity(2 + digest.len() * 2);
            encoded.push_str("h:");
            for byte in digest {
                encoded.push(char::from(HEX_DIGITS[usize::from(byte >> 4)]));
                encoded.push(char::from(HEX_DIGITS[usize::from(byte & 0x0f)]));
            }
            encoded
        }
    }
}

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Request sent to a single server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    /// Unconditional store.
    Set {
        /// Encoded key.
        key: &'a str,
        /// Expiration as sent on the wire.
        exptime: u32,
        /// Value bytes.
        value: &'a [u8],
    },
    /// Single-key fetch.
    Get {
        /// Encoded key.
        key: &'a str,
    },
    /// Single-key delete.
    Delete {
        /// Encoded key.
        key: &'a str,
    },
    /// Invalidate every item on the server.
    FlushAll,
    /// General statistics.
    Stats,
}

impl Request<'_> {
    /// Frames the request as wire bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Set {
                key,
                exptime,
                value,
            } => {
                let mut frame = format!("set {key} 0 {exptime} {}\r\n", value.len()).into_bytes();
                frame.extend_from_slice(value);
                frame.extend_from_slice(b"\r\n");
                frame
            }
            Self::Get {
                key,
            } => format!("get {key}\r\n").into_bytes(),
            Self::Delete {
                key,
            } => format!("delete {key}\r\n").into_bytes(),
            Self::FlushAll => b"flush_all\r\n".to_vec(),
            Self::Stats => b"stats\r\n".to_vec(),
        }
    }

    /// Writes the framed request and flushes `output`.
    ///
    /// # Errors
    ///
    /// Returns [`MemcachedError`] with [`WRITE_FAILURE`] or [`TIMEOUT`].
    pub fn send<W: Write + ?Sized>(&self, output: &mut W) -> Result<(), MemcachedError> {
        output.write_all(&self.encode()).and_then(|()| output.flush()).map_err(|err| MemcachedError::write(&err))
    }
}

// ============================================================================
// SECTION: Replies
// ============================================================================

/// Reads one CRLF-terminated reply line without its terminator.
///
/// # Errors
///
/// Returns [`MemcachedError`] when the stream closes, fails, or yields an
/// overlong or non UTF-8 line.
pub fn read_line<R: BufRead + ?Sized>(input: &mut R) -> Result<String, MemcachedError> {
    let mut line = Vec::new();
    let read = input
        .take(MAX_LINE_BYTES)
        .read_until(b'\n', &mut line)
        .map_err(|err| MemcachedError::read(&err))?;
    if read == 0 {
        return Err(MemcachedError::new(READ_FAILURE, "connection closed by server"));
    }
    if !line.ends_with(b"\r\n") {
        return Err(MemcachedError::new(PROTOCOL_ERROR, "reply line is not terminated"));
    }
    line.truncate(line.len() - 2);
    String::from_utf8(line).map_err(|_| MemcachedError::new(PROTOCOL_ERROR, "reply line is not utf-8"))
}

/// Reads a reply line, turning generic error replies into errors.
fn read_reply<R: BufRead + ?Sized>(input: &mut R) -> Result<String, MemcachedError> {
    let line = read_line(input)?;
    if line == "ERROR" {
        return Err(MemcachedError::new(UNKNOWN_COMMAND, "server does not recognize the command"));
    }
    if let Some(detail) = line.strip_prefix("CLIENT_ERROR") {
        return Err(MemcachedError::new(CLIENT_ERROR, detail.trim()));
    }
    if let Some(detail) = line.strip_prefix("SERVER_ERROR") {
        return Err(MemcachedError::new(SERVER_ERROR, detail.trim()));
    }
    Ok(line)
}

/// Reads the reply to a `set`.
///
/// # Errors
///
/// Returns [`NOT_STORED`] when the server declines the item, otherwise the
/// transport or protocol failure.
pub fn read_store_reply<R: BufRead + ?Sized>(input: &mut R) -> Result<(), MemcachedError> {
    let line = read_reply(input)?;
    match line.as_str() {
        "STORED" => Ok(()),
        "NOT_STORED" => Err(MemcachedError::new(NOT_STORED, "item not stored")),
        _ => Err(MemcachedError::unexpected(&line)),
    }
}

/// Reads the reply to a single-key `get`; `None` means the key is absent.
///
/// # Errors
///
/// Returns [`MemcachedError`] on transport failures and malformed replies,
/// including a value block for a key other than `key`.
pub fn read_value<R: BufRead + ?Sized>(input: &mut R, key: &str) -> Result<Option<Vec<u8>>, MemcachedError> {
    let line = read_reply(input)?;
    if line == "END" {
        return Ok(None);
    }
    let header = line.strip_prefix("VALUE ").ok_or_else(|| MemcachedError::unexpected(&line))?;
    let mut fields = header.split_ascii_whitespace();
    let (Some(name), Some(_flags), Some(length)) = (fields.next(), fields.next(), fields.next()) else {
        return Err(MemcachedError::unexpected(&line));
    };
    if name != key {
        return Err(MemcachedError::new(PROTOCOL_ERROR, format!("value for {name} while fetching {key}")));
    }
    let length = length
        .parse::<usize>()
        .ok()
        .filter(|length| *length <= MAX_VALUE_LENGTH)
        .ok_or_else(|| MemcachedError::unexpected(&line))?;
    let mut block = vec![0_u8; length + 2];
    input.read_exact(&mut block).map_err(|err| MemcachedError::read(&err))?;
    if !block.ends_with(b"\r\n") {
        return Err(MemcachedError::new(PROTOCOL_ERROR, "value block is not terminated"));
    }
    block.truncate(length);
    let trailer = read_reply(input)?;
    if trailer != "END" {
        return Err(MemcachedError::unexpected(&trailer));
    }
    Ok(Some(block))
}

/// Reads the reply to a `delete`; `false` means the key was absent.
///
/// # Errors
///
/// Returns [`MemcachedError`] on transport failures and malformed replies.
pub fn read_delete_reply<R: BufRead + ?Sized>(input: &mut R) -> Result<bool, MemcachedError> {
    let line = read_reply(input)?;
    match line.as_str() {
        "DELETED" => Ok(true),
        "NOT_FOUND" => Ok(false),
        _ => Err(MemcachedError::unexpected(&line)),
    }
}

/// Reads an `OK` reply.
///
/// # Errors
///
/// Returns [`MemcachedError`] on transport failures and malformed replies.
pub fn read_ok_reply<R: BufRead + ?Sized>(input: &mut R) -> Result<(), MemcachedError> {
    let line = read_reply(input)?;
    if line == "OK" { Ok(()) } else { Err(MemcachedError::unexpected(&line)) }
}

/// Reads `STAT` lines up to `END`.
///
/// # Errors
///
/// Returns [`MemcachedError`] on transport failures and malformed replies.
pub fn read_stats<R: BufRead + ?Sized>(input: &mut R) -> Result<BTreeMap<String, String>, MemcachedError> {
    let mut stats = BTreeMap::new();
    loop {
        let line = read_reply(input)?;
        if line == "END" {
            return Ok(stats);
        }
        let (name, value) = line
            .strip_prefix("STAT ")
            .and_then(|stat| stat.split_once(' '))
            .ok_or_else(|| MemcachedError::unexpected(&line))?;
        stats.insert(name.to_string(), value.to_string());
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn keys_encode_by_kind() {
        assert_eq!(encode_key(&CacheKey::from(42_i64)), "n:42");
        assert_eq!(encode_key(&CacheKey::from(-7_i64)), "n:-7");
        assert_eq!(encode_key(&CacheKey::from(":namespace")), "s::namespace");
        assert_eq!(encode_key(&CacheKey::from("42")), "s:42");
    }

    #[test]
    fn unsafe_or_long_text_keys_are_hashed() {
        let long = "x".repeat(MAX_KEY_LENGTH);
        for text in ["has space", "line\nbreak", "caf\u{e9}", long.as_str()] {
            let encoded = encode_key(&CacheKey::from(text));
            assert!(encoded.starts_with("h:"));
            assert_eq!(encoded.len(), 66);
            assert!(encoded.bytes().all(|byte| byte.is_ascii_graphic()));
        }
        let fits = "y".repeat(MAX_KEY_LENGTH - 2);
        assert_eq!(encode_key(&CacheKey::from(fits.as_str())).len(), MAX_KEY_LENGTH);
    }

    #[test]
    fn set_frames_value_block() {
        let request = Request::Set {
            key: "s:a",
            exptime: 30,
            value: b"xyz",
        };
        assert_eq!(request.encode(), b"set s:a 0 30 3\r\nxyz\r\n".to_vec());
        assert_eq!(Request::FlushAll.encode(), b"flush_all\r\n".to_vec());
    }

    #[test]
    fn value_reply_parses_block_and_terminator() {
        let mut input = Cursor::new(b"VALUE s:a 0 5 99\r\nab\r\nc\r\nEND\r\n".to_vec());
        assert_eq!(read_value(&mut input, "s:a").unwrap(), Some(b"ab\r\nc".to_vec()));
        let mut input = Cursor::new(b"END\r\n".to_vec());
        assert_eq!(read_value(&mut input, "s:a").unwrap(), None);
    }

    #[test]
    fn value_reply_for_other_key_is_protocol_error() {
        let mut input = Cursor::new(b"VALUE s:b 0 1\r\nx\r\nEND\r\n".to_vec());
        assert_eq!(read_value(&mut input, "s:a").unwrap_err().code, PROTOCOL_ERROR);
    }

    #[test]
    fn truncated_value_is_read_failure() {
        let mut input = Cursor::new(b"VALUE s:a 0 10\r\nabc".to_vec());
        assert_eq!(read_value(&mut input, "s:a").unwrap_err().code, READ_FAILURE);
    }

    #[test]
    fn error_replies_map_to_codes() {
        let cases: [(&[u8], i64); 5] = [
            (b"NOT_STORED\r\n", NOT_STORED),
            (b"SERVER_ERROR out of memory\r\n", SERVER_ERROR),
            (b"CLIENT_ERROR bad data chunk\r\n", CLIENT_ERROR),
            (b"ERROR\r\n", UNKNOWN_COMMAND),
            (b"EXISTS\r\n", PROTOCOL_ERROR),
        ];
        for (reply, code) in cases {
            let err = read_store_reply(&mut Cursor::new(reply.to_vec())).unwrap_err();
            assert_eq!(err.code, code);
        }
        let err = read_store_reply(&mut Cursor::new(b"SERVER_ERROR out of memory\r\n".to_vec())).unwrap_err();
        assert_eq!(err.message, "out of memory");
    }

    #[test]
    fn closed_stream_is_read_failure() {
        let err = read_line(&mut Cursor::new(Vec::new())).unwrap_err();
        assert_eq!(err.code, READ_FAILURE);
        assert!(err.drops_connection());
        let err = read_line(&mut Cursor::new(b"STORED".to_vec())).unwrap_err();
        assert_eq!(err.code, PROTOCOL_ERROR);
    }

    #[test]
    fn delete_and_stats_replies_parse() {
        assert!(read_delete_reply(&mut Cursor::new(b"DELETED\r\n".to_vec())).unwrap());
        assert!(!read_delete_reply(&mut Cursor::new(b"NOT_FOUND\r\n".to_vec())).unwrap());
        let stats =
            read_stats(&mut Cursor::new(b"STAT pid 12\r\nSTAT version 1.6.21\r\nEND\r\n".to_vec())).unwrap();
        assert_eq!(stats.get("pid").map(String::as_str), Some("12"));
        assert_eq!(stats.get("version").map(String::as_str), Some("1.6.21"));
    }

    #[test]
    fn errors_convert_to_cache_errors() {
        let err = ResourceError::from(MemcachedError::new(NOT_STORED, "item not stored"));
        assert_eq!(err.backend_code(), Some(NOT_STORED));
        assert!(!MemcachedError::new(NOT_STORED, "item not stored").drops_connection());
    }
}
