//! The AWS event-stream binary frame format (spec.md §4.6):
//!
//! ```text
//! offset 0:  totalLength    uint32 BE
//! offset 4:  headersLength  uint32 BE
//! offset 8:  preludeCRC     uint32 BE  (CRC32 of bytes 0..7)
//! offset 12: headers[headersLength]
//! offset ...: payload
//! offset totalLength-4: messageCRC uint32 BE (CRC32 of bytes 0..totalLength-5)
//! ```
//!
//! Each header is `nameLength u8 | name | type u8 | value`, where only the
//! string type (`7`) is supported and a string value is `u16 BE length | bytes`.

use std::collections::HashMap;

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{EventStreamError, Result};

const PRELUDE_LENGTH: usize = 8;
const PRELUDE_CRC_LENGTH: usize = 4;
const MESSAGE_CRC_LENGTH: usize = 4;
const MIN_FRAME_LENGTH: usize = PRELUDE_LENGTH + PRELUDE_CRC_LENGTH + MESSAGE_CRC_LENGTH;
const STRING_HEADER_TYPE: u8 = 7;

/// One decoded frame: its headers and raw payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub headers: HashMap<String, String>,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|s| s.as_str())
    }

    pub fn message_type(&self) -> Option<&str> {
        self.header(":message-type")
    }

    pub fn event_type(&self) -> Option<&str> {
        self.header(":event-type")
    }

    /// Whether this frame is an `exception`-typed frame, per spec.md's
    /// required `:message-type` header values (`event` | `exception`).
    pub fn is_exception(&self) -> bool {
        self.message_type() == Some("exception")
    }
}

/// Attempt to decode one complete frame from the front of `buf`. On success,
/// the decoded bytes are advanced out of `buf`. Returns `Ok(None)` when `buf`
/// doesn't yet hold a complete frame — the caller should wait for more bytes.
pub(crate) fn try_decode_frame(buf: &mut BytesMut) -> Result<Option<Frame>> {
    if buf.len() < PRELUDE_LENGTH + PRELUDE_CRC_LENGTH {
        return Ok(None);
    }

    let total_length = u32::from_be_bytes(buf[0..4].try_into().unwrap()) as usize;
    let headers_length = u32::from_be_bytes(buf[4..8].try_into().unwrap()) as usize;
    let prelude_crc = u32::from_be_bytes(buf[8..12].try_into().unwrap());

    if total_length < MIN_FRAME_LENGTH {
        return Err(EventStreamError::Malformed(
            "total length shorter than the minimum possible frame",
        ));
    }

    let computed_prelude_crc = crc32fast::hash(&buf[0..PRELUDE_LENGTH]);
    if computed_prelude_crc != prelude_crc {
        return Err(EventStreamError::PreludeCrcMismatch);
    }

    if buf.len() < total_length {
        return Ok(None);
    }

    let computed_message_crc = crc32fast::hash(&buf[0..total_length - MESSAGE_CRC_LENGTH]);
    let message_crc = u32::from_be_bytes(
        buf[total_length - MESSAGE_CRC_LENGTH..total_length]
            .try_into()
            .unwrap(),
    );
    if computed_message_crc != message_crc {
        return Err(EventStreamError::MessageCrcMismatch);
    }

    let headers_start = PRELUDE_LENGTH + PRELUDE_CRC_LENGTH;
    let headers_end = headers_start + headers_length;
    if headers_end + MESSAGE_CRC_LENGTH > total_length {
        return Err(EventStreamError::Malformed(
            "headers length overruns the frame",
        ));
    }

    let headers = parse_headers(&buf[headers_start..headers_end])?;
    let payload = buf[headers_end..total_length - MESSAGE_CRC_LENGTH].to_vec();

    let frame = Frame { headers, payload };
    buf.advance(total_length);
    Ok(Some(frame))
}

fn parse_headers(mut data: &[u8]) -> Result<HashMap<String, String>> {
    let mut headers = HashMap::new();
    while !data.is_empty() {
        let name_len = data[0] as usize;
        data = &data[1..];
        if data.len() < name_len + 1 {
            return Err(EventStreamError::Malformed("truncated header name/type"));
        }
        let name = std::str::from_utf8(&data[..name_len])
            .map_err(|_| EventStreamError::InvalidHeaderEncoding)?
            .to_string();
        data = &data[name_len..];

        let value_type = data[0];
        data = &data[1..];
        if value_type != STRING_HEADER_TYPE {
            return Err(EventStreamError::UnsupportedHeaderType(value_type));
        }

        if data.len() < 2 {
            return Err(EventStreamError::Malformed("truncated header value length"));
        }
        let value_len = u16::from_be_bytes([data[0], data[1]]) as usize;
        data = &data[2..];
        if data.len() < value_len {
            return Err(EventStreamError::Malformed("truncated header value"));
        }
        let value = std::str::from_utf8(&data[..value_len])
            .map_err(|_| EventStreamError::InvalidHeaderEncoding)?
            .to_string();
        data = &data[value_len..];

        headers.insert(name, value);
    }
    Ok(headers)
}

/// Encode a frame from headers and payload, computing both CRCs. Used by the
/// test suite to build fixtures and round-trip them through
/// [`try_decode_frame`]; the upstream is the only real-world producer of this
/// wire format.
pub fn encode_frame(headers: &[(&str, &str)], payload: &[u8]) -> Vec<u8> {
    let mut header_bytes = BytesMut::new();
    for (name, value) in headers {
        header_bytes.put_u8(name.len() as u8);
        header_bytes.put_slice(name.as_bytes());
        header_bytes.put_u8(STRING_HEADER_TYPE);
        header_bytes.put_u16(value.len() as u16);
        header_bytes.put_slice(value.as_bytes());
    }

    let headers_length = header_bytes.len() as u32;
    let total_length = (PRELUDE_LENGTH
        + PRELUDE_CRC_LENGTH
        + header_bytes.len()
        + payload.len()
        + MESSAGE_CRC_LENGTH) as u32;

    let mut buf = BytesMut::with_capacity(total_length as usize);
    buf.put_u32(total_length);
    buf.put_u32(headers_length);
    let prelude_crc = crc32fast::hash(&buf[0..PRELUDE_LENGTH]);
    buf.put_u32(prelude_crc);
    buf.put_slice(&header_bytes);
    buf.put_slice(payload);
    let message_crc = crc32fast::hash(&buf[..]);
    buf.put_u32(message_crc);
    buf.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame_bytes() -> Vec<u8> {
        encode_frame(
            &[
                (":message-type", "event"),
                (":event-type", "assistantResponseEvent"),
                (":content-type", "application/json"),
            ],
            br#"{"content":"hi"}"#,
        )
    }

    #[test]
    fn round_trip_encode_decode_yields_original_headers_and_payload() {
        let bytes = sample_frame_bytes();
        let mut buf = BytesMut::from(&bytes[..]);
        let frame = try_decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(frame.event_type(), Some("assistantResponseEvent"));
        assert_eq!(frame.payload, br#"{"content":"hi"}"#);
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_frame_returns_none_and_leaves_buffer_untouched() {
        let bytes = sample_frame_bytes();
        let mut buf = BytesMut::from(&bytes[..bytes.len() - 1]);
        let result = try_decode_frame(&mut buf).unwrap();
        assert!(result.is_none());
        assert_eq!(buf.len(), bytes.len() - 1);
    }

    #[test]
    fn prelude_crc_mismatch_is_rejected() {
        let mut bytes = sample_frame_bytes();
        bytes[8] ^= 0xff;
        let mut buf = BytesMut::from(&bytes[..]);
        let err = try_decode_frame(&mut buf).unwrap_err();
        assert!(matches!(err, EventStreamError::PreludeCrcMismatch));
    }

    #[test]
    fn message_crc_mismatch_is_rejected() {
        let mut bytes = sample_frame_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let mut buf = BytesMut::from(&bytes[..]);
        let err = try_decode_frame(&mut buf).unwrap_err();
        assert!(matches!(err, EventStreamError::MessageCrcMismatch));
    }

    #[test]
    fn exception_message_type_is_detected() {
        let bytes = encode_frame(
            &[
                (":message-type", "exception"),
                (":exception-type", "validationException"),
                (":content-type", "application/json"),
            ],
            br#"{"message":"bad request"}"#,
        );
        let mut buf = BytesMut::from(&bytes[..]);
        let frame = try_decode_frame(&mut buf).unwrap().unwrap();
        assert!(frame.is_exception());
    }

    #[test]
    fn unsupported_header_value_type_is_rejected() {
        let mut header_bytes = BytesMut::new();
        let name = ":message-type";
        header_bytes.put_u8(name.len() as u8);
        header_bytes.put_slice(name.as_bytes());
        header_bytes.put_u8(9); // not the string type (7)
        header_bytes.put_u16(0);

        let payload = b"{}";
        let total_length =
            (PRELUDE_LENGTH + PRELUDE_CRC_LENGTH + header_bytes.len() + payload.len() + 4) as u32;
        let mut buf = BytesMut::with_capacity(total_length as usize);
        buf.put_u32(total_length);
        buf.put_u32(header_bytes.len() as u32);
        let prelude_crc = crc32fast::hash(&buf[0..8]);
        buf.put_u32(prelude_crc);
        buf.put_slice(&header_bytes);
        buf.put_slice(payload);
        let message_crc = crc32fast::hash(&buf[..]);
        buf.put_u32(message_crc);

        let err = try_decode_frame(&mut buf).unwrap_err();
        assert!(matches!(err, EventStreamError::UnsupportedHeaderType(9)));
    }
}
