//! Decoder for the binary event-stream framing used by streamed responses.
//!
//! Each frame is laid out as:
//!
//! ```text
//! total_len:u32 | headers_len:u32 | prelude_crc:u32 | headers | payload | message_crc:u32
//! ```
//!
//! All integers are big-endian. `prelude_crc` covers the first eight bytes
//! and `message_crc` covers everything before it.

use std::collections::HashMap;

use crc32fast::Hasher as Crc32;
use serde_json::Value;
use tracing::debug;

use crate::application::DeltaEvent;
use crate::domain::DomainError;

const PRELUDE_LEN: usize = 12;
const CRC_LEN: usize = 4;
const MIN_FRAME_LEN: usize = PRELUDE_LEN + CRC_LEN;
/// Frames larger than this are treated as corruption.
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Bytes(Vec<u8>),
    String(String),
    Timestamp(i64),
    Uuid([u8; 16]),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    headers: HashMap<String, HeaderValue>,
    payload: Vec<u8>,
}

impl Frame {
    pub fn header_str(&self, name: &str) -> Option<&str> {
        match self.headers.get(name) {
            Some(HeaderValue::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Map a response frame onto a [`DeltaEvent`]. Exception frames become
    /// backend errors; unknown event types are skipped.
    pub fn into_delta_event(self) -> Result<Option<DeltaEvent>, DomainError> {
        let payload: Value = if self.payload.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&self.payload)
                .map_err(|e| DomainError::backend(format!("malformed stream payload: {e}")))?
        };

        match self.header_str(":message-type") {
            Some("event") => {}
            Some("exception") | Some("error") => {
                let kind = self
                    .header_str(":exception-type")
                    .or_else(|| self.header_str(":error-code"))
                    .unwrap_or("UnknownException");
                let message = payload
                    .get("message")
                    .or_else(|| payload.get("Message"))
                    .and_then(Value::as_str)
                    .or_else(|| self.header_str(":error-message"))
                    .unwrap_or("no message");
                return Err(DomainError::backend(format!("{kind}: {message}")));
            }
            other => {
                debug!("Skipping frame with message type {:?}", other);
                return Ok(None);
            }
        }

        let event = match self.header_str(":event-type") {
            Some("messageStart") => DeltaEvent::MessageStart,
            Some("contentBlockDelta") => match payload.pointer("/delta/text").and_then(Value::as_str) {
                Some(text) => DeltaEvent::TextDelta(text.to_string()),
                None => return Ok(None),
            },
            Some("contentBlockStop") => DeltaEvent::ContentBlockStop,
            Some("messageStop") => DeltaEvent::MessageStop {
                stop_reason: payload
                    .get("stopReason")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
            Some("metadata") => DeltaEvent::Metadata(payload),
            other => {
                debug!("Skipping event type {:?}", other);
                return Ok(None);
            }
        };
        Ok(Some(event))
    }
}

/// Incremental frame decoder. Feed it raw bytes as they arrive and pull
/// complete frames out.
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    buffer: Vec<u8>,
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes received but not yet consumed by a complete frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn next_frame(&mut self) -> Result<Option<Frame>, DomainError> {
        if self.buffer.len() < PRELUDE_LEN {
            return Ok(None);
        }

        let total_len = read_u32(&self.buffer, 0) as usize;
        let headers_len = read_u32(&self.buffer, 4) as usize;
        let prelude_crc = read_u32(&self.buffer, 8);

        if checksum(&self.buffer[..8]) != prelude_crc {
            return Err(DomainError::backend("event stream prelude checksum mismatch"));
        }
        if !(MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&total_len)
            || headers_len > total_len - MIN_FRAME_LEN
        {
            return Err(DomainError::backend(format!(
                "invalid event stream frame length {total_len} (headers {headers_len})"
            )));
        }
        if self.buffer.len() < total_len {
            return Ok(None);
        }

        let frame: Vec<u8> = self.buffer.drain(..total_len).collect();
        let message_crc = read_u32(&frame, total_len - CRC_LEN);
        if checksum(&frame[..total_len - CRC_LEN]) != message_crc {
            return Err(DomainError::backend("event stream message checksum mismatch"));
        }

        let headers = parse_headers(&frame[PRELUDE_LEN..PRELUDE_LEN + headers_len])?;
        let payload = frame[PRELUDE_LEN + headers_len..total_len - CRC_LEN].to_vec();
        Ok(Some(Frame { headers, payload }))
    }
}

fn checksum(bytes: &[u8]) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(bytes);
    hasher.finalize()
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], DomainError> {
        let end = self.pos + n;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or_else(|| DomainError::backend("truncated event stream header"))?;
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DomainError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn sized(&mut self) -> Result<&'a [u8], DomainError> {
        let len = u16::from_be_bytes(self.array()?) as usize;
        self.take(len)
    }
}

fn parse_headers(bytes: &[u8]) -> Result<HashMap<String, HeaderValue>, DomainError> {
    let mut cursor = Cursor { bytes, pos: 0 };
    let mut headers = HashMap::new();

    while cursor.pos < bytes.len() {
        let name_len = cursor.take(1)?[0] as usize;
        let name = String::from_utf8_lossy(cursor.take(name_len)?).into_owned();
        let value = match cursor.take(1)?[0] {
            0 => HeaderValue::Bool(true),
            1 => HeaderValue::Bool(false),
            2 => HeaderValue::Byte(i8::from_be_bytes(cursor.array()?)),
            3 => HeaderValue::Short(i16::from_be_bytes(cursor.array()?)),
            4 => HeaderValue::Int(i32::from_be_bytes(cursor.array()?)),
            5 => HeaderValue::Long(i64::from_be_bytes(cursor.array()?)),
            6 => HeaderValue::Bytes(cursor.sized()?.to_vec()),
            7 => HeaderValue::String(String::from_utf8_lossy(cursor.sized()?).into_owned()),
            8 => HeaderValue::Timestamp(i64::from_be_bytes(cursor.array()?)),
            9 => HeaderValue::Uuid(cursor.array()?),
            other => {
                return Err(DomainError::backend(format!(
                    "unknown event stream header type {other}"
                )))
            }
        };
        headers.insert(name, value);
    }

    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Encode a frame with string headers.
    fn encode_frame(headers: &[(&str, &str)], payload: &[u8]) -> Vec<u8> {
        let mut encoded_headers = Vec::new();
        for (name, value) in headers {
            encoded_headers.push(name.len() as u8);
            encoded_headers.extend_from_slice(name.as_bytes());
            encoded_headers.push(7);
            encoded_headers.extend_from_slice(&(value.len() as u16).to_be_bytes());
            encoded_headers.extend_from_slice(value.as_bytes());
        }

        let total = PRELUDE_LEN + encoded_headers.len() + payload.len() + CRC_LEN;
        let mut frame = Vec::with_capacity(total);
        frame.extend_from_slice(&(total as u32).to_be_bytes());
        frame.extend_from_slice(&(encoded_headers.len() as u32).to_be_bytes());
        let prelude_crc = checksum(&frame);
        frame.extend_from_slice(&prelude_crc.to_be_bytes());
        frame.extend_from_slice(&encoded_headers);
        frame.extend_from_slice(payload);
        let message_crc = checksum(&frame);
        frame.extend_from_slice(&message_crc.to_be_bytes());
        frame
    }

    fn event_frame(event_type: &str, payload: &str) -> Vec<u8> {
        encode_frame(
            &[(":message-type", "event"), (":event-type", event_type)],
            payload.as_bytes(),
        )
    }

    #[test]
    fn decodes_frames_split_across_chunks() {
        let mut bytes = event_frame("contentBlockDelta", r#"{"delta":{"text":"Hel"}}"#);
        bytes.extend(event_frame("contentBlockDelta", r#"{"delta":{"text":"lo"}}"#));

        let mut decoder = EventStreamDecoder::new();
        let mut texts = Vec::new();
        for chunk in bytes.chunks(7) {
            decoder.push(chunk);
            while let Some(frame) = decoder.next_frame().unwrap() {
                if let Some(DeltaEvent::TextDelta(t)) = frame.into_delta_event().unwrap() {
                    texts.push(t);
                }
            }
        }

        assert_eq!(texts, vec!["Hel", "lo"]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn rejects_corrupted_message() {
        let mut bytes = event_frame("messageStart", r#"{"role":"assistant"}"#);
        let last_payload_byte = bytes.len() - CRC_LEN - 1;
        bytes[last_payload_byte] ^= 0xff;

        let mut decoder = EventStreamDecoder::new();
        decoder.push(&bytes);
        assert!(decoder.next_frame().unwrap_err().is_backend_error());
    }

    #[test]
    fn exception_frame_becomes_backend_error() {
        let bytes = encode_frame(
            &[
                (":message-type", "exception"),
                (":exception-type", "throttlingException"),
            ],
            br#"{"message":"slow down"}"#,
        );
        let mut decoder = EventStreamDecoder::new();
        decoder.push(&bytes);
        let frame = decoder.next_frame().unwrap().unwrap();
        let err = frame.into_delta_event().unwrap_err();
        assert_eq!(err.to_string(), "Backend error: throttlingException: slow down");
    }

    #[test]
    fn message_stop_carries_reason() {
        let mut decoder = EventStreamDecoder::new();
        decoder.push(&event_frame("messageStop", r#"{"stopReason":"end_turn"}"#));
        let event = decoder.next_frame().unwrap().unwrap().into_delta_event().unwrap();
        assert_eq!(
            event,
            Some(DeltaEvent::MessageStop {
                stop_reason: Some("end_turn".to_string())
            })
        );
    }

    #[test]
    fn parses_typed_headers() {
        let mut headers = vec![4u8];
        headers.extend_from_slice(b"flag");
        headers.push(0);
        headers.push(3);
        headers.extend_from_slice(b"num");
        headers.push(4);
        headers.extend_from_slice(&42i32.to_be_bytes());

        let parsed = parse_headers(&headers).unwrap();
        assert_eq!(parsed["flag"], HeaderValue::Bool(true));
        assert_eq!(parsed["num"], HeaderValue::Int(42));
    }
}
