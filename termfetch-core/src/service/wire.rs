//! Newline-delimited JSON framing spoken with the local data-service bridge.
//!
//! Client → service: one [`ClientFrame`] per line.
//! Service → client: one [`Event`] per line.

use super::event::{Event, EventType, Message};
use super::request::HistoricalDataParams;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame is not an event: {0}")]
    Envelope(serde_json::Error),

    #[error("frame is not valid UTF-8")]
    Utf8,

    #[error("empty frame")]
    Empty,
}

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    OpenService {
        service: String,
    },
    Request {
        #[serde(rename = "correlationId")]
        correlation_id: u64,
        operation: String,
        params: HistoricalDataParams,
    },
    Close,
}

/// Encode a frame as one JSON line, trailing newline included.
pub fn encode_frame(frame: &ClientFrame) -> Result<Vec<u8>, WireError> {
    let mut bytes = serde_json::to_vec(frame)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decode one client frame (used by loopback servers in tests and tooling).
pub fn decode_frame(line: &[u8]) -> Result<ClientFrame, WireError> {
    let text = trim_line(line)?;
    Ok(serde_json::from_str(text)?)
}

/// Encode an event as one JSON line.
pub fn encode_event(event: &Event) -> Result<Vec<u8>, WireError> {
    let mut bytes = serde_json::to_vec(event)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Outer shape of an event line. Messages are read one by one afterwards.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    event_type: EventType,
    #[serde(default)]
    messages: Vec<Value>,
}

/// Decode one event line. Surrounding whitespace and the newline are ignored.
///
/// Only a line that is not JSON, or has no event envelope, is an error. A
/// message that does not fit [`Message`] lands in [`Event::unreadable`] and
/// its siblings are kept.
pub fn decode_event(line: &[u8]) -> Result<Event, WireError> {
    let text = trim_line(line)?;
    let value: Value = serde_json::from_str(text)?;
    let envelope: Envelope = serde_json::from_value(value).map_err(WireError::Envelope)?;

    let mut event = Event::new(envelope.event_type, Vec::with_capacity(envelope.messages.len()));
    for raw in envelope.messages {
        match serde_json::from_value::<Message>(raw) {
            Ok(msg) => event.messages.push(msg),
            Err(e) => event.unreadable.push(e.to_string()),
        }
    }
    Ok(event)
}

fn trim_line(line: &[u8]) -> Result<&str, WireError> {
    let text = std::str::from_utf8(line).map_err(|_| WireError::Utf8)?.trim();
    if text.is_empty() {
        return Err(WireError::Empty);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::event::EventType;

    #[test]
    fn frames_are_tagged_and_newline_terminated() {
        let bytes = encode_frame(&ClientFrame::OpenService {
            service: "//blp/refdata".into(),
        })
        .unwrap();
        assert_eq!(bytes.last(), Some(&b'\n'));
        let text = std::str::from_utf8(&bytes).unwrap();
        assert_eq!(
            text.trim(),
            r#"{"type":"openService","service":"//blp/refdata"}"#
        );

        let close = encode_frame(&ClientFrame::Close).unwrap();
        assert_eq!(std::str::from_utf8(&close).unwrap().trim(), r#"{"type":"close"}"#);
    }

    #[test]
    fn decode_event_tolerates_crlf() {
        let event = decode_event(b"{\"eventType\":\"TIMEOUT\"}\r\n").unwrap();
        assert_eq!(event.event_type, EventType::Timeout);
    }

    #[test]
    fn bad_message_does_not_spoil_its_siblings() {
        let line = br#"{"eventType":"RESPONSE","messages":[
            {"messageType":"HistoricalDataResponse","securityData":{"security":"SPY US Equity"}},
            {"messageType":null,"securityData":{"security":"QQQ US Equity"}},
            {"messageType":"HistoricalDataResponse","correlationId":"7"}
        ]}"#;
        let event = decode_event(line).unwrap();
        assert!(event.is_terminal());
        assert_eq!(event.messages.len(), 1);
        assert_eq!(event.unreadable.len(), 2);
    }

    #[test]
    fn json_without_an_envelope_is_an_error() {
        assert!(matches!(decode_event(b"[1,2,3]\n"), Err(WireError::Envelope(_))));
        assert!(matches!(
            decode_event(br#"{"messages":[]}"#),
            Err(WireError::Envelope(_))
        ));
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(matches!(decode_event(b"not json\n"), Err(WireError::Json(_))));
        assert!(matches!(decode_event(b"   \n"), Err(WireError::Empty)));
        assert!(matches!(decode_event(&[0xff, 0xfe]), Err(WireError::Utf8)));
    }
}
