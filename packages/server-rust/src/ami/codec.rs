//! Manager interface framing.
//!
//! The server greets with a single banner line. After that every message is a
//! block of `Key: Value` lines terminated by an empty line.

use std::io;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::{AmiAction, AmiEvent, AmiResponse};

/// Upper bound on a single undelimited block.
const MAX_BLOCK_LEN: usize = 256 * 1024;

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmiMessage {
    /// `Asterisk Call Manager/x.y`
    Banner(String),
    Response {
        action_id: Option<String>,
        response: AmiResponse,
    },
    Event(AmiEvent),
    /// A block that is neither a response nor an event.
    Other(Vec<(String, String)>),
}

#[derive(Debug, Default)]
pub struct AmiCodec {
    banner_seen: bool,
}

impl AmiCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Finds the end of the first block: returns (content length, bytes to consume).
fn block_end(src: &[u8]) -> Option<(usize, usize)> {
    let crlf = src.windows(3).position(|w| w == b"\n\r\n").map(|p| (p, p + 3));
    let lf = src.windows(2).position(|w| w == b"\n\n").map(|p| (p, p + 2));
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn parse_fields(block: &str) -> Vec<(String, String)> {
    let mut fields: Vec<(String, String)> = Vec::new();
    for line in block.lines().map(|l| l.trim_end_matches('\r')) {
        if line.is_empty() {
            continue;
        }
        match line.split_once(':') {
            Some((key, value)) => fields.push((key.trim().to_string(), value.trim().to_string())),
            // Raw command output following `Response: Follows`.
            None => fields.push(("Output".to_string(), line.to_string())),
        }
    }
    fields
}

fn take(fields: &mut Vec<(String, String)>, key: &str) -> Option<String> {
    let index = fields.iter().position(|(k, _)| k.eq_ignore_ascii_case(key))?;
    Some(fields.remove(index).1)
}

fn classify(mut fields: Vec<(String, String)>) -> AmiMessage {
    if let Some(status) = take(&mut fields, "Response") {
        let action_id = take(&mut fields, "ActionID");
        let message = take(&mut fields, "Message");
        let success = status.eq_ignore_ascii_case("success") || status.eq_ignore_ascii_case("follows");
        return AmiMessage::Response {
            action_id,
            response: AmiResponse {
                success,
                message,
                fields,
            },
        };
    }
    if let Some(name) = take(&mut fields, "Event") {
        return AmiMessage::Event(AmiEvent { name, fields });
    }
    AmiMessage::Other(fields)
}

impl Decoder for AmiCodec {
    type Item = AmiMessage;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !self.banner_seen {
            let Some(newline) = src.iter().position(|b| *b == b'\n') else {
                return Ok(None);
            };
            let line = src.split_to(newline + 1);
            self.banner_seen = true;
            let banner = String::from_utf8_lossy(&line).trim().to_string();
            return Ok(Some(AmiMessage::Banner(banner)));
        }

        loop {
            // Stray blank lines between blocks.
            while src.first().is_some_and(|b| *b == b'\r' || *b == b'\n') {
                src.advance(1);
            }
            let Some((len, consumed)) = block_end(src) else {
                if src.len() > MAX_BLOCK_LEN {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "manager block exceeds maximum length",
                    ));
                }
                return Ok(None);
            };
            let block = src.split_to(consumed);
            let fields = parse_fields(&String::from_utf8_lossy(&block[..len]));
            if !fields.is_empty() {
                return Ok(Some(classify(fields)));
            }
        }
    }
}

impl Encoder<AmiAction> for AmiCodec {
    type Error = io::Error;

    fn encode(&mut self, action: AmiAction, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.put_slice(b"Action: ");
        dst.put_slice(action.name.as_bytes());
        dst.put_slice(b"\r\n");
        for (key, value) in &action.headers {
            dst.put_slice(key.as_bytes());
            dst.put_slice(b": ");
            dst.put_slice(value.as_bytes());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut AmiCodec, input: &str) -> Vec<AmiMessage> {
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        while let Some(message) = codec.decode(&mut buf).unwrap() {
            out.push(message);
        }
        out
    }

    #[test]
    fn banner_then_response() {
        let mut codec = AmiCodec::new();
        let messages = decode_all(
            &mut codec,
            "Asterisk Call Manager/1.1\r\nResponse: Success\r\nActionID: 7\r\nMessage: Authentication accepted\r\n\r\n",
        );

        assert_eq!(messages[0], AmiMessage::Banner("Asterisk Call Manager/1.1".into()));
        assert_eq!(
            messages[1],
            AmiMessage::Response {
                action_id: Some("7".into()),
                response: AmiResponse::success("Authentication accepted"),
            }
        );
    }

    #[test]
    fn event_keeps_field_order_and_strips_name() {
        let mut codec = AmiCodec {
            banner_seen: true,
        };
        let messages = decode_all(
            &mut codec,
            "Event: AsyncAGI\r\nSubEvent: Start\r\nChannel: SIP/1234-00000000\r\nEnv: agi_request%3A%20async%0A\r\n\r\n",
        );

        let AmiMessage::Event(event) = &messages[0] else {
            panic!("expected event, got {messages:?}");
        };
        assert_eq!(event.name, "AsyncAGI");
        assert_eq!(event.sub_event(), Some("Start"));
        assert_eq!(event.channel(), Some("SIP/1234-00000000"));
        assert_eq!(event.fields.len(), 3);
    }

    #[test]
    fn partial_block_waits_for_more_input() {
        let mut codec = AmiCodec {
            banner_seen: true,
        };
        let mut buf = BytesMut::from("Event: FullyBooted\r\nStatus: ");
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"Fully Booted\r\n\r\n");
        let Some(AmiMessage::Event(event)) = codec.decode(&mut buf).unwrap() else {
            panic!("expected event");
        };
        assert_eq!(event.get("Status"), Some("Fully Booted"));
        assert!(buf.is_empty());
    }

    #[test]
    fn error_response_is_not_success() {
        let mut codec = AmiCodec {
            banner_seen: true,
        };
        let messages = decode_all(&mut codec, "Response: Error\nActionID: 9\nMessage: No such channel\n\n");
        assert_eq!(
            messages,
            vec![AmiMessage::Response {
                action_id: Some("9".into()),
                response: AmiResponse::error("No such channel"),
            }]
        );
    }

    #[test]
    fn encodes_action_block() {
        let mut codec = AmiCodec::new();
        let mut dst = BytesMut::new();
        codec
            .encode(
                AmiAction::new("Hangup")
                    .with("ActionID", "3")
                    .with("Channel", "SIP/101-3f3f")
                    .with("Cause", "16"),
                &mut dst,
            )
            .unwrap();

        assert_eq!(
            &dst[..],
            b"Action: Hangup\r\nActionID: 3\r\nChannel: SIP/101-3f3f\r\nCause: 16\r\n\r\n"
        );
    }
}
