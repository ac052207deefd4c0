//! AMI framing.
//!
//! The server opens with a single banner line (`Asterisk Call Manager/5.0.1`).
//! After that every message is a block of `Key: Value` lines terminated by an
//! empty line. Lines without a colon (command output) are ignored.

use std::fmt;

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use astcc_core::ManagerEvent;

use crate::error::CodecError;

/// Upper bound for a single banner line or message.
pub const MAX_MESSAGE_LEN: usize = 64 * 1024;

/// One decoded unit from the manager stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerFrame {
    Banner(String),
    Message(ManagerMessage),
}

/// A response or event as received from the manager.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ManagerMessage {
    headers: Vec<(String, String)>,
}

impl ManagerMessage {
    /// Parse a message body (without the terminating empty line).
    pub fn parse(text: &str) -> Self {
        let headers = text
            .lines()
            .filter_map(|line| {
                let (key, value) = line.split_once(':')?;
                let key = key.trim();
                if key.is_empty() {
                    return None;
                }
                Some((key.to_owned(), value.trim().to_owned()))
            })
            .collect();
        Self { headers }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// `Response` header: `Success`, `Error`, `Goodbye`, `Follows`, ...
    pub fn response(&self) -> Option<&str> {
        self.get("Response")
    }

    pub fn action_id(&self) -> Option<&str> {
        self.get("ActionID")
    }

    /// Human-readable `Message` header.
    pub fn message(&self) -> Option<&str> {
        self.get("Message")
    }

    pub fn is_event(&self) -> bool {
        self.get("Event").is_some()
    }

    /// Convert into an event record, or give the message back if it is not
    /// an event.
    pub fn into_event(self) -> Result<ManagerEvent, ManagerMessage> {
        if self.is_event() {
            Ok(ManagerEvent::new(self.headers))
        } else {
            Err(self)
        }
    }
}

/// An action sent to the manager.
#[derive(Clone, PartialEq, Eq)]
pub struct ManagerAction {
    headers: Vec<(String, String)>,
}

impl ManagerAction {
    pub fn new(action: &str, action_id: &str) -> Self {
        Self {
            headers: vec![
                ("Action".to_owned(), action.to_owned()),
                ("ActionID".to_owned(), action_id.to_owned()),
            ],
        }
    }

    #[must_use]
    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.push((key.to_owned(), value.to_owned()));
        self
    }

    pub fn login(username: &str, secret: &str, events: Option<&str>, action_id: &str) -> Self {
        let action = Self::new("Login", action_id)
            .header("Username", username)
            .header("Secret", secret);
        match events {
            Some(mask) => action.header("Events", mask),
            None => action,
        }
    }

    pub fn logoff(action_id: &str) -> Self {
        Self::new("Logoff", action_id)
    }

    pub fn ping(action_id: &str) -> Self {
        Self::new("Ping", action_id)
    }

    pub fn name(&self) -> &str {
        self.get("Action").unwrap_or_default()
    }

    pub fn action_id(&self) -> Option<&str> {
        self.get("ActionID")
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Debug for ManagerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (k, v) in &self.headers {
            if k.eq_ignore_ascii_case("Secret") {
                map.entry(k, &"<redacted>");
            } else {
                map.entry(k, v);
            }
        }
        map.finish()
    }
}

/// `tokio_util` codec for the manager stream.
#[derive(Debug, Default)]
pub struct ManagerCodec {
    banner_seen: bool,
}

impl ManagerCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for ManagerCodec {
    type Item = ManagerFrame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<ManagerFrame>, CodecError> {
        if !self.banner_seen {
            let Some(pos) = src.iter().position(|&b| b == b'\n') else {
                return check_len(src).map(|()| None);
            };
            let line = src.split_to(pos + 1);
            self.banner_seen = true;
            let banner = String::from_utf8_lossy(&line).trim().to_owned();
            return Ok(Some(ManagerFrame::Banner(banner)));
        }

        skip_blank_lines(src);

        let Some((body_len, consumed)) = find_message_end(src) else {
            return check_len(src).map(|()| None);
        };
        let raw = src.split_to(consumed);
        let text = String::from_utf8_lossy(&raw[..body_len]);
        Ok(Some(ManagerFrame::Message(ManagerMessage::parse(&text))))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<ManagerFrame>, CodecError> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if !src.is_empty() {
            tracing::trace!("discarding {} bytes of partial message at eof", src.len());
            src.clear();
        }
        Ok(None)
    }
}

impl Encoder<ManagerAction> for ManagerCodec {
    type Error = CodecError;

    fn encode(&mut self, action: ManagerAction, dst: &mut BytesMut) -> Result<(), CodecError> {
        for (key, value) in &action.headers {
            dst.extend_from_slice(key.as_bytes());
            dst.extend_from_slice(b": ");
            // CR/LF in a value would start a new header.
            for ch in value.chars() {
                let ch = if ch == '\r' || ch == '\n' { ' ' } else { ch };
                let mut buf = [0u8; 4];
                dst.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
            dst.extend_from_slice(b"\r\n");
        }
        dst.extend_from_slice(b"\r\n");
        Ok(())
    }
}

fn check_len(src: &BytesMut) -> Result<(), CodecError> {
    if src.len() > MAX_MESSAGE_LEN {
        Err(CodecError::TooLarge(MAX_MESSAGE_LEN))
    } else {
        Ok(())
    }
}

fn skip_blank_lines(src: &mut BytesMut) {
    loop {
        if src.starts_with(b"\r\n") {
            src.advance(2);
        } else if src.starts_with(b"\n") {
            src.advance(1);
        } else {
            return;
        }
    }
}

/// Find the empty line ending a message.
///
/// Returns `(body_len, consumed)`: the body includes the last header's line
/// ending, `consumed` also covers the empty line.
fn find_message_end(buf: &[u8]) -> Option<(usize, usize)> {
    let mut start = 0;
    while let Some(offset) = buf[start..].iter().position(|&b| b == b'\n') {
        let nl = start + offset;
        let rest = &buf[nl + 1..];
        if rest.starts_with(b"\r\n") {
            return Some((nl + 1, nl + 3));
        }
        if rest.starts_with(b"\n") {
            return Some((nl + 1, nl + 2));
        }
        start = nl + 1;
    }
    None
}
