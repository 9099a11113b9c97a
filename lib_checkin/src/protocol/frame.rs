//! # STOMP Frame Codec
//!
//! Translates between the text framing carried inside WebSocket text messages
//! and structured [`StompFrame`] values.
//!
//! Wire layout:
//!
//! ```text
//! COMMAND
//! header:value
//! ...
//!
//! <body>\0
//! ```
//!
//! A text message made only of line breaks is a heartbeat and decodes to
//! [`Inbound::Heartbeat`].

use std::collections::HashMap;
use std::fmt;

use crate::error::FrameError;

/// Command names used by this client.
pub mod commands {
    pub const CONNECT: &str = "CONNECT";
    pub const CONNECTED: &str = "CONNECTED";
    pub const SUBSCRIBE: &str = "SUBSCRIBE";
    pub const UNSUBSCRIBE: &str = "UNSUBSCRIBE";
    pub const DISCONNECT: &str = "DISCONNECT";
    pub const MESSAGE: &str = "MESSAGE";
    pub const ERROR: &str = "ERROR";
    pub const RECEIPT: &str = "RECEIPT";
}

const NUL: char = '\0';

/// One protocol message unit: command, headers and body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StompFrame {
    pub command: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

/// Result of decoding one inbound text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// EOL-only keep-alive.
    Heartbeat,
    Frame(StompFrame),
}

impl StompFrame {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            headers: HashMap::new(),
            body: String::new(),
        }
    }

    /// Adds a header, replacing any previous value for the same key.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    pub fn is(&self, command: &str) -> bool {
        self.command == command
    }

    /// Serializes the frame. Headers are written in key order so the output
    /// is stable for a given frame.
    pub fn encode(&self) -> String {
        let escape = escapes_headers(&self.command);
        let mut keys: Vec<&String> = self.headers.keys().collect();
        keys.sort();

        let mut out = String::with_capacity(self.command.len() + self.body.len() + 64);
        out.push_str(&self.command);
        out.push('\n');
        for key in keys {
            let value = &self.headers[key];
            if escape {
                out.push_str(&escape_header(key));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(key);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push(NUL);
        out
    }
}

impl fmt::Display for StompFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} headers, body {} bytes)",
            self.command,
            self.headers.len(),
            self.body.len()
        )
    }
}

/// Decodes one inbound text message.
///
/// Malformed input yields a [`FrameError`]; this function never panics.
pub fn decode(raw: &str) -> Result<Inbound, FrameError> {
    let text = raw.trim_start_matches(['\n', '\r']);
    if text.is_empty() {
        return Ok(Inbound::Heartbeat);
    }

    let (head, rest) = split_head_body(text).ok_or(FrameError::MissingSeparator)?;

    let mut lines = head.lines();
    let command = lines.next().map(str::trim).unwrap_or_default();
    if command.is_empty() {
        return Err(FrameError::EmptyCommand);
    }

    let escape = escapes_headers(command);
    let mut headers = HashMap::new();
    for line in lines {
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
        let (key, value) = if escape {
            (unescape_header(key), unescape_header(value))
        } else {
            (key.to_string(), value.to_string())
        };
        // Repeated headers: the first occurrence wins.
        headers.entry(key).or_insert(value);
    }

    let body = match headers.get("content-length") {
        Some(len) => {
            let len: usize = len
                .trim()
                .parse()
                .map_err(|_| FrameError::InvalidContentLength(len.clone()))?;
            let bytes = rest.as_bytes();
            String::from_utf8_lossy(&bytes[..len.min(bytes.len())]).into_owned()
        }
        None => match rest.find(NUL) {
            Some(end) => rest[..end].to_string(),
            None => rest.to_string(),
        },
    };

    Ok(Inbound::Frame(StompFrame {
        command: command.to_string(),
        headers,
        body,
    }))
}

/// Splits at the first empty line. The returned head keeps its line breaks.
fn split_head_body(text: &str) -> Option<(&str, &str)> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if offset > 0 && line.ends_with('\n') && line.trim_end_matches(['\n', '\r']).is_empty() {
            return Some((&text[..offset], &text[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

// CONNECT and CONNECTED predate header escaping in STOMP 1.2.
fn escapes_headers(command: &str) -> bool {
    command != commands::CONNECT && command != commands::CONNECTED
}

fn escape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            // Undefined escape: keep it verbatim.
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(inbound: Inbound) -> StompFrame {
        match inbound {
            Inbound::Frame(f) => f,
            Inbound::Heartbeat => panic!("expected a frame, got a heartbeat"),
        }
    }

    #[test]
    fn test_encode_connect_frame_layout() {
        let encoded = StompFrame::new(commands::CONNECT)
            .header("accept-version", "1.2")
            .header("heart-beat", "10000,10000")
            .header("Authorization", "Bearer abc")
            .encode();

        assert!(encoded.starts_with("CONNECT\n"));
        assert!(encoded.contains("\naccept-version:1.2\n"));
        assert!(encoded.contains("\nheart-beat:10000,10000\n"));
        assert!(encoded.contains("\nAuthorization:Bearer abc\n"));
        assert!(encoded.ends_with("\n\n\0"));
    }

    #[test]
    fn test_decode_message_with_body() {
        let raw = "MESSAGE\ndestination:/user/u1/queue/checkin-status\nsubscription:sub-0\n\n{\"type\":\"CHILD_STATUS\"}\0";
        let f = frame(decode(raw).unwrap());

        assert_eq!(f.command, "MESSAGE");
        assert_eq!(f.get_header("subscription"), Some("sub-0"));
        assert_eq!(f.body, "{\"type\":\"CHILD_STATUS\"}");
    }

    #[test]
    fn test_decode_accepts_crlf_and_leading_heartbeats() {
        let raw = "\r\n\nCONNECTED\r\nversion:1.2\r\n\r\n\0";
        let f = frame(decode(raw).unwrap());

        assert_eq!(f.command, "CONNECTED");
        assert_eq!(f.get_header("version"), Some("1.2"));
        assert!(f.body.is_empty());
    }

    #[test]
    fn test_decode_eol_only_is_heartbeat() {
        assert_eq!(decode("\n").unwrap(), Inbound::Heartbeat);
        assert_eq!(decode("\r\n\r\n").unwrap(), Inbound::Heartbeat);
        assert_eq!(decode("").unwrap(), Inbound::Heartbeat);
    }

    #[test]
    fn test_decode_without_separator_is_error() {
        assert_eq!(
            decode("MESSAGE\ndestination:/x").unwrap_err(),
            FrameError::MissingSeparator
        );
    }

    #[test]
    fn test_decode_empty_command_is_error() {
        assert_eq!(decode("   \nkey:value\n\nbody").unwrap_err(), FrameError::EmptyCommand);
    }

    #[test]
    fn test_decode_header_without_colon_is_error() {
        assert_eq!(
            decode("MESSAGE\nnot-a-header\n\n").unwrap_err(),
            FrameError::MalformedHeader("not-a-header".to_string())
        );
    }

    #[test]
    fn test_decode_first_repeated_header_wins_and_splits_on_first_colon() {
        let f = frame(decode("MESSAGE\nx:1\nx:2\nurl:http://a:80\n\n").unwrap());

        assert_eq!(f.get_header("x"), Some("1"));
        assert_eq!(f.get_header("url"), Some("http://a:80"));
    }

    #[test]
    fn test_decode_honors_content_length() {
        let f = frame(decode("MESSAGE\ncontent-length:3\n\nabc\0def").unwrap());
        assert_eq!(f.body, "abc");

        assert_eq!(
            decode("MESSAGE\ncontent-length:many\n\nabc").unwrap_err(),
            FrameError::InvalidContentLength("many".to_string())
        );
    }

    #[test]
    fn test_header_values_are_escaped_except_on_connect() {
        let subscribe = StompFrame::new(commands::SUBSCRIBE).header("subject-id", "a:b");
        let encoded = subscribe.encode();
        assert!(encoded.contains("subject-id:a\\cb\n"));
        assert_eq!(frame(decode(&encoded).unwrap()), subscribe);

        let connect = StompFrame::new(commands::CONNECT).header("host", "h:1").encode();
        assert!(connect.contains("host:h:1\n"));
    }
}
