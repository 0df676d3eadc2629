//! Minimal STOMP 1.2 frame codec for the realtime match feed.
//!
//! Only the client side of the protocol is covered: the frames the client
//! sends (`CONNECT`, `SUBSCRIBE`, `UNSUBSCRIBE`, `DISCONNECT`) and the frames
//! the broker sends back (`CONNECTED`, `MESSAGE`, `RECEIPT`, `ERROR`).
//!
//! A frame on the wire is:
//!
//! ```text
//! COMMAND
//! header1:value1
//! header2:value2
//!
//! body^@
//! ```
//!
//! where `^@` is the NUL octet. A message consisting only of end-of-line
//! characters is a heart-beat.

use std::fmt;

use crate::error::{Result, SessionError};

/// Protocol versions offered in the `CONNECT` frame.
pub const ACCEPT_VERSION: &str = "1.2,1.1";

const NUL: char = '\0';

/// STOMP frame commands used by the session client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Connected,
    Subscribe,
    Unsubscribe,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Connected => "CONNECTED",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    fn parse(line: &str) -> Option<Self> {
        Some(match line {
            "CONNECT" | "STOMP" => Self::Connect,
            "CONNECTED" => Self::Connected,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "DISCONNECT" => Self::Disconnect,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            _ => return None,
        })
    }

    /// `CONNECT` and `CONNECTED` headers are never escaped (STOMP 1.2 §Value Encoding).
    fn escapes_headers(&self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    /// Headers in wire order. Repeated names are kept; the first one wins.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the first value of the named header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// `CONNECT` carrying the bearer token as an `Authorization` header.
    ///
    /// Heart-beating is disabled; liveness is left to the server.
    pub fn connect(host: &str, token: &str) -> Self {
        Self::new(Command::Connect)
            .with_header("accept-version", ACCEPT_VERSION)
            .with_header("host", host)
            .with_header("heart-beat", "0,0")
            .with_header("Authorization", format!("Bearer {token}"))
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(Command::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination)
            .with_header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Self::new(Command::Unsubscribe).with_header("id", id)
    }

    pub fn disconnect(receipt: &str) -> Self {
        Self::new(Command::Disconnect).with_header("receipt", receipt)
    }

    /// Short description for logs: the `message` header of an `ERROR` frame,
    /// falling back to its body.
    pub fn error_message(&self) -> String {
        match self.header("message") {
            Some(message) if !message.is_empty() => message.to_string(),
            _ if !self.body.trim().is_empty() => self.body.trim().to_string(),
            _ => "no error message".to_string(),
        }
    }

    /// Serialize to the text form sent in one WebSocket message.
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.header("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push(NUL);
        out
    }
}

/// Parse one text message into a frame.
///
/// Returns `Ok(None)` for a heart-beat (a message of only EOLs).
///
/// # Errors
///
/// Returns [`SessionError::Frame`] when the command is unknown, a header line
/// has no colon, the header block is unterminated, or the body is not
/// NUL-terminated.
pub fn decode(text: &str) -> Result<Option<Frame>> {
    let text = text.trim_start_matches(['\r', '\n']);
    if text.is_empty() {
        return Ok(None);
    }

    let (head, rest) = split_line(text)
        .ok_or_else(|| SessionError::Frame("frame has no command line".into()))?;
    let command = Command::parse(head)
        .ok_or_else(|| SessionError::Frame(format!("unknown command {head:?}")))?;

    let mut headers = Vec::new();
    let mut remaining = rest;
    loop {
        let (line, next) = split_line(remaining)
            .ok_or_else(|| SessionError::Frame("unterminated header block".into()))?;
        remaining = next;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| SessionError::Frame(format!("header without colon: {line:?}")))?;
        if command.escapes_headers() {
            headers.push((unescape_header(name)?, unescape_header(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let body = read_body(remaining, &headers)?;

    Ok(Some(Frame {
        command,
        headers,
        body,
    }))
}

/// Split off one line, accepting `\n` or `\r\n` endings.
fn split_line(text: &str) -> Option<(&str, &str)> {
    let (line, rest) = text.split_once('\n')?;
    Some((line.strip_suffix('\r').unwrap_or(line), rest))
}

fn read_body(remaining: &str, headers: &[(String, String)]) -> Result<String> {
    let declared = headers
        .iter()
        .find(|(name, _)| name == "content-length")
        .map(|(_, value)| value.trim().parse::<usize>());

    match declared {
        Some(Ok(len)) => {
            let body = remaining
                .get(..len)
                .ok_or_else(|| SessionError::Frame("body shorter than content-length".into()))?;
            if !remaining.get(len..).is_some_and(|tail| tail.starts_with(NUL)) {
                return Err(SessionError::Frame("body not NUL-terminated".into()));
            }
            Ok(body.to_string())
        }
        Some(Err(_)) => Err(SessionError::Frame("invalid content-length".into())),
        None => {
            let (body, _) = remaining
                .split_once(NUL)
                .ok_or_else(|| SessionError::Frame("body not NUL-terminated".into()))?;
            Ok(body.to_string())
        }
    }
}

fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(SessionError::Frame(format!(
                    "invalid header escape \\{}",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn connect_frame_carries_bearer_token_unescaped() {
        let text = Frame::connect("localhost", "abc:def").encode();
        assert!(text.starts_with("CONNECT\n"));
        assert!(text.contains("\nAuthorization:Bearer abc:def\n"));
        assert!(text.ends_with("\n\n\0"));
    }

    #[test]
    fn decodes_connected_frame() {
        let frame = decode("CONNECTED\nversion:1.2\nheart-beat:0,0\n\n\0")
            .unwrap()
            .unwrap();
        assert_eq!(frame.command, Command::Connected);
        assert_eq!(frame.header("version"), Some("1.2"));
        assert!(frame.body.is_empty());
    }

    #[test]
    fn decodes_message_with_content_length() {
        let body = r#"{"winner":"alice"}"#;
        let text = format!(
            "MESSAGE\r\ndestination:/topic/matches\r\nsubscription:sub-0\r\ncontent-length:{}\r\n\r\n{body}\0\n",
            body.len()
        );
        let frame = decode(&text).unwrap().unwrap();
        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.header("subscription"), Some("sub-0"));
        assert_eq!(frame.body, body);
    }

    #[test]
    fn body_may_contain_nul_when_length_is_declared() {
        let frame = decode("MESSAGE\ncontent-length:3\n\na\0b\0").unwrap().unwrap();
        assert_eq!(frame.body, "a\0b");
    }

    #[test]
    fn heartbeat_decodes_to_none() {
        assert!(decode("\n").unwrap().is_none());
        assert!(decode("\r\n\r\n").unwrap().is_none());
        assert!(decode("").unwrap().is_none());
    }

    #[test]
    fn leading_heartbeats_are_skipped() {
        let frame = decode("\n\nRECEIPT\nreceipt-id:bye\n\n\0").unwrap().unwrap();
        assert_eq!(frame.command, Command::Receipt);
    }

    #[test]
    fn first_repeated_header_wins() {
        let frame = decode("MESSAGE\nfoo:1\nfoo:2\n\n\0").unwrap().unwrap();
        assert_eq!(frame.header("foo"), Some("1"));
    }

    #[test]
    fn message_headers_are_unescaped() {
        let frame = decode("MESSAGE\nnote:a\\cb\\nc\\\\d\n\n\0").unwrap().unwrap();
        assert_eq!(frame.header("note"), Some("a:b\nc\\d"));
    }

    #[test]
    fn subscribe_headers_are_escaped_on_encode() {
        let text = Frame::subscribe("sub:1", "/topic/matches").encode();
        assert!(text.contains("\nid:sub\\c1\n"));
        let back = decode(&text).unwrap().unwrap();
        assert_eq!(back.header("id"), Some("sub:1"));
    }

    #[test]
    fn rejects_unknown_command() {
        let err = decode("HELLO\n\n\0").unwrap_err();
        assert!(matches!(err, SessionError::Frame(_)));
    }

    #[test]
    fn rejects_missing_nul() {
        assert!(decode("MESSAGE\n\nbody").is_err());
        assert!(decode("MESSAGE\ncontent-length:2\n\nbody\0").is_err());
    }

    #[test]
    fn rejects_bad_escape() {
        assert!(decode("MESSAGE\nx:\\t\n\n\0").is_err());
    }

    #[test]
    fn error_message_prefers_header() {
        let frame = decode("ERROR\nmessage:Invalid token\n\ndetails\0")
            .unwrap()
            .unwrap();
        assert_eq!(frame.error_message(), "Invalid token");

        let bare = Frame::new(Command::Error).with_body("  denied \n");
        assert_eq!(bare.error_message(), "denied");
    }

    #[test]
    fn encode_adds_content_length_for_body() {
        let text = Frame::new(Command::Message).with_body("hi").encode();
        assert!(text.contains("content-length:2\n"));
        let back = decode(&text).unwrap().unwrap();
        assert_eq!(back.body, "hi");
    }
}
