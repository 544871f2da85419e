//! STOMP 1.2 text frames.
//!
//! A frame is `COMMAND EOL (header EOL)* EOL body NUL`. Header names and
//! values are escaped (`\\`, `\n`, `\r`, `\c`) on every frame except
//! `CONNECT` and `CONNECTED`.

use std::fmt;

use crate::error::ChatError;

/// Frame commands used by the chat client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Client → server: open a session.
    Connect,
    /// Server → client: session accepted.
    Connected,
    /// Client → server: publish to a destination.
    Send,
    /// Client → server: start a subscription.
    Subscribe,
    /// Client → server: end a subscription.
    Unsubscribe,
    /// Server → client: message on a subscription.
    Message,
    /// Server → client: receipt for a client frame.
    Receipt,
    /// Server → client: error, session ends.
    Error,
    /// Client → server: graceful close.
    Disconnect,
}

impl Command {
    /// Wire name, e.g. `"SUBSCRIBE"`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
            Self::Disconnect => "DISCONNECT",
        }
    }

    /// Parses a wire name. `STOMP` is accepted as a synonym of `CONNECT`.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let command = match name {
            "CONNECT" | "STOMP" => Self::Connect,
            "CONNECTED" => Self::Connected,
            "SEND" => Self::Send,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            "DISCONNECT" => Self::Disconnect,
            _ => return None,
        };
        Some(command)
    }

    const fn escapes_headers(self) -> bool {
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
    command: Command,
    headers: Vec<(String, String)>,
    body: String,
}

impl Frame {
    /// Creates a frame with no headers and an empty body.
    #[must_use]
    pub const fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Appends a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Frame command.
    #[must_use]
    pub const fn command(&self) -> Command {
        self.command
    }

    /// Frame body.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Value of the first header named `name`. Repeated headers keep the
    /// first occurrence.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Serialises the frame, NUL terminator included. A `content-length`
    /// header is added for non-empty bodies unless one is already present.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if self.command.escapes_headers() {
                out.push_str(&escape(name));
                out.push(':');
                out.push_str(&escape(value));
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
        out.push('\0');
        out
    }

    /// Parses one frame with its NUL terminator already removed (see
    /// [`split_frames`]).
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Frame`] for an unknown command, a header line
    /// without `:`, an invalid escape, or a missing blank line after the
    /// headers.
    pub fn parse(raw: &str) -> Result<Self, ChatError> {
        let rest = raw.trim_start_matches(['\r', '\n']);
        let (command_line, mut rest) =
            next_line(rest).ok_or_else(|| ChatError::Frame("missing command line".to_string()))?;
        let command = Command::parse(command_line)
            .ok_or_else(|| ChatError::Frame(format!("unknown command {command_line:?}")))?;

        let mut headers = Vec::new();
        loop {
            let (line, after) = next_line(rest)
                .ok_or_else(|| ChatError::Frame("unterminated header block".to_string()))?;
            rest = after;
            if line.is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| ChatError::Frame(format!("header without ':' {line:?}")))?;
            if command.escapes_headers() {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        Ok(Self {
            command,
            headers,
            body: rest.to_string(),
        })
    }
}

/// Splits a text payload into raw frames, dropping NUL terminators and the
/// bare EOLs used as heart-beats.
pub fn split_frames(payload: &str) -> impl Iterator<Item = &str> {
    payload
        .split('\0')
        .map(|chunk| chunk.trim_start_matches(['\r', '\n']))
        .filter(|chunk| !chunk.is_empty())
}

fn next_line(input: &str) -> Option<(&str, &str)> {
    let (line, rest) = input.split_once('\n')?;
    Some((line.strip_suffix('\r').unwrap_or(line), rest))
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
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

fn unescape(raw: &str) -> Result<String, ChatError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
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
            other => {
                return Err(ChatError::Frame(format!(
                    "invalid header escape \\{}",
                    other.map(String::from).unwrap_or_default()
                )));
            }
        }
    }
    Ok(out)
}
