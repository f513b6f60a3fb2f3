//! CTCP (Client-To-Client Protocol) framing (spec.md §4.7, §9 Design notes).
//!
//! The original's source is stringly-typed; here the single-byte `\x01`
//! framing is decoded into a tagged variant up front.

const DELIM: char = '\x01';

/// A decoded CTCP payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ctcp {
    /// `ACTION <text>`, maps to `/me <text>` on the XMPP side.
    Action(String),
    /// `VERSION`, triggers an iq-version request upward.
    Version,
    /// `PING <token>`, triggers an XMPP ping with the token as id suffix.
    Ping(String),
    /// Any other CTCP command, kept as-is.
    Other(String, Option<String>),
}

impl Ctcp {
    /// Recognizes a PRIVMSG body beginning and ending with `\x01`.
    pub fn parse(body: &str) -> Option<Ctcp> {
        let inner = body
            .strip_prefix(DELIM)
            .and_then(|s| s.strip_suffix(DELIM))?;
        let (command, payload) = match inner.split_once(' ') {
            Some((cmd, rest)) => (cmd, Some(rest.to_owned())),
            None => (inner, None),
        };
        Some(match command.to_uppercase().as_str() {
            "ACTION" => Ctcp::Action(payload.unwrap_or_default()),
            "VERSION" => Ctcp::Version,
            "PING" => Ctcp::Ping(payload.unwrap_or_default()),
            _ => Ctcp::Other(command.to_owned(), payload),
        })
    }

    /// Re-frames this CTCP payload for sending over PRIVMSG/NOTICE.
    pub fn to_body(&self) -> String {
        let inner = match self {
            Ctcp::Action(text) => format!("ACTION {text}"),
            Ctcp::Version => "VERSION".to_owned(),
            Ctcp::Ping(token) => format!("PING {token}"),
            Ctcp::Other(cmd, Some(payload)) => format!("{cmd} {payload}"),
            Ctcp::Other(cmd, None) => cmd.clone(),
        };
        format!("{DELIM}{inner}{DELIM}")
    }
}
