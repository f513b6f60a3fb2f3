//! Crate-wide error type.
//!
//! Mirrors the shape of `tokio_xmpp::error::Error`: a flat enum with manual
//! `Display`/`From` impls rather than a derive-based crate, to stay
//! consistent with the rest of this workspace.

use std::fmt;
use std::io;

/// Top-level error type for the gateway.
#[derive(Debug)]
pub enum Error {
    /// I/O error.
    Io(io::Error),
    /// A mandatory configuration key is missing or invalid.
    Config(String),
    /// Error coming from the archive database.
    Database(sqlx::Error),
    /// Error coming from the XMPP component session.
    Xmpp(tokio_xmpp::Error),
    /// Error parsing a Jabber-Id.
    Jid(jid::Error),
    /// Malformed IRC-in-JID address.
    Iid(String),
    /// Malformed IRC protocol line or state.
    Irc(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::Config(e) => write!(f, "configuration error: {e}"),
            Error::Database(e) => write!(f, "database error: {e}"),
            Error::Xmpp(e) => write!(f, "XMPP error: {e}"),
            Error::Jid(e) => write!(f, "JID parse error: {e}"),
            Error::Iid(e) => write!(f, "malformed IRC address: {e}"),
            Error::Irc(e) => write!(f, "IRC error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Database(e) => Some(e),
            Error::Xmpp(e) => Some(e),
            Error::Jid(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Database(e)
    }
}

impl From<tokio_xmpp::Error> for Error {
    fn from(e: tokio_xmpp::Error) -> Self {
        Error::Xmpp(e)
    }
}

impl From<jid::Error> for Error {
    fn from(e: jid::Error) -> Self {
        Error::Jid(e)
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, Error>;
