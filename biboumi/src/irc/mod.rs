//! Everything on the IRC side of the gateway (spec.md §4.7 "IrcClient").
//!
//! [`client`] holds the synchronous protocol state machine, [`connection`]
//! drives it over a real socket, and the remaining modules are the pieces
//! `client` composes: channel/user state, ISUPPORT parsing, CTCP framing,
//! line framing and send throttling.

pub mod channel;
pub mod client;
pub mod connection;
pub mod ctcp;
pub mod event;
pub mod format;
pub mod isupport;
pub mod message;
pub mod throttle;

pub use channel::{IrcChannel, IrcUser};
pub use client::{casefold, IrcClient, IrcClientOptions};
pub use connection::IrcCommand;
pub use event::IrcEvent;
