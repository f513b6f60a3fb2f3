//! High-level events an [`crate::irc::client::IrcClient`] produces for its
//! owning [`crate::bridge::Bridge`] to react to.

use super::ctcp::Ctcp;

/// One decoded, semantically-meaningful thing that happened on an IRC
/// connection.
#[derive(Debug, Clone, PartialEq)]
pub enum IrcEvent {
    /// The TCP (and, if applicable, TLS) connection succeeded. Carries the
    /// local port used, so identd can later correlate queries back to the
    /// nick on this connection (spec.md §4.4).
    Connected { local_port: u16 },
    /// The welcome numeric (001) was received; registration is complete.
    Welcomed { nick: String },
    /// We joined (or re-joined, after a server bounce) a channel.
    SelfJoined { channel: String },
    /// Another user joined a channel we're in.
    UserJoined { channel: String, nick: String, host: Option<String> },
    /// `RPL_ENDOFNAMES`: the roster for `channel` is now complete.
    EndOfNames { channel: String },
    /// Topic is known (either from `RPL_TOPIC` or a live `TOPIC` command).
    Topic { channel: String, topic: Option<String>, author: Option<String> },
    /// A user (possibly ourselves) left a channel via `PART`.
    Part { channel: String, nick: String, message: Option<String> },
    /// A user quit the server entirely, leaving every channel they were in.
    Quit { nick: String, channels: Vec<String>, message: Option<String> },
    /// A user was kicked from a channel.
    Kick { channel: String, target: String, by: String, reason: Option<String> },
    /// A user (possibly ourselves) changed nick.
    NickChange { old_nick: String, new_nick: String, channels: Vec<String> },
    /// Channel or user-targeted modes changed.
    ModeChange { target: String, by: String, modestring: String, args: Vec<String>, changed_nicks: Vec<String> },
    /// A `PRIVMSG` to a channel.
    ChannelMessage { channel: String, from: String, body: String },
    /// A `NOTICE` to a channel.
    ChannelNotice { channel: String, from: String, body: String },
    /// A `PRIVMSG` directly to us.
    PrivateMessage { from: String, body: String },
    /// A `NOTICE` directly to us.
    PrivateNotice { from: String, body: String },
    /// A CTCP request embedded in a private or channel message.
    CtcpRequest { from: String, target: Option<String>, ctcp: Ctcp },
    /// We were invited to a channel.
    Invite { channel: String, from: String },
    /// A recoverable registration error (nick in use, erroneous nickname,
    /// changing nicks too fast).
    NickError { attempted_nick: String, reason: String },
    /// The connection died, either locally or from the peer.
    Disconnected { reason: String },
}
