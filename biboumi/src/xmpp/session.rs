//! The XMPP component session: handshake, stanza dispatch, and the
//! outbound stanza builders every other module reaches for (spec.md §4.6).
//!
//! The component handshake itself (stream negotiation plus the
//! `hex(sha1(stream_id || secret))` digest) is handled by
//! [`tokio_xmpp::component::Component`] — there is nothing left for this
//! module to reimplement there. What remains is everything above that
//! layer: classifying inbound `Element`s into `Iq`/`Message`/`Presence`,
//! and building every outbound stanza shape the bridge needs.

use chrono::{SecondsFormat, TimeZone, Utc};
use futures::{SinkExt, StreamExt};
use jid::Jid;
use minidom::Element;
use tokio_xmpp::component::Component;
use tokio_xmpp::connect::{DnsConfig, TcpServerConnector};
use tokio_xmpp::xmlstream::Timeouts;
use xmpp_parsers::iq::{Iq, IqType};
use xmpp_parsers::message::{Body, Message, MessageType, Subject};
use xmpp_parsers::muc::user::{Actor, Affiliation, Item, MucUser, Role, Status};
use xmpp_parsers::presence::{Presence, Type as PresenceType};
use xmpp_parsers::stanza_error::{DefinedCondition, ErrorType, StanzaError};

use crate::error::{Error, Result};

/// Something classified out of a raw inbound `Element` (spec.md §4.6
/// "Stanza dispatch" — unknown top-level names are dropped by the
/// caller before this type is even considered).
pub enum Inbound {
    Iq(Iq),
    Message(Message),
    Presence(Presence),
}

/// Wraps the component connection. Generic only so that tests could swap
/// in another [`tokio_xmpp::connect::ServerConnector`]; production code
/// always instantiates this with `TcpServerConnector`.
pub struct XmppSession {
    component: Component<TcpServerConnector>,
}

impl XmppSession {
    /// Opens the component stream and performs the handshake.
    pub async fn connect(hostname: &str, password: &str, server_addr: &str) -> Result<XmppSession> {
        let component = Component::new_plaintext(
            hostname,
            password,
            DnsConfig::addr(server_addr),
            Timeouts::tight(),
        )
        .await
        .map_err(Error::Xmpp)?;
        Ok(XmppSession { component })
    }

    /// The component's own JID (bare, equal to the configured hostname).
    pub fn jid(&self) -> &Jid {
        &self.component.jid
    }

    /// Waits for and classifies the next stanza, dropping (with a log
    /// line, left to the caller) anything that is neither iq, message nor
    /// presence.
    pub async fn recv(&mut self) -> Option<Inbound> {
        loop {
            let element = self.component.next().await?;
            if let Ok(iq) = Iq::try_from(element.clone()) {
                return Some(Inbound::Iq(iq));
            }
            if let Ok(message) = Message::try_from(element.clone()) {
                return Some(Inbound::Message(message));
            }
            if let Ok(presence) = Presence::try_from(element.clone()) {
                return Some(Inbound::Presence(presence));
            }
            log::warn!("dropping unrecognized top-level stanza <{}>", element.name());
        }
    }

    /// Sends an already-built stanza.
    pub async fn send(&mut self, element: Element) -> Result<()> {
        self.component.send(element).await.map_err(Error::Xmpp)
    }

    /// Sends a typed `Iq`/`Message`/`Presence`.
    pub async fn send_stanza<S: Into<Element>>(&mut self, stanza: S) -> Result<()> {
        self.send(stanza.into()).await
    }

    /// Closes the stream cleanly.
    pub async fn close(&mut self) -> Result<()> {
        self.component.send_end().await.map_err(Error::Xmpp)
    }
}

/// Formats a UTC unix timestamp the way spec.md's archive scenario
/// expects: whole seconds, literal `Z`, no fractional part. Used instead
/// of `xmpp_parsers::date::DateTime`'s `Display` (which always emits
/// microsecond precision) for the `<delay stamp=...>` attribute.
pub fn format_delay_stamp(unix_seconds: i64) -> String {
    Utc.timestamp_opt(unix_seconds, 0)
        .single()
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

/// Builds a `<delay/>` element with a manually-formatted `stamp`, bypassing
/// the typed `Delay` struct so the wire format matches exactly (see
/// [`format_delay_stamp`]).
pub fn build_delay(from: &Jid, unix_seconds: i64) -> Element {
    Element::builder("delay", xmpp_parsers::ns::DELAY)
        .attr("from", from.to_string())
        .attr("stamp", format_delay_stamp(unix_seconds))
        .build()
}

/// Self-join presence (status code 110), sent to the joining resource.
pub fn build_self_join_presence(room: &Jid, to: &Jid, affiliation: Affiliation, role: Role) -> Presence {
    let mut presence = Presence::new(PresenceType::None);
    presence.from = Some(room.clone());
    presence.to = Some(to.clone());
    let item = Item::new(affiliation, role);
    let muc_user = MucUser::new()
        .with_statuses(vec![Status::SelfPresence])
        .with_items(vec![item]);
    presence.payloads.push(muc_user.into());
    presence
}

/// A non-self join presence for another occupant.
pub fn build_occupant_presence(
    room_with_nick: &Jid,
    to: &Jid,
    affiliation: Affiliation,
    role: Role,
) -> Presence {
    let mut presence = Presence::new(PresenceType::None);
    presence.from = Some(room_with_nick.clone());
    presence.to = Some(to.clone());
    let item = Item::new(affiliation, role);
    presence
        .payloads
        .push(MucUser::new().with_items(vec![item]).into());
    presence
}

/// MUC leave (unavailable), self-aware (adds status 110 when `is_self`).
pub fn build_leave_presence(room_with_nick: &Jid, to: &Jid, is_self: bool, reason: Option<String>) -> Presence {
    let mut presence = Presence::new(PresenceType::Unavailable);
    presence.from = Some(room_with_nick.clone());
    presence.to = Some(to.clone());
    let mut item = Item::new(Affiliation::None, Role::None);
    if let Some(reason) = reason {
        item = item.with_reason(reason);
    }
    let mut statuses = Vec::new();
    if is_self {
        statuses.push(Status::SelfPresence);
    }
    presence
        .payloads
        .push(MucUser::new().with_statuses(statuses).with_items(vec![item]).into());
    presence
}

/// Kick presence (status 307, target's item has role=none).
pub fn build_kick_presence(room_with_nick: &Jid, to: &Jid, by_nick: Option<&str>, is_self: bool) -> Presence {
    let mut presence = Presence::new(PresenceType::Unavailable);
    presence.from = Some(room_with_nick.clone());
    presence.to = Some(to.clone());
    let mut item = Item::new(Affiliation::None, Role::None);
    if let Some(nick) = by_nick {
        item = item.with_actor(Actor::Nick(nick.to_owned()));
    }
    let mut statuses = vec![Status::Kicked];
    if is_self {
        statuses.push(Status::SelfPresence);
    }
    presence
        .payloads
        .push(MucUser::new().with_statuses(statuses).with_items(vec![item]).into());
    presence
}

/// Nick-change pair: an unavailable presence with status 303 and the new
/// nick, followed by a fresh presence under the new nick.
pub fn build_nick_change_presences(
    old_room_with_nick: &Jid,
    new_room_with_nick: &Jid,
    to: &Jid,
    new_nick: &str,
    affiliation: Affiliation,
    role: Role,
    is_self: bool,
) -> (Presence, Presence) {
    let mut leaving = Presence::new(PresenceType::Unavailable);
    leaving.from = Some(old_room_with_nick.clone());
    leaving.to = Some(to.clone());
    let item = Item::new(affiliation.clone(), role.clone()).with_nick(new_nick);
    let mut statuses = vec![Status::NewNick];
    if is_self {
        statuses.push(Status::SelfPresence);
    }
    leaving
        .payloads
        .push(MucUser::new().with_statuses(statuses).with_items(vec![item]).into());

    let mut arriving = Presence::new(PresenceType::None);
    arriving.from = Some(new_room_with_nick.clone());
    arriving.to = Some(to.clone());
    let item = Item::new(affiliation, role);
    let mut statuses = Vec::new();
    if is_self {
        statuses.push(Status::SelfPresence);
    }
    arriving
        .payloads
        .push(MucUser::new().with_statuses(statuses).with_items(vec![item]).into());

    (leaving, arriving)
}

/// A `groupchat` message carrying a `<subject/>` (topic change).
pub fn build_topic_message(room: &Jid, to: &Jid, subject: &str) -> Message {
    let mut message = Message::new(Some(to.clone()));
    message.from = Some(room.clone());
    message.type_ = MessageType::Groupchat;
    message.subjects.insert(String::new(), Subject(subject.to_owned()));
    message
}

/// A groupchat message, reflected to a room occupant, carrying through
/// any origin-id/stanza-id the original sender attached and a freshly
/// synthesized `<stanza-id>` for archival (spec.md §4.8 "Message
/// reflection preservation").
pub fn build_groupchat_message(
    room_with_nick: &Jid,
    to: &Jid,
    body: &str,
    origin_id: Option<&str>,
    carried_stanza_ids: &[Element],
    room_bare: &Jid,
    archive_uuid: &str,
) -> Message {
    let mut message = Message::new(Some(to.clone()));
    message.from = Some(room_with_nick.clone());
    message.type_ = MessageType::Groupchat;
    message.bodies.insert(String::new(), Body(body.to_owned()));

    if let Some(id) = origin_id {
        message.payloads.push(
            Element::builder("origin-id", "urn:xmpp:sid:0")
                .attr("id", id)
                .build(),
        );
    }
    for carried in carried_stanza_ids {
        message.payloads.push(carried.clone());
    }
    message.payloads.push(
        Element::builder("stanza-id", "urn:xmpp:sid:0")
            .attr("by", room_bare.to_string())
            .attr("id", archive_uuid)
            .build(),
    );
    message
}

/// XEP-0071 namespace wrapping an XHTML-IM `<body/>` (see
/// [`crate::irc::format::irc_format_to_xhtmlim`]) into a sibling of the
/// plain-text `<body/>` on a message, per spec.md §8 concrete scenario 4.
const XHTMLIM_NS: &str = "http://jabber.org/protocol/xhtml-im";

/// Wraps an XHTML-IM `<body xmlns='.../xhtml'/>` tree in the `<html/>`
/// payload a message carries it as.
pub fn wrap_xhtml_im(xhtml_body: Element) -> Element {
    Element::builder("html", XHTMLIM_NS).append(xhtml_body).build()
}

/// Maps a stanza-level error condition to the standard type+condition
/// pair (spec.md §7 "Stanza-level errors"), echoing the request id and
/// setting `from` to `target`.
pub fn build_error_iq(request_id: &str, target: Jid, condition: DefinedCondition, text: &str) -> Iq {
    let type_ = match condition {
        DefinedCondition::BadRequest | DefinedCondition::JidMalformed | DefinedCondition::NotAcceptable => {
            ErrorType::Modify
        }
        _ => ErrorType::Cancel,
    };
    let error = StanzaError::new(type_, condition, "en", text);
    let mut iq = Iq::from_error(request_id.to_owned(), error);
    iq.from = Some(target);
    iq
}

/// Builds an error presence from `room_with_nick` to `to`, used to
/// forward recoverable IRC errors (nick-in-use, erroneous-nickname,
/// change-too-fast) back to every affected room JID (spec.md §7 item 6).
pub fn build_presence_error(room_with_nick: &Jid, to: &Jid, condition: DefinedCondition, text: &str) -> Presence {
    let error = StanzaError::new(ErrorType::Cancel, condition, "en", text);
    let mut presence = Presence::new(PresenceType::Error);
    presence.from = Some(room_with_nick.clone());
    presence.to = Some(to.clone());
    presence.payloads.push(error.into());
    presence
}
