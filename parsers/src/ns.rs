// Copyright (c) 2017 Emmanuel Gil Peyrot <linkmauve@linkmauve.fr>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! XML namespace string constants used throughout this crate.

/// Namespace for `<message/>`, `<presence/>`, `<iq/>` and their common
/// children, when no other namespace applies.
pub const DEFAULT_NS: &str = "jabber:client";

/// RFC 6120, core stream namespace.
pub const STREAM: &str = "http://etherx.jabber.org/streams";

/// RFC 6120, stream-level TLS negotiation.
pub const TLS: &str = "urn:ietf:params:xml:ns:xmpp-tls";

/// RFC 6120, SASL authentication.
pub const SASL: &str = "urn:ietf:params:xml:ns:xmpp-sasl";

/// RFC 6120, resource binding.
pub const BIND: &str = "urn:ietf:params:xml:ns:xmpp-bind";

/// RFC 6120, stream-level stanza errors.
pub const XMPP_STANZAS: &str = "urn:ietf:params:xml:ns:xmpp-stanzas";

/// XEP-0030: Service Discovery, info request.
pub const DISCO_INFO: &str = "http://jabber.org/protocol/disco#info";

/// XEP-0030: Service Discovery, items request.
pub const DISCO_ITEMS: &str = "http://jabber.org/protocol/disco#items";

/// XEP-0004: Data Forms.
pub const DATA_FORMS: &str = "jabber:x:data";

/// XEP-0045: Multi-User Chat.
pub const MUC: &str = "http://jabber.org/protocol/muc";

/// XEP-0045: Multi-User Chat, user namespace (`muc#user`).
pub const MUC_USER: &str = "http://jabber.org/protocol/muc#user";

/// XEP-0050: Ad-Hoc Commands.
pub const COMMANDS: &str = "http://jabber.org/protocol/commands";

/// XEP-0059: Result Set Management.
pub const RSM: &str = "http://jabber.org/protocol/rsm";

/// XEP-0092: Software Version.
pub const VERSION: &str = "jabber:iq:version";

/// XEP-0114: Jabber Component Protocol.
pub const COMPONENT: &str = "jabber:component:accept";

/// XEP-0122: Data Forms Validation.
pub const XDATA_VALIDATE: &str = "http://jabber.org/protocol/xdata-validate";

/// XEP-0198: Stream Management.
pub const SM: &str = "urn:xmpp:sm:3";

/// XEP-0199: XMPP Ping.
pub const PING: &str = "urn:xmpp:ping";

/// XEP-0203: Delayed Delivery.
pub const DELAY: &str = "urn:xmpp:delay";

/// XEP-0221: Data Forms Media Element.
pub const MEDIA_ELEMENT: &str = "urn:xmpp:media-element";

/// XEP-0297: Stanza Forwarding.
pub const FORWARD: &str = "urn:xmpp:forward:0";

/// XEP-0300: Use of Cryptographic Hash Functions in XMPP.
pub const HASHES: &str = "urn:xmpp:hashes:2";

/// XEP-0313: Message Archive Management.
pub const MAM: &str = "urn:xmpp:mam:2";

/// XEP-0386: Bind 2.
pub const BIND2: &str = "urn:xmpp:bind:0";

/// XEP-0388: Extensible SASL Profile.
pub const SASL2: &str = "urn:xmpp:sasl:2";

/// XEP-0440: SASL Channel-Binding Type Capability.
pub const SASL_CB: &str = "urn:xmpp:sasl-cb:0";

/// XEP-0478: Stream Limits Advertisement.
pub const STREAM_LIMITS: &str = "urn:xmpp:stream-limits:0";
