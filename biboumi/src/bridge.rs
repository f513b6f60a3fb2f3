//! Per-XMPP-user bridge object (spec.md §4.8, §3 "Bridge").
//!
//! One [`Bridge`] exists per bare XMPP JID that has ever sent a stanza to
//! the gateway. It owns a set of IRC connections (one per IRC server the
//! user talks to, each driven as its own tokio task by
//! [`crate::irc::connection::run`]) and translates stanzas/IRC lines in
//! both directions. The actual IRC connection state
//! ([`crate::irc::client::IrcClient`]) lives inside its task; the bridge
//! only keeps the resource-tracking and address-translation bookkeeping
//! that genuinely belongs to the XMPP side, querying the task over a
//! small command channel (see [`IrcCommand::QueryChannel`]) when it needs
//! to read IRC-side state synchronously.

use std::collections::{HashMap, HashSet};

use jid::{BareJid, Jid};
use minidom::Element;
use sqlx::SqlitePool;
use tokio::sync::{mpsc, oneshot};
use xmpp_parsers::message::{Body, Message, MessageType};
use xmpp_parsers::muc::History;
use xmpp_parsers::muc::user::{Affiliation, Role};
use xmpp_parsers::presence::{Presence, Type as PresenceType};
use xmpp_parsers::stanza_error::DefinedCondition;

use crate::archive::{Archive, Direction};
use crate::error::Result;
use crate::identd::IdentTable;
use crate::iid::{Iid, IidKind};
use crate::irc::client::{casefold, IrcClientOptions};
use crate::irc::connection::{self, IrcCommand};
use crate::irc::event::IrcEvent;
use crate::store::{IrcChannelOptions, IrcServerOptions};
use crate::xmpp::session;

/// The maximum number of bytes of a `PRIVMSG` body chunk (spec.md §4.8
/// "Routing — XMPP → IRC").
const MAX_LINE_BYTES: usize = 400;

/// An IRC-side event, tagged with which bridge/server it came from, as
/// received by the gateway's central event loop.
pub struct BridgeEvent {
    pub owner: BareJid,
    pub server: String,
    pub event: IrcEvent,
}

/// A running IRC connection, as seen from the bridge that owns it.
struct IrcClientHandle {
    commands: mpsc::Sender<IrcCommand>,
    current_nick: String,
    /// The local TCP port of this connection, once known (spec.md §4.4).
    local_port: Option<u16>,
}

/// One XMPP user's gateway state.
pub struct Bridge {
    pub user_bare_jid: BareJid,
    component_hostname: String,
    fixed_server: Option<String>,
    db: SqlitePool,
    archive: Archive,
    idents: IdentTable,
    clients: HashMap<String, IrcClientHandle>,
    /// nick -> full JID of the resource that last sent a private message
    /// to that nick, so unsolicited PRIVMSGs can be routed back
    /// (spec.md §4.8 "Routing — IRC → XMPP").
    preferred_from: HashMap<String, Jid>,
    /// `(channel, server) -> resources currently joined` (spec.md §3,
    /// "resources_in_chan").
    resources_in_chan: HashMap<(String, String), HashSet<String>>,
    resources_in_server: HashMap<String, HashSet<String>>,
    /// `(channel, server, resource) -> (maxstanzas, since)` requested via a
    /// join presence's `<history/>` element, consumed once the matching
    /// join actually completes (spec.md §4.8 "History replay").
    pending_history: HashMap<(String, String, String), (Option<u32>, Option<i64>)>,
}

impl Bridge {
    pub fn new(
        user_bare_jid: BareJid,
        component_hostname: String,
        fixed_server: Option<String>,
        db: SqlitePool,
        archive: Archive,
        idents: IdentTable,
    ) -> Bridge {
        Bridge {
            user_bare_jid,
            component_hostname,
            fixed_server,
            db,
            archive,
            idents,
            clients: HashMap::new(),
            preferred_from: HashMap::new(),
            resources_in_chan: HashMap::new(),
            resources_in_server: HashMap::new(),
            pending_history: HashMap::new(),
        }
    }

    /// Whether this bridge can be torn down (spec.md §3 "Lifecycle").
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Every IRC server this bridge currently has a connection for (disco#items
    /// on the component root, spec.md §6 "Supported feature namespaces").
    pub fn connected_servers(&self) -> Vec<String> {
        self.clients.keys().cloned().collect()
    }

    /// Every channel currently joined on `server` (disco#items on a server Iid).
    pub fn joined_channels(&self, server: &str) -> Vec<String> {
        self.resources_in_chan
            .keys()
            .filter(|(_, s)| s == server)
            .map(|(chan, _)| chan.clone())
            .collect()
    }

    /// Rejoins a channel marked `persistent` at gateway startup, with no
    /// XMPP resource attached (SPEC_FULL.md "Supplemented features —
    /// Persistent channels").
    pub async fn rejoin_persistent(&mut self, server: &str, chan: &str, events_tx: &mpsc::Sender<BridgeEvent>) -> Result<()> {
        self.ensure_client(server, events_tx).await?;
        self.send_line(server, format!("JOIN {chan}")).await;
        Ok(())
    }

    /// Disconnects and forgets one IRC server connection, used by the
    /// `disconnect` ad-hoc command (SPEC_FULL.md "Supplemented features").
    pub async fn disconnect_server(&mut self, server: &str, reason: Option<String>) -> bool {
        let Some(client) = self.clients.remove(server) else {
            return false;
        };
        let _ = client.commands.send(IrcCommand::Quit(reason)).await;
        self.resources_in_chan.retain(|(_, s), _| s != server);
        self.resources_in_server.remove(server);
        true
    }

    fn chantypes_default() -> std::collections::BTreeSet<char> {
        Iid::default_chantypes()
    }

    fn parse_iid(&self, local: &str) -> Iid {
        Iid::parse(local, &Self::chantypes_default(), self.fixed_server.as_deref())
    }

    /// The bare JID this Iid is addressed as (no resource).
    fn iid_bare_jid(&self, iid: &Iid) -> Jid {
        let local = iid.to_local_part(self.fixed_server.is_some());
        format!("{local}@{}", self.component_hostname)
            .parse()
            .expect("well-formed local part produces a well-formed JID")
    }

    /// `chan%server@component/nick` (or `chan@component/nick` in
    /// fixed-server mode).
    fn room_with_nick(&self, chan: &str, server: &str, nick: &str) -> Jid {
        let iid = Iid {
            kind: IidKind::Channel,
            local: chan.to_owned(),
            server: server.to_owned(),
        };
        let local = iid.to_local_part(self.fixed_server.is_some());
        format!("{local}@{}/{nick}", self.component_hostname)
            .parse()
            .expect("well-formed local part produces a well-formed JID")
    }

    /// The requesting XMPP resource's own full JID.
    fn resource_jid(&self, resource: &str) -> Jid {
        Jid::Full(
            self.user_bare_jid
                .clone()
                .with_resource(resource)
                .expect("resource came from a valid JID"),
        )
    }

    /// Spawns an IRC connection task for `server` if one doesn't already
    /// exist, loading per-(owner, server) options from the database
    /// (spec.md §6 `irc_server_options`).
    async fn ensure_client(&mut self, server: &str, events_tx: &mpsc::Sender<BridgeEvent>) -> Result<()> {
        if self.clients.contains_key(server) {
            return Ok(());
        }

        let row = IrcServerOptions::load(&self.db, &self.user_bare_jid.to_string(), server).await?;
        let after_commands =
            IrcServerOptions::after_connection_commands(&self.db, &self.user_bare_jid.to_string(), server).await?;

        let mut options = IrcClientOptions {
            nick: self.user_bare_jid.node().unwrap_or("biboumi-user").to_owned(),
            username: self.user_bare_jid.node().unwrap_or("biboumi").to_owned(),
            realname: self.user_bare_jid.node().unwrap_or("biboumi").to_owned(),
            ..IrcClientOptions::default()
        };
        options.after_connection_commands = after_commands;
        if let Some(row) = row {
            if let Some(nick) = row.nick {
                options.nick = nick;
            }
            if let Some(username) = row.username {
                options.username = username;
            }
            if let Some(realname) = row.realname {
                options.realname = realname;
            }
            options.pass = row.pass;
            options.verify_cert = row.verify_cert;
            options.trusted_fingerprint = row.trusted_fingerprint;
            if let Some(encoding_in) = row.encoding_in {
                options.encoding_in = encoding_in;
            }
            if let Some(encoding_out) = row.encoding_out {
                options.encoding_out = encoding_out;
            }
            if let Some(limit) = row.throttle_limit {
                options.throttle_limit = limit as u32;
            }
            if let Some(ports) = row.ports.as_deref() {
                let plain: Vec<(u16, bool)> = ports
                    .split(',')
                    .filter_map(|p| p.trim().parse().ok())
                    .map(|p| (p, false))
                    .collect();
                if !plain.is_empty() {
                    options.ports = plain;
                }
            }
            if let Some(tls_ports) = row.tls_ports.as_deref() {
                let tls: Vec<(u16, bool)> = tls_ports
                    .split(',')
                    .filter_map(|p| p.trim().parse().ok())
                    .map(|p| (p, true))
                    .collect();
                options.ports.extend(tls);
            }
        }

        let (commands_tx, commands_rx) = mpsc::channel(128);
        let (irc_events_tx, mut irc_events_rx) = mpsc::channel(256);

        tokio::spawn(connection::run(server.to_owned(), options.clone(), irc_events_tx, commands_rx));

        let owner = self.user_bare_jid.clone();
        let server_owned = server.to_owned();
        let relay_tx = events_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = irc_events_rx.recv().await {
                if relay_tx
                    .send(BridgeEvent {
                        owner: owner.clone(),
                        server: server_owned.clone(),
                        event,
                    })
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        self.clients.insert(
            server.to_owned(),
            IrcClientHandle {
                commands: commands_tx,
                current_nick: options.nick.clone(),
                local_port: None,
            },
        );
        Ok(())
    }

    async fn send_line(&self, server: &str, line: String) {
        if let Some(client) = self.clients.get(server) {
            let _ = client.commands.send(IrcCommand::SendLine(line)).await;
        }
    }

    async fn query_channel(&self, server: &str, channel: &str) -> Option<crate::irc::channel::ChannelSnapshot> {
        let client = self.clients.get(server)?;
        let (tx, rx) = oneshot::channel();
        client
            .commands
            .send(IrcCommand::QueryChannel {
                channel: channel.to_owned(),
                reply: tx,
            })
            .await
            .ok()?;
        rx.await.ok().flatten()
    }

    // ---------------------------------------------------------------
    // XMPP -> IRC
    // ---------------------------------------------------------------

    /// Handles one inbound `<presence/>` addressed to this bridge's user
    /// (spec.md §4.8 "Routing — XMPP → IRC").
    pub async fn handle_presence(&mut self, presence: Presence, events_tx: &mpsc::Sender<BridgeEvent>) -> Vec<Element> {
        let to = match presence.to.clone() {
            Some(jid) => jid,
            None => return Vec::new(),
        };
        let local = to.node().unwrap_or_default();
        let iid = self.parse_iid(local);
        let Some(resource) = (match &to {
            Jid::Full(full) => Some(full.resource().to_owned()),
            Jid::Bare(_) => None,
        }) else {
            return Vec::new();
        };

        if iid.kind != IidKind::Channel {
            return Vec::new();
        }

        let muc = presence.payloads.iter().find_map(|p| {
            xmpp_parsers::muc::Muc::try_from(p.clone()).ok()
        });

        match presence.type_ {
            PresenceType::None if muc.is_some() => {
                self.join_channel(&iid.server, &iid.local, &resource, muc.unwrap(), events_tx).await
            }
            PresenceType::Unavailable => self.part_channel(&iid.server, &iid.local, &resource).await,
            PresenceType::None => self.change_nick(&iid.server, &iid.local, &resource, &to).await,
            PresenceType::Error => {
                let condition = presence
                    .payloads
                    .iter()
                    .find_map(|p| xmpp_parsers::stanza_error::StanzaError::try_from(p.clone()).ok())
                    .map(|e| e.defined_condition);
                if is_purge_condition(condition) {
                    self.purge_resource(&resource).await;
                }
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    async fn join_channel(
        &mut self,
        server: &str,
        chan: &str,
        resource: &str,
        muc: xmpp_parsers::muc::Muc,
        events_tx: &mpsc::Sender<BridgeEvent>,
    ) -> Vec<Element> {
        if self.ensure_client(server, events_tx).await.is_err() {
            return Vec::new();
        }
        let key = (casefold(chan), server.to_owned());
        let already_joined = self
            .resources_in_chan
            .get(&key)
            .map(|r| !r.is_empty())
            .unwrap_or(false);

        self.resources_in_chan.entry(key.clone()).or_default().insert(resource.to_owned());
        self.resources_in_server
            .entry(server.to_owned())
            .or_default()
            .insert(resource.to_owned());

        let history = history_params(muc.history.as_ref());

        if already_joined {
            // Another resource is already in the room: synthesize the
            // "I'm here" sequence locally instead of sending JOIN again.
            if let Some(snapshot) = self.query_channel(server, chan).await {
                let mut stanzas = Vec::new();
                if history.0.is_some() || history.1.is_some() {
                    stanzas.extend(self.replay_history(server, chan, resource, history.0, history.1).await);
                }
                stanzas.extend(self.build_join_snapshot_stanzas(chan, server, resource, &snapshot));
                return stanzas;
            }
            return Vec::new();
        }

        if history.0.is_some() || history.1.is_some() {
            self.pending_history.insert((key.0, key.1, resource.to_owned()), history);
        }

        let line = match &muc.password {
            Some(pass) => format!("JOIN {chan} {pass}"),
            None => format!("JOIN {chan}"),
        };
        self.send_line(server, line).await;
        Vec::new()
    }

    fn build_join_snapshot_stanzas(
        &self,
        chan: &str,
        server: &str,
        resource: &str,
        snapshot: &crate::irc::channel::ChannelSnapshot,
    ) -> Vec<Element> {
        let mut stanzas = Vec::new();
        let to = self.resource_jid(resource);
        for user in &snapshot.users {
            let room_with_nick = self.room_with_nick(chan, server, &user.nick);
            let (affiliation, role) = irc_modes_to_muc(&user.modes);
            let presence = if user.is_self {
                session::build_self_join_presence(&room_with_nick, &to, affiliation, role)
            } else {
                session::build_occupant_presence(&room_with_nick, &to, affiliation, role)
            };
            stanzas.push(presence.into());
        }
        if let Some(topic) = &snapshot.topic {
            let room = self.iid_bare_jid(&Iid {
                kind: IidKind::Channel,
                local: chan.to_owned(),
                server: server.to_owned(),
            });
            stanzas.push(session::build_topic_message(&room, &to, topic).into());
        }
        stanzas
    }

    async fn part_channel(&mut self, server: &str, chan: &str, resource: &str) -> Vec<Element> {
        let key = (casefold(chan), server.to_owned());
        if let Some(resources) = self.resources_in_chan.get_mut(&key) {
            resources.remove(resource);
            let last = resources.is_empty();
            if let Some(server_resources) = self.resources_in_server.get_mut(server) {
                server_resources.remove(resource);
            }
            if last {
                let persistent = IrcChannelOptions::load(&self.db, &self.user_bare_jid.to_string(), server, chan)
                    .await
                    .ok()
                    .flatten()
                    .map(|o| o.persistent)
                    .unwrap_or(false);
                if !persistent {
                    self.send_line(server, format!("PART {chan}")).await;
                }
                self.resources_in_chan.remove(&key);
            }
        }
        Vec::new()
    }

    async fn change_nick(&mut self, server: &str, chan: &str, resource: &str, to: &Jid) -> Vec<Element> {
        let _ = (resource, to);
        let key = (casefold(chan), server.to_owned());
        if self.resources_in_chan.contains_key(&key) {
            if let Some(nick) = to.resource() {
                self.send_line(server, format!("NICK {nick}")).await;
            }
        }
        Vec::new()
    }

    /// Purges every channel joined from `resource` (spec.md §4.8 "Error
    /// escalation").
    async fn purge_resource(&mut self, resource: &str) {
        let mut to_part: Vec<(String, String)> = Vec::new();
        for ((chan, server), resources) in self.resources_in_chan.iter_mut() {
            if resources.remove(resource) && resources.is_empty() {
                to_part.push((chan.clone(), server.clone()));
            }
        }
        for (chan, server) in to_part {
            self.resources_in_chan.remove(&(chan.clone(), server.clone()));
            self.send_line(&server, format!("PART {chan}")).await;
        }
    }

    /// Handles one inbound `<message/>` (spec.md §4.8 "Routing — XMPP →
    /// IRC").
    pub async fn handle_message(&mut self, message: Message, events_tx: &mpsc::Sender<BridgeEvent>) -> Vec<Element> {
        let Some(to) = message.to.clone() else {
            return Vec::new();
        };
        let local = to.node().unwrap_or_default();
        let iid = self.parse_iid(local);

        if let Some(invite) = message.payloads.iter().find_map(find_invite_nick) {
            if self.ensure_client(&iid.server, events_tx).await.is_ok() {
                self.send_line(&iid.server, format!("INVITE {invite} {}", iid.local)).await;
            }
            return Vec::new();
        }

        match (message.type_, iid.kind) {
            (MessageType::Groupchat, IidKind::Channel) => self.handle_groupchat_message(message, &iid).await,
            (MessageType::Chat, IidKind::User) => self.handle_private_message(message, &iid).await,
            _ => Vec::new(),
        }
    }

    /// Handles a bounced `<message type="error"/>` (spec.md §4.8 "Error
    /// escalation") — same purge as the presence-error path, since either
    /// stanza kind can be what a remote server bounces back.
    pub async fn handle_error_message(&mut self, message: Message) -> Vec<Element> {
        let Some(to) = message.to.clone() else {
            return Vec::new();
        };
        let local = to.node().unwrap_or_default();
        let iid = self.parse_iid(local);
        let Some(resource) = (match &to {
            Jid::Full(full) => Some(full.resource().to_owned()),
            Jid::Bare(_) => None,
        }) else {
            return Vec::new();
        };

        if iid.kind != IidKind::Channel {
            return Vec::new();
        }

        let condition = message
            .payloads
            .iter()
            .find_map(|p| xmpp_parsers::stanza_error::StanzaError::try_from(p.clone()).ok())
            .map(|e| e.defined_condition);
        if is_purge_condition(condition) {
            self.purge_resource(&resource).await;
        }
        Vec::new()
    }

    async fn handle_groupchat_message(&mut self, message: Message, iid: &Iid) -> Vec<Element> {
        if let Some((_, subject)) = message.get_best_subject(vec![""]) {
            self.send_line(&iid.server, format!("TOPIC {} :{}", iid.local, subject.0)).await;
            return Vec::new();
        }
        let Some((_, body)) = message.get_best_body(vec![""]) else {
            return Vec::new();
        };
        for chunk in chunk_utf8(&body.0, MAX_LINE_BYTES) {
            self.send_line(&iid.server, format!("PRIVMSG {} :{}", iid.local, chunk)).await;
        }
        Vec::new()
    }

    async fn handle_private_message(&mut self, message: Message, iid: &Iid) -> Vec<Element> {
        let Some((_, body)) = message.get_best_body(vec![""]) else {
            return Vec::new();
        };
        for chunk in chunk_utf8(&body.0, MAX_LINE_BYTES) {
            self.send_line(&iid.server, format!("PRIVMSG {} :{}", iid.local, chunk)).await;
        }
        Vec::new()
    }

    // ---------------------------------------------------------------
    // IRC -> XMPP
    // ---------------------------------------------------------------

    /// Handles one event produced by an IRC connection (spec.md §4.8
    /// "Routing — IRC → XMPP").
    pub async fn handle_irc_event(&mut self, server: &str, event: IrcEvent) -> Vec<Element> {
        match event {
            IrcEvent::Connected { local_port } => {
                if let Some(client) = self.clients.get_mut(server) {
                    client.local_port = Some(local_port);
                }
                Vec::new()
            }
            IrcEvent::Welcomed { nick } => {
                if let Some(client) = self.clients.get_mut(server) {
                    client.current_nick = nick.clone();
                    if let Some(port) = client.local_port {
                        self.idents.lock().unwrap_or_else(|p| p.into_inner()).insert(port, nick);
                    }
                }
                Vec::new()
            }
            IrcEvent::SelfJoined { .. } => Vec::new(),
            IrcEvent::EndOfNames { channel } => self.handle_end_of_names(server, &channel).await,
            IrcEvent::UserJoined { channel, nick, .. } => self.handle_user_joined(server, &channel, &nick).await,
            IrcEvent::Topic { channel, topic, .. } => self.handle_topic(server, &channel, topic),
            IrcEvent::Part { channel, nick, message } => self.handle_part(server, &channel, &nick, message),
            IrcEvent::Quit { nick, channels, message } => self.handle_quit(server, &channels, &nick, message),
            IrcEvent::Kick { channel, target, by, reason } => {
                self.handle_kick(server, &channel, &target, &by, reason)
            }
            IrcEvent::NickChange { old_nick, new_nick, channels } => {
                self.handle_nick_change(server, &channels, &old_nick, &new_nick)
            }
            IrcEvent::ModeChange { target, by, modestring, args, changed_nicks } => {
                self.handle_mode_change(server, &target, &by, &modestring, &args, &changed_nicks).await
            }
            IrcEvent::ChannelMessage { channel, from, body } => {
                self.handle_channel_message(server, &channel, &from, &body).await
            }
            IrcEvent::ChannelNotice { channel, from, body } => {
                vec![self
                    .build_groupchat_from_irc(server, &channel, &from, &format!("\u{0003}03[notice]\u{0003} {body}"))
                    .into()]
            }
            IrcEvent::PrivateMessage { from, body } => self.handle_private_irc_message(server, &from, &body),
            IrcEvent::PrivateNotice { from, body } => {
                vec![self.build_chat_from_irc(&from, &format!("\u{0003}03[notice]\u{0003} {body}")).into()]
            }
            IrcEvent::CtcpRequest { from, target, ctcp } => self.handle_ctcp(server, &from, target, ctcp),
            IrcEvent::Invite { channel, from } => {
                let _ = (channel, from);
                Vec::new()
            }
            IrcEvent::NickError { attempted_nick, reason } => {
                log::warn!("nick error on {server} for {attempted_nick}: {reason}");
                self.handle_nick_error(server, &reason)
            }
            IrcEvent::Disconnected { reason } => {
                log::info!("{server} disconnected: {reason}");
                if let Some(client) = self.clients.remove(server) {
                    if let Some(port) = client.local_port {
                        self.idents.lock().unwrap_or_else(|p| p.into_inner()).remove(&port);
                    }
                }
                Vec::new()
            }
        }
    }

    async fn handle_end_of_names(&mut self, server: &str, channel: &str) -> Vec<Element> {
        let Some(snapshot) = self.query_channel(server, channel).await else {
            return Vec::new();
        };
        let key = (casefold(channel), server.to_owned());
        let resources: Vec<String> = self
            .resources_in_chan
            .get(&key)
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default();

        let mut stanzas = Vec::new();
        for resource in resources {
            let key = (casefold(channel), server.to_owned(), resource.clone());
            if let Some((maxstanzas, since)) = self.pending_history.remove(&key) {
                stanzas.extend(self.replay_history(server, channel, &resource, maxstanzas, since).await);
            }
            stanzas.extend(self.build_join_snapshot_stanzas(channel, server, &resource, &snapshot));
        }
        stanzas
    }

    async fn handle_user_joined(&mut self, server: &str, channel: &str, nick: &str) -> Vec<Element> {
        let key = (casefold(channel), server.to_owned());
        let resources: Vec<String> = self
            .resources_in_chan
            .get(&key)
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default();
        let room_with_nick = self.room_with_nick(channel, server, nick);
        let mut stanzas = Vec::new();
        for resource in resources {
            let to = self.resource_jid(&resource);
            stanzas.push(
                session::build_occupant_presence(&room_with_nick, &to, Affiliation::None, Role::Participant).into(),
            );
        }
        stanzas
    }

    fn handle_topic(&mut self, server: &str, channel: &str, topic: Option<String>) -> Vec<Element> {
        let Some(topic) = topic else { return Vec::new() };
        let key = (casefold(channel), server.to_owned());
        let resources: Vec<String> = self
            .resources_in_chan
            .get(&key)
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default();
        let room = self.iid_bare_jid(&Iid {
            kind: IidKind::Channel,
            local: channel.to_owned(),
            server: server.to_owned(),
        });
        resources
            .into_iter()
            .map(|resource| {
                let to = self.resource_jid(&resource);
                session::build_topic_message(&room, &to, &topic).into()
            })
            .collect()
    }

    fn resources_of(&self, channel: &str, server: &str) -> Vec<String> {
        self.resources_in_chan
            .get(&(casefold(channel), server.to_owned()))
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn handle_part(&mut self, server: &str, channel: &str, nick: &str, _message: Option<String>) -> Vec<Element> {
        let is_self = self.clients.get(server).map(|c| c.current_nick == nick).unwrap_or(false);
        let room_with_nick = self.room_with_nick(channel, server, nick);
        self.resources_of(channel, server)
            .into_iter()
            .map(|resource| {
                let to = self.resource_jid(&resource);
                session::build_leave_presence(&room_with_nick, &to, is_self, None).into()
            })
            .collect()
    }

    fn handle_quit(&mut self, server: &str, channels: &[String], nick: &str, _message: Option<String>) -> Vec<Element> {
        channels
            .iter()
            .flat_map(|channel| self.handle_part(server, channel, nick, None))
            .collect()
    }

    /// Forwards a recoverable IRC nick error (nick-in-use,
    /// erroneous-nickname, change-too-fast) as a presence-error on every
    /// room JID affected on `server` (spec.md §7 item 6): every channel
    /// joined on that server, to every resource joined to it, using the
    /// resource's current in-room nick.
    fn handle_nick_error(&mut self, server: &str, reason: &str) -> Vec<Element> {
        let current_nick = match self.clients.get(server) {
            Some(client) => client.current_nick.clone(),
            None => return Vec::new(),
        };
        let channels: Vec<String> = self
            .resources_in_chan
            .keys()
            .filter(|(_, s)| s == server)
            .map(|(chan, _)| chan.clone())
            .collect();
        channels
            .into_iter()
            .flat_map(|chan| {
                let room_with_nick = self.room_with_nick(&chan, server, &current_nick);
                self.resources_of(&chan, server)
                    .into_iter()
                    .map(|resource| {
                        let to = self.resource_jid(&resource);
                        session::build_presence_error(
                            &room_with_nick,
                            &to,
                            DefinedCondition::Conflict,
                            reason,
                        )
                        .into()
                    })
                    .collect::<Vec<Element>>()
            })
            .collect()
    }

    fn handle_kick(&mut self, server: &str, channel: &str, target: &str, by: &str, _reason: Option<String>) -> Vec<Element> {
        let is_self = self.clients.get(server).map(|c| c.current_nick == target).unwrap_or(false);
        let room_with_nick = self.room_with_nick(channel, server, target);
        self.resources_of(channel, server)
            .into_iter()
            .map(|resource| {
                let to = self.resource_jid(&resource);
                session::build_kick_presence(&room_with_nick, &to, Some(by), is_self).into()
            })
            .collect()
    }

    fn handle_nick_change(&mut self, server: &str, channels: &[String], old_nick: &str, new_nick: &str) -> Vec<Element> {
        let is_self = self.clients.get(server).map(|c| c.current_nick == old_nick).unwrap_or(false);
        if let Some(client) = self.clients.get_mut(server) {
            if is_self {
                client.current_nick = new_nick.to_owned();
                if let Some(port) = client.local_port {
                    self.idents
                        .lock()
                        .unwrap_or_else(|p| p.into_inner())
                        .insert(port, new_nick.to_owned());
                }
            }
        }
        let mut stanzas = Vec::new();
        for channel in channels {
            let old_room_with_nick = self.room_with_nick(channel, server, old_nick);
            let new_room_with_nick = self.room_with_nick(channel, server, new_nick);
            for resource in self.resources_of(channel, server) {
                let to = self.resource_jid(&resource);
                let (leaving, arriving) = session::build_nick_change_presences(
                    &old_room_with_nick,
                    &new_room_with_nick,
                    &to,
                    new_nick,
                    Affiliation::None,
                    Role::Participant,
                    is_self,
                );
                stanzas.push(leaving.into());
                stanzas.push(arriving.into());
            }
        }
        stanzas
    }

    /// Announces a MODE change (spec.md §4.8 "Routing — IRC → XMPP"). The
    /// affiliation/role presence re-sent for each touched nick is derived
    /// from the channel's post-MODE snapshot the same way
    /// [`Bridge::build_join_snapshot_stanzas`] derives it at join time,
    /// rather than assumed to always be the no-privilege default.
    async fn handle_mode_change(
        &mut self,
        server: &str,
        target: &str,
        by: &str,
        modestring: &str,
        args: &[String],
        changed_nicks: &[String],
    ) -> Vec<Element> {
        let mut stanzas = Vec::new();
        let resources = self.resources_of(target, server);
        let room = self.iid_bare_jid(&Iid {
            kind: IidKind::Channel,
            local: target.to_owned(),
            server: server.to_owned(),
        });
        let args_joined = args.join(" ");
        let body = if args_joined.is_empty() {
            format!("Mode {target} [{modestring}] by {by}")
        } else {
            format!("Mode {target} [{modestring} {args_joined}] by {by}")
        };
        for resource in &resources {
            let to = self.resource_jid(resource);
            let mut message = Message::new(Some(to));
            message.from = Some(room.clone());
            message.type_ = MessageType::Groupchat;
            message.bodies.insert(String::new(), Body(body.clone()));
            stanzas.push(message.into());
        }

        let snapshot = self.query_channel(server, target).await;
        for nick in changed_nicks {
            let (affiliation, role) = snapshot
                .as_ref()
                .and_then(|s| s.users.iter().find(|u| u.nick == *nick))
                .map(|u| irc_modes_to_muc(&u.modes))
                .unwrap_or((Affiliation::None, Role::Participant));
            let room_with_nick = self.room_with_nick(target, server, nick);
            for resource in &resources {
                let to = self.resource_jid(resource);
                stanzas.push(
                    session::build_occupant_presence(&room_with_nick, &to, affiliation.clone(), role.clone()).into(),
                );
            }
        }
        stanzas
    }

    async fn handle_channel_message(&mut self, server: &str, channel: &str, from: &str, body: &str) -> Vec<Element> {
        let owner = self.user_bare_jid.to_string();
        if let Ok(uuid) = self
            .archive
            .store(&owner, channel, server, now_unix(), from, body)
            .await
        {
            return vec![self.build_groupchat_from_irc_with_archive(server, channel, from, body, &uuid).into()];
        }
        vec![self.build_groupchat_from_irc(server, channel, from, body).into()]
    }

    fn build_groupchat_from_irc(&self, server: &str, channel: &str, from: &str, body: &str) -> Message {
        self.build_groupchat_from_irc_with_archive(server, channel, from, body, "")
    }

    fn build_groupchat_from_irc_with_archive(
        &self,
        server: &str,
        channel: &str,
        from: &str,
        body: &str,
        archive_uuid: &str,
    ) -> Message {
        let room_with_nick = self.room_with_nick(channel, server, from);
        let room = self.iid_bare_jid(&Iid {
            kind: IidKind::Channel,
            local: channel.to_owned(),
            server: server.to_owned(),
        });
        let resources = self.resources_of(channel, server);
        let to = resources
            .first()
            .map(|r| self.resource_jid(r))
            .unwrap_or_else(|| Jid::Bare(self.user_bare_jid.clone()));
        let (clean_body, xhtml) = crate::irc::format::irc_format_to_xhtmlim(body);
        let mut message = session::build_groupchat_message(&room_with_nick, &to, &clean_body, None, &[], &room, archive_uuid);
        if let Some(xhtml_body) = xhtml {
            message.payloads.push(session::wrap_xhtml_im(xhtml_body));
        }
        message
    }

    fn handle_private_irc_message(&mut self, server: &str, from: &str, body: &str) -> Vec<Element> {
        let preferred = self.preferred_from.get(from).cloned();
        let to = preferred.unwrap_or_else(|| Jid::Bare(self.user_bare_jid.clone()));
        let iid = Iid {
            kind: IidKind::User,
            local: from.to_owned(),
            server: server.to_owned(),
        };
        let from_jid = self.iid_bare_jid(&iid);
        let mut message = Message::new(Some(to));
        message.from = Some(from_jid);
        message.type_ = MessageType::Chat;
        set_formatted_body(&mut message, body);
        vec![message.into()]
    }

    fn build_chat_from_irc(&self, from: &str, body: &str) -> Message {
        let to = self.preferred_from.get(from).cloned().unwrap_or_else(|| Jid::Bare(self.user_bare_jid.clone()));
        let mut message = Message::new(Some(to));
        message.type_ = MessageType::Chat;
        set_formatted_body(&mut message, body);
        message
    }

    /// Handles a CTCP request from IRC. `ACTION` is rendered as a `/me`
    /// line; `VERSION` and `PING` have no meaningful IRC-side answer of
    /// their own, so they're bounced upward as a real XMPP iq request to
    /// whichever resource last talked to this nick, per spec.md §4.7
    /// "CTCP" ("VERSION triggers an iq-version request upward; PING
    /// triggers an XMPP ping request upward with the token as id suffix").
    /// Nobody correlates the eventual answer back to the IRC side — the
    /// CTCP requester never gets a reply over IRC either, matching
    /// biboumi's long-standing behaviour here.
    fn handle_ctcp(&mut self, server: &str, from: &str, target: Option<String>, ctcp: crate::irc::ctcp::Ctcp) -> Vec<Element> {
        use crate::irc::ctcp::Ctcp;
        match ctcp {
            Ctcp::Action(text) => {
                let body = format!("/me {text}");
                match target {
                    Some(channel) => vec![self.build_groupchat_from_irc(server, &channel, from, &body).into()],
                    None => vec![self.build_chat_from_irc(from, &body).into()],
                }
            }
            Ctcp::Version => {
                let iq = self.build_ctcp_probe(server, from, format!("version-{}", uuid::Uuid::new_v4()), |to, from_jid, id| {
                    let mut iq = xmpp_parsers::iq::Iq::from_get(id, xmpp_parsers::version::VersionQuery);
                    iq.to = Some(to);
                    iq.from = Some(from_jid);
                    iq
                });
                iq.into_iter().map(Into::into).collect()
            }
            Ctcp::Ping(token) => {
                let iq = self.build_ctcp_probe(server, from, format!("biboumi-ping-{token}"), |to, from_jid, id| {
                    let mut iq = xmpp_parsers::iq::Iq::from_get(id, xmpp_parsers::ping::Ping);
                    iq.to = Some(to);
                    iq.from = Some(from_jid);
                    iq
                });
                iq.into_iter().map(Into::into).collect()
            }
            Ctcp::Other(..) => Vec::new(),
        }
    }

    /// Builds an upward iq-get addressed to whoever `from` last privately
    /// talked to, with the IRC user as its apparent sender.
    fn build_ctcp_probe(
        &self,
        server: &str,
        from: &str,
        id: String,
        build: impl FnOnce(Jid, Jid, String) -> xmpp_parsers::iq::Iq,
    ) -> Option<xmpp_parsers::iq::Iq> {
        let to = self.preferred_from.get(from).cloned()?;
        let from_jid = self.iid_bare_jid(&Iid {
            kind: IidKind::User,
            local: from.to_owned(),
            server: server.to_owned(),
        });
        Some(build(to, from_jid, id))
    }

    /// Remembers which full JID last privately messaged `nick`, so a
    /// reply from IRC routes back to them (spec.md §4.8).
    pub fn remember_preferred_from(&mut self, nick: &str, jid: Jid) {
        self.preferred_from.insert(nick.to_owned(), jid);
    }

    /// Shuts down every IRC connection owned by this bridge (spec.md §5
    /// "Cancellation").
    pub async fn shutdown(&mut self) {
        for (_, client) in self.clients.drain() {
            let _ = client.commands.send(IrcCommand::Quit(None)).await;
        }
    }

    /// Answers a XEP-0313 archive query (spec.md §4.6 "MAM result
    /// wrapping", §4.9, property P5): builds the forwarded `<message/>`
    /// results and the `<iq/>` carrying the closing `<fin/>`.
    pub async fn handle_mam_query(
        &self,
        chan: &str,
        server: &str,
        requester: &Jid,
        iq_id: &str,
        query: &xmpp_parsers::mam::Query,
    ) -> (Vec<Element>, Element) {
        use xmpp_parsers::forwarding::Forwarded;
        use xmpp_parsers::mam::{Fin, Result_ as MamResult};
        use xmpp_parsers::rsm::{First, SetResult};

        let owner = self.user_bare_jid.to_string();
        let room = self.iid_bare_jid(&Iid {
            kind: IidKind::Channel,
            local: chan.to_owned(),
            server: server.to_owned(),
        });

        let limit = query.set.as_ref().and_then(|s| s.max).unwrap_or(20) as i64;
        let (start, end) = mam_form_bounds(query);
        let (reference, direction) = match &query.set {
            Some(set) if set.after.as_deref().map(|s| !s.is_empty()).unwrap_or(false) => {
                (set.after.clone(), Direction::First)
            }
            Some(set) if set.before.as_deref().map(|s| !s.is_empty()).unwrap_or(false) => {
                (set.before.clone(), Direction::Last)
            }
            _ if query.flip_page => (None, Direction::Last),
            _ => (None, Direction::First),
        };

        let page = self
            .archive
            .query(&owner, chan, server, limit, start, end, reference.as_deref(), direction)
            .await
            .unwrap_or(crate::archive::ArchivePage { complete: true, rows: Vec::new() });

        let mut results = Vec::new();
        for row in &page.rows {
            let room_with_nick = self.room_with_nick(chan, server, &row.nick);
            let mut message = Message::new(Some(requester.clone()));
            message.from = Some(room_with_nick);
            message.type_ = MessageType::Groupchat;
            message.bodies.insert(String::new(), Body(row.body.clone()));
            let delay = xmpp_parsers::delay::Delay {
                from: Some(room.clone()),
                stamp: mam_date(row.date),
                data: None,
            };
            let result = MamResult {
                id: row.uuid.clone(),
                queryid: query.queryid.clone(),
                forwarded: Forwarded { delay: Some(delay), message },
            };
            let mut wrapper = Message::new(Some(requester.clone()));
            wrapper.from = Some(room.clone());
            wrapper.payloads.push(result.into());
            results.push(wrapper.into());
        }

        let first = page.rows.first().map(|r| First { index: None, item: r.uuid.clone() });
        let last = page.rows.last().map(|r| r.uuid.clone());
        let fin = Fin {
            complete: page.complete,
            set: SetResult { first, last, count: None },
        };
        let mut iq = xmpp_parsers::iq::Iq::from_result(iq_id.to_owned(), Some(fin));
        iq.from = Some(room);
        iq.to = Some(requester.clone());
        (results, iq.into())
    }

    /// Replays archived lines on join (spec.md §4.8 "History replay").
    pub async fn replay_history(
        &self,
        server: &str,
        chan: &str,
        resource: &str,
        maxstanzas: Option<u32>,
        since: Option<i64>,
    ) -> Vec<Element> {
        let owner = self.user_bare_jid.to_string();
        let limit = maxstanzas.unwrap_or(20) as i64;
        let Ok(page) = self
            .archive
            .query(&owner, chan, server, limit, since, None, None, Direction::Last)
            .await
        else {
            return Vec::new();
        };
        let to = self.resource_jid(resource);
        let room = self.iid_bare_jid(&Iid {
            kind: IidKind::Channel,
            local: chan.to_owned(),
            server: server.to_owned(),
        });
        page.rows
            .into_iter()
            .map(|row| {
                let room_with_nick = self.room_with_nick(chan, server, &row.nick);
                let mut message = Message::new(Some(to.clone()));
                message.from = Some(room_with_nick);
                message.type_ = MessageType::Groupchat;
                set_formatted_body(&mut message, &row.body);
                message.payloads.push(session::build_delay(&room, row.date));
                message.into()
            })
            .collect()
    }
}

/// Maps IRC channel modes to a MUC affiliation/role pair. Biboumi doesn't
/// model the full IRC privilege ladder as MUC affiliations; `+o`/`+h`
/// grant `Moderator`, anything else is a plain `Participant`.
fn irc_modes_to_muc(modes: &std::collections::BTreeSet<char>) -> (Affiliation, Role) {
    if modes.contains(&'o') || modes.contains(&'h') {
        (Affiliation::Admin, Role::Moderator)
    } else {
        (Affiliation::None, Role::Participant)
    }
}

/// Pulls the nick out of a mediated `<invite to='.../nick'/>` child of a
/// `<x xmlns='http://jabber.org/protocol/muc#user'>` payload. `xmpp_parsers`
/// has no typed element for this (only the client-initiated side of
/// XEP-0045 invitations is modeled), so this reads the raw tree directly,
/// the same way [`crate::adhoc`] builds ad-hoc command stanzas by hand.
/// Whether a bounced stanza-error condition is one of the ten spec.md §4.8
/// "Error escalation" conditions that trigger a purge of every channel
/// joined from the resource the error came back for.
fn is_purge_condition(condition: Option<DefinedCondition>) -> bool {
    matches!(
        condition,
        Some(
            DefinedCondition::Gone { .. }
                | DefinedCondition::InternalServerError
                | DefinedCondition::ItemNotFound
                | DefinedCondition::JidMalformed
                | DefinedCondition::RecipientUnavailable
                | DefinedCondition::Redirect { .. }
                | DefinedCondition::RemoteServerNotFound
                | DefinedCondition::RemoteServerTimeout
                | DefinedCondition::ServiceUnavailable
        )
    )
}

/// Sets `message`'s plain-text body and, when the raw IRC body carried
/// mIRC formatting control codes, an accompanying XHTML-IM payload
/// (spec.md §8 concrete scenario 4).
fn set_formatted_body(message: &mut Message, raw_body: &str) {
    let (clean, xhtml) = crate::irc::format::irc_format_to_xhtmlim(raw_body);
    message.bodies.insert(String::new(), Body(clean));
    if let Some(xhtml_body) = xhtml {
        message.payloads.push(session::wrap_xhtml_im(xhtml_body));
    }
}

fn find_invite_nick(payload: &Element) -> Option<String> {
    if payload.name() != "x" || payload.ns() != xmpp_parsers::ns::MUC_USER {
        return None;
    }
    let invite = payload.get_child("invite", xmpp_parsers::ns::MUC_USER)?;
    let to = invite.attr("to")?;
    let jid: Jid = to.parse().ok()?;
    match jid {
        Jid::Full(full) => Some(full.resource().to_owned()),
        Jid::Bare(bare) => bare.node().map(str::to_owned),
    }
}

/// Splits `text` into chunks of at most `max_bytes` bytes, cutting only on
/// UTF-8 code-point boundaries (spec.md §4.8 "chunked to at most 400
/// bytes... on UTF-8 code-point boundaries").
fn chunk_utf8(text: &str, max_bytes: usize) -> Vec<String> {
    if text.is_empty() {
        return vec![String::new()];
    }
    let mut chunks = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    while start < bytes.len() {
        let mut end = (start + max_bytes).min(bytes.len());
        while end < bytes.len() && !text.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            end = start + 1;
        }
        chunks.push(text[start..end].to_owned());
        start = end;
    }
    chunks
}

/// Pulls `maxstanzas`/`since` (as a unix timestamp) out of a join
/// presence's `<history/>` element, if any (spec.md §4.8 "History replay").
fn history_params(history: Option<&History>) -> (Option<u32>, Option<i64>) {
    match history {
        Some(history) => (history.maxstanzas, history.since.as_ref().map(|dt| dt.0.timestamp())),
        None => (None, None),
    }
}

/// Converts a stored unix timestamp into the typed `DateTime` a `<delay/>`
/// wants, UTC-as-fixed-offset-zero (spec.md §4.6 "MAM result wrapping").
fn mam_date(unix_seconds: i64) -> xmpp_parsers::date::DateTime {
    use chrono::{FixedOffset, TimeZone, Utc};
    let utc = Utc
        .timestamp_opt(unix_seconds, 0)
        .single()
        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().expect("epoch is representable"));
    xmpp_parsers::date::DateTime(utc.with_timezone(&FixedOffset::east_opt(0).expect("zero offset is always valid")))
}

/// Pulls `start`/`end` filters out of the MAM query's data form (the
/// `urn:xmpp:mam:2` FORM_TYPE fields `start`/`end`), per XEP-0313.
fn mam_form_bounds(query: &xmpp_parsers::mam::Query) -> (Option<i64>, Option<i64>) {
    let Some(form) = &query.form else {
        return (None, None);
    };
    let field = |name: &str| -> Option<i64> {
        form.fields
            .iter()
            .find(|f| f.var.as_deref() == Some(name))
            .and_then(|f| f.values.first())
            .and_then(|v| v.parse::<xmpp_parsers::date::DateTime>().ok())
            .map(|dt| dt.0.timestamp())
    };
    (field("start"), field("end"))
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_utf8_splits_on_codepoint_boundaries() {
        let text = "é".repeat(300); // 2 bytes each -> 600 bytes
        let chunks = chunk_utf8(&text, 400);
        assert_eq!(chunks.len(), 2);
        for chunk in &chunks {
            assert!(chunk.is_char_boundary(0));
            assert!(chunk.is_char_boundary(chunk.len()));
        }
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn chunk_utf8_short_text_is_single_chunk() {
        assert_eq!(chunk_utf8("hello", 400), vec!["hello".to_owned()]);
    }

    #[test]
    fn mode_o_maps_to_moderator() {
        let mut modes = std::collections::BTreeSet::new();
        modes.insert('o');
        assert_eq!(irc_modes_to_muc(&modes), (Affiliation::Admin, Role::Moderator));
    }

    #[test]
    fn plain_user_maps_to_participant() {
        let modes = std::collections::BTreeSet::new();
        assert_eq!(irc_modes_to_muc(&modes), (Affiliation::None, Role::Participant));
    }
}
