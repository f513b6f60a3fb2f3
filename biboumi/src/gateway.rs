//! The central event loop (spec.md §4.2, §4.10).
//!
//! Owns the one persistent [`XmppSession`], one [`Bridge`] per bare JID
//! that has ever talked to the gateway, and the ad-hoc session table.
//! Dispatches every inbound stanza to the right place, reconnects the
//! component session with backoff on disconnect, rejoins channels marked
//! `persistent` at startup, and reacts to signals (SIGINT/SIGTERM for a
//! clean shutdown, SIGUSR1/SIGUSR2 to reload logging and configuration).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use jid::{BareJid, Jid};
use minidom::Element;
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use xmpp_parsers::disco::{DiscoInfoResult, DiscoItemsResult};
use xmpp_parsers::iq::{Iq, IqType};
use xmpp_parsers::mam::Query as MamQuery;
use xmpp_parsers::message::{Message, MessageType};
use xmpp_parsers::ns;
use xmpp_parsers::presence::{Presence, Type as PresenceType};
use xmpp_parsers::stanza_error::DefinedCondition;
use xmpp_parsers::version::VersionResult;

use crate::adhoc::{self, AdhocSessions};
use crate::archive::Archive;
use crate::bridge::{Bridge, BridgeEvent};
use crate::config::Config;
use crate::error::Result;
use crate::identd::{self, IdentTable};
use crate::iid::{Iid, IidKind};
use crate::logging;
use crate::store;
use crate::timed_events::{TimedEvent, TimedEvents};
use crate::xmpp::{disco, session, Inbound, XmppSession};

/// How often stale ad-hoc sessions are swept (spec.md §3 "Ad-hoc session" —
/// "Expires 1 hour after creation"; a minute-granularity sweep is plenty).
const ADHOC_SWEEP_PERIOD: Duration = Duration::from_secs(60);

/// Initial XMPP reconnect delay, doubled on every failure up to
/// [`MAX_RECONNECT_BACKOFF`] (spec.md §4.10 "Reconnection").
const INITIAL_RECONNECT_BACKOFF: Duration = Duration::from_secs(1);
const MAX_RECONNECT_BACKOFF: Duration = Duration::from_secs(300);

/// What made [`Gateway::run_session`] return.
enum SessionOutcome {
    /// SIGINT/SIGTERM was handled; the whole process should exit.
    Shutdown,
    /// The component stream ended or errored; reconnect.
    Disconnected,
}

/// Gateway runtime state: one persistent XMPP session's worth of state plus
/// one [`Bridge`] per bare JID that has ever sent us a stanza (spec.md §3).
pub struct Gateway {
    config: Config,
    db: SqlitePool,
    archive: Archive,
    idents: IdentTable,
    bridges: HashMap<BareJid, Bridge>,
    adhoc: AdhocSessions,
    timed_events: TimedEvents,
    adhoc_sweep_due: Arc<AtomicBool>,
}

impl Gateway {
    pub fn new(config: Config, db: SqlitePool) -> Gateway {
        let archive = Archive::new(db.clone());
        Gateway {
            config,
            db,
            archive,
            idents: identd::new_table(),
            bridges: HashMap::new(),
            adhoc: AdhocSessions::new(),
            timed_events: TimedEvents::new(),
            adhoc_sweep_due: Arc::new(AtomicBool::new(false)),
        }
    }

    fn bridge_mut(&mut self, owner: &BareJid) -> &mut Bridge {
        let hostname = self.config.hostname.clone();
        let fixed_server = self.config.fixed_irc_server.clone();
        let db = self.db.clone();
        let archive = self.archive.clone();
        let idents = self.idents.clone();
        self.bridges
            .entry(owner.clone())
            .or_insert_with(|| Bridge::new(owner.clone(), hostname, fixed_server, db, archive, idents))
    }

    /// Schedules the repeating ad-hoc session sweep on the timed-event
    /// queue (spec.md §4.2, §4.10): the callback only flips a flag, since
    /// [`AdhocSessions::cleanup_expired`] needs `&mut self` access that a
    /// `'static` closure can't hold alongside the gateway that owns it.
    fn install_adhoc_sweep(&mut self) {
        let due = self.adhoc_sweep_due.clone();
        self.timed_events.add(TimedEvent::repeating(
            "adhoc-sweep",
            Instant::now() + ADHOC_SWEEP_PERIOD,
            ADHOC_SWEEP_PERIOD,
            move || due.store(true, Ordering::SeqCst),
        ));
    }

    /// Runs the gateway until a termination signal is handled, reconnecting
    /// the XMPP component session with exponential backoff whenever it's
    /// lost (spec.md §4.10 "Reconnection").
    pub async fn run(mut self) -> Result<()> {
        self.install_adhoc_sweep();
        if let Some(port) = self.config.identd_port {
            tokio::spawn(identd::run(port, self.idents.clone()));
        }
        let server_addr = self.server_addr();
        let mut backoff = INITIAL_RECONNECT_BACKOFF;

        loop {
            match XmppSession::connect(&self.config.hostname, &self.config.password, &server_addr).await {
                Ok(session) => {
                    backoff = INITIAL_RECONNECT_BACKOFF;
                    match self.run_session(session).await {
                        SessionOutcome::Shutdown => return Ok(()),
                        SessionOutcome::Disconnected => {
                            log::warn!("XMPP component session lost, reconnecting in {backoff:?}");
                        }
                    }
                }
                Err(e) => {
                    log::error!("could not connect to {}: {e}", self.config.port);
                }
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_RECONNECT_BACKOFF);
        }
    }

    async fn run_session(&mut self, mut xmpp: XmppSession) -> SessionOutcome {
        log::info!("connected to the XMPP server as {}", xmpp.jid());

        let (bridge_events_tx, mut bridge_events_rx) = mpsc::channel::<BridgeEvent>(256);
        if let Err(e) = self.rejoin_persistent_channels(&bridge_events_tx).await {
            log::warn!("could not rejoin persistent channels: {e}");
        }

        let mut sigint = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                log::error!("could not install SIGINT handler: {e}");
                return SessionOutcome::Disconnected;
            }
        };
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installs alongside SIGINT's");
        let mut sigusr1 = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::user_defined1())
            .expect("SIGUSR1 handler installs alongside SIGINT's");
        let mut sigusr2 = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::user_defined2())
            .expect("SIGUSR2 handler installs alongside SIGINT's");

        loop {
            let sleep = tokio::time::sleep(self.timed_events.get_timeout().unwrap_or(Duration::from_secs(3600)));

            tokio::select! {
                inbound = xmpp.recv() => {
                    match inbound {
                        Some(Inbound::Iq(iq)) => {
                            for stanza in self.handle_iq(iq).await {
                                let _ = xmpp.send(stanza).await;
                            }
                        }
                        Some(Inbound::Message(message)) => {
                            for stanza in self.handle_message(message, &bridge_events_tx).await {
                                let _ = xmpp.send(stanza).await;
                            }
                        }
                        Some(Inbound::Presence(presence)) => {
                            for stanza in self.handle_presence(presence, &bridge_events_tx).await {
                                let _ = xmpp.send(stanza).await;
                            }
                        }
                        None => {
                            log::warn!("component stream closed");
                            return SessionOutcome::Disconnected;
                        }
                    }
                }
                event = bridge_events_rx.recv() => {
                    let Some(event) = event else { continue };
                    let owner = event.owner.clone();
                    let bridge = self.bridges.get_mut(&owner);
                    if let Some(bridge) = bridge {
                        let stanzas = bridge.handle_irc_event(&event.server, event.event).await;
                        for stanza in stanzas {
                            let _ = xmpp.send(stanza).await;
                        }
                    }
                    self.clean_bridges();
                }
                _ = sigint.recv() => {
                    log::info!("SIGINT received, shutting down");
                    self.shutdown(&mut xmpp).await;
                    return SessionOutcome::Shutdown;
                }
                _ = sigterm.recv() => {
                    log::info!("SIGTERM received, shutting down");
                    self.shutdown(&mut xmpp).await;
                    return SessionOutcome::Shutdown;
                }
                _ = sigusr1.recv() => {
                    self.reload_config_and_logging();
                }
                _ = sigusr2.recv() => {
                    self.reload_config_and_logging();
                }
                _ = sleep => {
                    self.timed_events.execute_expired();
                    if self.adhoc_sweep_due.swap(false, Ordering::SeqCst) {
                        self.adhoc.cleanup_expired();
                    }
                    self.clean_bridges();
                }
            }
        }
    }

    /// Re-reads the configuration file and resets the logger from it
    /// (spec.md §4.10 "Signal handling"). The XMPP session itself isn't
    /// reconnected just because of this; only `hostname`/`password`
    /// changes would require that, and those are read once at startup.
    fn reload_config_and_logging(&mut self) {
        match Config::load(&Config::default_path()) {
            Ok(new_config) => {
                self.config.log_level = new_config.log_level;
                self.config.log_file = new_config.log_file;
                logging::reset(&self.config);
                log::info!("configuration reloaded");
            }
            Err(e) => log::warn!("could not reload configuration: {e}"),
        }
    }

    async fn shutdown(&mut self, xmpp: &mut XmppSession) {
        for bridge in self.bridges.values_mut() {
            bridge.shutdown().await;
        }
        let _ = xmpp.close().await;
    }

    /// Drops every bridge holding no active IRC client (spec.md §4.10 item
    /// 4, "Bridges.clean()"). A fresh [`Bridge`] is recreated on the next
    /// stanza from that bare JID (spec.md §3 "Lifecycle").
    fn clean_bridges(&mut self) {
        self.bridges.retain(|_, bridge| !bridge.is_empty());
    }

    async fn rejoin_persistent_channels(&mut self, events_tx: &mpsc::Sender<BridgeEvent>) -> Result<()> {
        let persistent = store::IrcChannelOptions::all_persistent(&self.db).await?;
        for (owner, server, channel) in persistent {
            let Ok(owner_jid) = owner.parse::<BareJid>() else {
                log::warn!("skipping malformed persistent-channel owner {owner}");
                continue;
            };
            let bridge = self.bridge_mut(&owner_jid);
            if let Err(e) = bridge.rejoin_persistent(&server, &channel, events_tx).await {
                log::warn!("could not rejoin {channel}%{server} for {owner}: {e}");
            }
        }
        Ok(())
    }

    /// Builds the `host:port` address to dial for the XMPP component
    /// connection: `xmpp_server_ip`, if set, overrides the host but keeps
    /// `port`'s port number (spec.md §6 "xmpp_server_ip").
    fn server_addr(&self) -> String {
        match &self.config.xmpp_server_ip {
            Some(ip) => {
                let port = self.config.port.rsplit_once(':').map(|(_, p)| p).unwrap_or("5347");
                format!("{ip}:{port}")
            }
            None => self.config.port.clone(),
        }
    }

    fn parse_target(&self, to: &Jid) -> Iid {
        let local = to.node().unwrap_or_default();
        Iid::parse(local, &Iid::default_chantypes(), self.config.fixed_irc_server.as_deref())
    }

    // -----------------------------------------------------------------
    // Presence / message routing (delegates straight to the right Bridge)
    // -----------------------------------------------------------------

    async fn handle_presence(&mut self, presence: Presence, events_tx: &mpsc::Sender<BridgeEvent>) -> Vec<Element> {
        let Some(from) = presence.from.clone() else { return Vec::new() };
        if presence.type_ == PresenceType::Subscribe {
            return self.handle_subscription_request(presence).await;
        }
        let owner = from.to_bare();
        self.bridge_mut(&owner).handle_presence(presence, events_tx).await
    }

    /// Auto-accepts every subscription request (spec.md §6 `roster` table,
    /// SPEC_FULL.md "Supplemented features — Roster bookkeeping"): biboumi
    /// has no notion of declining a user who wants it in their roster.
    async fn handle_subscription_request(&mut self, presence: Presence) -> Vec<Element> {
        let (Some(from), Some(to)) = (presence.from.clone(), presence.to.clone()) else {
            return Vec::new();
        };
        let local_jid = to.to_bare().to_string();
        let remote_jid = from.to_bare().to_string();
        if let Err(e) = store::remember_roster_entry(&self.db, &local_jid, &remote_jid).await {
            log::warn!("could not record roster entry: {e}");
        }
        let mut accept = Presence::new(PresenceType::Subscribed);
        accept.from = Some(to);
        accept.to = Some(from.clone());
        let mut subscribe_back = Presence::new(PresenceType::Subscribe);
        subscribe_back.from = accept.from.clone();
        subscribe_back.to = Some(from);
        vec![accept.into(), subscribe_back.into()]
    }

    async fn handle_message(&mut self, message: Message, events_tx: &mpsc::Sender<BridgeEvent>) -> Vec<Element> {
        let Some(from) = message.from.clone() else { return Vec::new() };
        let owner = from.to_bare();
        if message.type_ == MessageType::Error {
            return self.bridge_mut(&owner).handle_error_message(message).await;
        }
        self.bridge_mut(&owner).handle_message(message, events_tx).await
    }

    // -----------------------------------------------------------------
    // Iq dispatch (spec.md §4.6 "Stanza dispatch")
    // -----------------------------------------------------------------

    async fn handle_iq(&mut self, iq: Iq) -> Vec<Element> {
        let Some(to) = iq.to.clone() else { return Vec::new() };
        let Some(from) = iq.from.clone() else { return Vec::new() };
        let id = iq.id.clone();

        match iq.payload {
            IqType::Get(payload) => self.handle_iq_get(id, from, to, payload).await,
            IqType::Set(payload) => self.handle_iq_set(id, from, to, payload).await,
            // Nothing in this crate correlates replies to its own
            // fire-and-forget upward requests (spec.md §9 "CTCP"); any
            // other result/error we receive is simply not ours to answer.
            IqType::Result(_) | IqType::Error(_) => Vec::new(),
        }
    }

    async fn handle_iq_get(&mut self, id: String, from: Jid, to: Jid, payload: Element) -> Vec<Element> {
        if payload.is("query", ns::DISCO_INFO) {
            let info = self.disco_info(&to).await;
            return vec![result_iq(info, id, from, to).into()];
        }
        if payload.is("query", ns::DISCO_ITEMS) {
            let items = self.disco_items(&to).await;
            return vec![result_iq(items, id, from, to).into()];
        }
        if payload.is("ping", ns::PING) {
            return vec![Iq::empty_result(id).with_to(from).with_from(to).into()];
        }
        if payload.is("query", ns::VERSION) {
            let result = VersionResult {
                name: "biboumi".to_owned(),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                os: None,
            };
            return vec![Iq::from_result(id, Some(result)).with_to(from).with_from(to).into()];
        }
        if payload.is("query", ns::MAM) {
            return self.handle_mam_query(id, from, to, payload).await;
        }
        if payload.is("command", ns::COMMANDS) {
            return vec![self.handle_adhoc(&id, &payload, &from, &to).await];
        }
        vec![error_reply(&id, from, to, DefinedCondition::FeatureNotImplemented, "unsupported iq get")]
    }

    async fn handle_iq_set(&mut self, id: String, from: Jid, to: Jid, payload: Element) -> Vec<Element> {
        if payload.is("query", ns::MAM) {
            return self.handle_mam_query(id, from, to, payload).await;
        }
        if payload.is("command", ns::COMMANDS) {
            return vec![self.handle_adhoc(&id, &payload, &from, &to).await];
        }
        vec![error_reply(&id, from, to, DefinedCondition::FeatureNotImplemented, "unsupported iq set")]
    }

    async fn handle_mam_query(&mut self, id: String, from: Jid, to: Jid, payload: Element) -> Vec<Element> {
        let Ok(query) = MamQuery::try_from(payload) else {
            return vec![error_reply(&id, from, to, DefinedCondition::BadRequest, "malformed mam query")];
        };
        let iid = self.parse_target(&to);
        if iid.kind != IidKind::Channel {
            return vec![error_reply(&id, from, to, DefinedCondition::ItemNotFound, "not an archived channel")];
        }
        let owner = from.to_bare();
        let bridge = self.bridge_mut(&owner);
        let (mut results, fin) = bridge.handle_mam_query(&iid.local, &iid.server, &from, &id, &query).await;
        results.push(fin);
        results
    }

    async fn handle_adhoc(&mut self, id: &str, payload: &Element, from: &Jid, to: &Jid) -> Element {
        let owner = from.to_bare();
        let bridge = self.bridge_mut(&owner);
        let iq = Iq {
            from: Some(from.clone()),
            to: Some(to.clone()),
            id: id.to_owned(),
            payload: IqType::Get(payload.clone()),
        };
        adhoc::handle(&self.db, &mut self.adhoc, bridge, &self.config.hostname, &iq, payload, from, to).await
    }

    async fn disco_info(&mut self, to: &Jid) -> DiscoInfoResult {
        if to.node().is_none() {
            return disco::gateway_disco_info();
        }
        let iid = self.parse_target(to);
        match iid.kind {
            IidKind::Channel => disco::channel_disco_info(&iid.local),
            _ => disco::server_disco_info(),
        }
    }

    async fn disco_items(&mut self, to: &Jid) -> DiscoItemsResult {
        if to.node().is_none() {
            let owner = to.to_bare();
            let servers = self.bridges.get(&owner).map(|b| b.connected_servers()).unwrap_or_default();
            return disco::gateway_disco_items(&servers, &self.config.hostname);
        }
        let iid = self.parse_target(to);
        let owner = to.to_bare();
        let channels = self
            .bridges
            .get(&owner)
            .map(|b| b.joined_channels(&iid.server))
            .unwrap_or_default();
        disco::server_disco_items(&channels, &iid.server, &self.config.hostname)
    }
}

/// Builds a stanza-error `<iq/>` reply addressed back to `from`, with
/// `to` (the request's original destination) as the error's `from`
/// (spec.md §7 "Stanza-level errors").
fn error_reply(id: &str, from: Jid, to: Jid, condition: DefinedCondition, text: &str) -> Element {
    let mut iq = session::build_error_iq(id, to, condition, text);
    iq.to = Some(from);
    iq.into()
}

/// Wraps a typed result payload into a result `<iq/>` addressed back to
/// `from`, with `to` set as the reply's `from` (spec.md §4.6).
fn result_iq<P: xmpp_parsers::iq::IqResultPayload>(result: P, id: String, from: Jid, to: Jid) -> Iq {
    Iq::from_result(id, Some(result)).with_to(from).with_from(to)
}
