//! XEP-0050 ad-hoc commands (SPEC_FULL.md "Supplemented features — Ad-hoc
//! commands"): `configure-irc-server`, `configure-irc-channel`,
//! `disconnect`, `list-irc-servers`. `xmpp_parsers` has no typed module for
//! this XEP (only the data-forms payload it carries is modeled), so the
//! `<command/>` wrapper is read and built by hand here, the same way
//! [`crate::bridge::find_invite_nick`] reads a mediated invitation directly
//! off the `Element` tree.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use jid::{BareJid, Jid};
use minidom::Element;
use sqlx::SqlitePool;
use uuid::Uuid;
use xmpp_parsers::data_forms::{DataForm, DataFormType, Field, FieldType};
use xmpp_parsers::iq::{Iq, IqType};
use xmpp_parsers::ns;
use xmpp_parsers::stanza_error::DefinedCondition;

use crate::bridge::Bridge;
use crate::store::{IrcChannelOptions, IrcServerOptions};
use crate::xmpp::session;

/// How long an [`AdhocSession`] survives without a follow-up request
/// (spec.md §3 "Ad-hoc session" — "Expires 1 hour after creation").
const SESSION_TTL: Duration = Duration::from_secs(3600);

/// One in-flight multi-step ad-hoc command (spec.md §3 "Ad-hoc session").
struct AdhocSession {
    owner_jid: BareJid,
    target_jid: Jid,
    command_ref: String,
    step_index: u8,
    terminated: bool,
    vars: HashMap<String, String>,
    expires_at: Instant,
}

/// The set of ad-hoc sessions currently open, owned by [`crate::gateway::Gateway`].
#[derive(Default)]
pub struct AdhocSessions {
    sessions: HashMap<String, AdhocSession>,
}

impl AdhocSessions {
    pub fn new() -> AdhocSessions {
        AdhocSessions::default()
    }

    /// Drops every session past its TTL, or already terminated (spec.md §3
    /// "Lifecycle — Ad-hoc sessions are destroyed on completion,
    /// cancellation, or timeout").
    pub fn cleanup_expired(&mut self) {
        let now = Instant::now();
        self.sessions.retain(|_, s| !s.terminated && s.expires_at > now);
    }
}

/// Handles one `<iq/>` whose payload is a `<command xmlns='...commands'/>`.
/// `bridge` is the requester's own bridge (created beforehand if absent);
/// `target` is the Iid the command was addressed to (a server or a channel,
/// depending on the command).
pub async fn handle(
    db: &SqlitePool,
    sessions: &mut AdhocSessions,
    bridge: &mut Bridge,
    component_hostname: &str,
    iq: &Iq,
    payload: &Element,
    from: &Jid,
    to: &Jid,
) -> Element {
    let id = iq.id.clone();
    let node = payload.attr("node").unwrap_or_default().to_owned();
    let sessionid = payload.attr("sessionid").map(str::to_owned);
    let owner = bare(from);

    if let Some(sessionid) = sessionid {
        return continue_session(db, sessions, bridge, &sessionid, payload, &id, from, to).await;
    }

    match node.as_str() {
        "list-irc-servers" => list_irc_servers(bridge, &id, from, to),
        "disconnect" => start_disconnect(sessions, bridge, owner, to, &node, &id, from),
        "configure-irc-server" => start_configure_server(db, sessions, owner, to, &node, &id, from).await,
        "configure-irc-channel" => start_configure_channel(db, sessions, owner, to, &node, &id, from).await,
        _ => error_result(&id, to.clone(), from.clone(), DefinedCondition::ItemNotFound, "unknown command"),
    }
}

fn bare(jid: &Jid) -> BareJid {
    match jid {
        Jid::Bare(b) => b.clone(),
        Jid::Full(f) => f.clone().into(),
    }
}

fn command_root(node: &str, sessionid: &str, status: &str) -> Element {
    Element::builder("command", ns::COMMANDS)
        .attr("node", node)
        .attr("sessionid", sessionid)
        .attr("status", status)
        .build()
}

fn note(text: &str) -> Element {
    Element::builder("note", ns::COMMANDS)
        .attr("type", "info")
        .append(text)
        .build()
}

fn completed_note(node: &str, sessionid: &str, text: &str, id: &str, from: Jid, to: Jid) -> Element {
    let mut command = command_root(node, sessionid, "completed");
    command.append_child(note(text));
    Iq::from_result(id.to_owned(), Some(IqResultPayload(command)))
        .with_to(from)
        .with_from(to)
        .into()
}

/// Thin wrapper so a raw `<command/>` [`Element`] can be threaded through
/// `Iq::from_result`, which wants an [`xmpp_parsers::iq::IqResultPayload`].
struct IqResultPayload(Element);

impl From<IqResultPayload> for Element {
    fn from(payload: IqResultPayload) -> Element {
        payload.0
    }
}

impl TryFrom<Element> for IqResultPayload {
    type Error = Element;

    fn try_from(value: Element) -> Result<Self, Element> {
        Ok(IqResultPayload(value))
    }
}

impl xmpp_parsers::iq::IqResultPayload for IqResultPayload {}

fn error_result(id: &str, from: Jid, to: Jid, condition: DefinedCondition, text: &str) -> Element {
    let mut iq = session::build_error_iq(id, from, condition, text);
    iq.to = Some(to);
    iq.into()
}

fn list_irc_servers(bridge: &Bridge, id: &str, from: &Jid, to: &Jid) -> Element {
    let servers = bridge.connected_servers();
    let field = Field::new("servers", FieldType::TextMulti).with_value("");
    let mut field = field;
    field.values = servers;
    let form = DataForm::new(DataFormType::Result_, "http://jabber.org/protocol/commands", vec![field]);
    let mut command = command_root("list-irc-servers", &Uuid::new_v4().to_string(), "completed");
    command.append_child(form.into());
    Iq::from_result(id.to_owned(), Some(IqResultPayload(command)))
        .with_to(from.clone())
        .with_from(to.clone())
        .into()
}

fn start_disconnect(
    sessions: &mut AdhocSessions,
    bridge: &Bridge,
    owner: BareJid,
    to: &Jid,
    node: &str,
    id: &str,
    from: &Jid,
) -> Element {
    let servers = bridge.connected_servers();
    let options: Vec<_> = servers
        .iter()
        .map(|s| xmpp_parsers::data_forms::Option_ {
            label: Some(s.clone()),
            value: s.clone(),
        })
        .collect();
    let mut field = Field::new("server", FieldType::ListSingle);
    field.options = options;
    field.required = true;
    let form = DataForm::new(DataFormType::Form, "http://jabber.org/protocol/commands", vec![field]);

    let sessionid = Uuid::new_v4().to_string();
    sessions.sessions.insert(
        sessionid.clone(),
        AdhocSession {
            owner_jid: owner,
            target_jid: to.clone(),
            command_ref: node.to_owned(),
            step_index: 0,
            terminated: false,
            vars: HashMap::new(),
            expires_at: Instant::now() + SESSION_TTL,
        },
    );
    let mut command = command_root(node, &sessionid, "executing");
    command.append_child(form.into());
    Iq::from_result(id.to_owned(), Some(IqResultPayload(command)))
        .with_to(from.clone())
        .with_from(to.clone())
        .into()
}

async fn start_configure_server(
    db: &SqlitePool,
    sessions: &mut AdhocSessions,
    owner: BareJid,
    to: &Jid,
    node: &str,
    id: &str,
    from: &Jid,
) -> Element {
    let iid = crate::iid::Iid::parse(to.node().unwrap_or_default(), &crate::iid::Iid::default_chantypes(), None);
    let options = IrcServerOptions::load(db, &owner.to_string(), &iid.server).await.ok().flatten().unwrap_or_default();
    let fields = vec![
        Field::text_single("nick", options.nick.as_deref().unwrap_or_default()),
        Field::text_single("username", options.username.as_deref().unwrap_or_default()),
        Field::text_single("realname", options.realname.as_deref().unwrap_or_default()),
        Field::text_single("ports", options.ports.as_deref().unwrap_or_default()),
        Field::text_single("tls_ports", options.tls_ports.as_deref().unwrap_or_default()),
        Field::text_single(
            "throttle_limit",
            &options.throttle_limit.map(|v| v.to_string()).unwrap_or_default(),
        ),
    ];
    let form = DataForm::new(DataFormType::Form, "http://jabber.org/protocol/commands", fields);

    let sessionid = Uuid::new_v4().to_string();
    sessions.sessions.insert(
        sessionid.clone(),
        AdhocSession {
            owner_jid: owner,
            target_jid: to.clone(),
            command_ref: node.to_owned(),
            step_index: 0,
            terminated: false,
            vars: HashMap::new(),
            expires_at: Instant::now() + SESSION_TTL,
        },
    );
    let mut command = command_root(node, &sessionid, "executing");
    command.append_child(form.into());
    Iq::from_result(id.to_owned(), Some(IqResultPayload(command)))
        .with_to(from.clone())
        .with_from(to.clone())
        .into()
}

async fn start_configure_channel(
    db: &SqlitePool,
    sessions: &mut AdhocSessions,
    owner: BareJid,
    to: &Jid,
    node: &str,
    id: &str,
    from: &Jid,
) -> Element {
    let iid = crate::iid::Iid::parse(to.node().unwrap_or_default(), &crate::iid::Iid::default_chantypes(), None);
    let options = IrcChannelOptions::load(db, &owner.to_string(), &iid.server, &iid.local)
        .await
        .ok()
        .flatten()
        .unwrap_or_default();
    let record_history = match options.record_history_optional {
        Some(true) => "true",
        Some(false) => "false",
        None => "unset",
    };
    let fields = vec![
        Field::new("persistent", FieldType::Boolean).with_value(if options.persistent { "true" } else { "false" }),
        Field::text_single("record_history", record_history),
        Field::text_single(
            "max_history_length",
            &options.max_history_length.map(|v| v.to_string()).unwrap_or_default(),
        ),
        Field::text_single("encoding_in", options.encoding_in.as_deref().unwrap_or_default()),
        Field::text_single("encoding_out", options.encoding_out.as_deref().unwrap_or_default()),
    ];
    let form = DataForm::new(DataFormType::Form, "http://jabber.org/protocol/commands", fields);

    let sessionid = Uuid::new_v4().to_string();
    sessions.sessions.insert(
        sessionid.clone(),
        AdhocSession {
            owner_jid: owner,
            target_jid: to.clone(),
            command_ref: node.to_owned(),
            step_index: 0,
            terminated: false,
            vars: HashMap::new(),
            expires_at: Instant::now() + SESSION_TTL,
        },
    );
    let mut command = command_root(node, &sessionid, "executing");
    command.append_child(form.into());
    Iq::from_result(id.to_owned(), Some(IqResultPayload(command)))
        .with_to(from.clone())
        .with_from(to.clone())
        .into()
}

async fn continue_session(
    db: &SqlitePool,
    sessions: &mut AdhocSessions,
    bridge: &mut Bridge,
    sessionid: &str,
    payload: &Element,
    id: &str,
    from: &Jid,
    to: &Jid,
) -> Element {
    let Some(adhoc) = sessions.sessions.get(sessionid) else {
        return error_result(id, to.clone(), from.clone(), DefinedCondition::ItemNotFound, "unknown or expired session");
    };
    if adhoc.owner_jid != bare(from) {
        return error_result(id, to.clone(), from.clone(), DefinedCondition::Forbidden, "session owned by another user");
    }
    let command_ref = adhoc.command_ref.clone();

    let submitted = payload
        .get_child("x", ns::DATA_FORMS)
        .cloned()
        .and_then(|x| DataForm::try_from(x).ok());
    let values = submitted
        .map(|form| {
            form.fields
                .into_iter()
                .filter_map(|f| f.var.map(|var| (var, f.values.into_iter().next().unwrap_or_default())))
                .collect::<HashMap<_, _>>()
        })
        .unwrap_or_default();

    let result = match command_ref.as_str() {
        "disconnect" => {
            let reason = values.get("server").cloned();
            if let Some(server) = values.get("server") {
                bridge.disconnect_server(server, None).await;
            }
            completed_note(&command_ref, sessionid, &format!("Disconnected from {}.", reason.unwrap_or_default()), id, from.clone(), to.clone())
        }
        "configure-irc-server" => {
            let iid = crate::iid::Iid::parse(to.node().unwrap_or_default(), &crate::iid::Iid::default_chantypes(), None);
            let options = IrcServerOptions {
                nick: non_empty(values.get("nick")),
                username: non_empty(values.get("username")),
                realname: non_empty(values.get("realname")),
                ports: non_empty(values.get("ports")),
                tls_ports: non_empty(values.get("tls_ports")),
                throttle_limit: values.get("throttle_limit").and_then(|v| v.parse().ok()),
                ..IrcServerOptions::default()
            };
            let owner = bare(from).to_string();
            match IrcServerOptions::save(db, &owner, &iid.server, &options).await {
                Ok(()) => completed_note(&command_ref, sessionid, "Server configuration saved.", id, from.clone(), to.clone()),
                Err(_) => error_result(id, to.clone(), from.clone(), DefinedCondition::InternalServerError, "could not save configuration"),
            }
        }
        "configure-irc-channel" => {
            let iid = crate::iid::Iid::parse(to.node().unwrap_or_default(), &crate::iid::Iid::default_chantypes(), None);
            let record_history_optional = match values.get("record_history").map(String::as_str) {
                Some("true") => Some(true),
                Some("false") => Some(false),
                _ => None,
            };
            let options = IrcChannelOptions {
                encoding_in: non_empty(values.get("encoding_in")),
                encoding_out: non_empty(values.get("encoding_out")),
                max_history_length: values.get("max_history_length").and_then(|v| v.parse().ok()),
                persistent: values.get("persistent").map(|v| v == "true" || v == "1").unwrap_or(false),
                record_history_optional,
            };
            let owner = bare(from).to_string();
            match IrcChannelOptions::save(db, &owner, &iid.server, &iid.local, &options).await {
                Ok(()) => completed_note(&command_ref, sessionid, "Channel configuration saved.", id, from.clone(), to.clone()),
                Err(_) => error_result(id, to.clone(), from.clone(), DefinedCondition::InternalServerError, "could not save configuration"),
            }
        }
        _ => error_result(id, to.clone(), from.clone(), DefinedCondition::ItemNotFound, "unknown command"),
    };

    if let Some(session) = sessions.sessions.get_mut(sessionid) {
        session.terminated = true;
    }
    result
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.is_empty()).cloned()
}
