//! Service-discovery responses (spec.md §6 "Supported feature namespaces").
//!
//! Three distinct disco#info identities are ever returned: the component
//! root, an IRC server Iid, and a channel Iid (which additionally
//! advertises `muc_nonanonymous` and the self-ping marker). disco#items
//! lists, depending on the target, either every connected IRC server for
//! a bare-jid request, or every joined channel for a server request.

use xmpp_parsers::disco::{DiscoInfoResult, DiscoItemsResult, Feature, Identity, Item};
use xmpp_parsers::ns;

/// Namespaces advertised on the *component root* JID.
pub fn gateway_features() -> Vec<Feature> {
    [
        ns::DISCO_INFO,
        ns::DISCO_ITEMS,
        ns::MUC,
        "http://jabber.org/protocol/muc#stable_id",
        ns::MUC_USER,
        "http://jabber.org/protocol/muc#admin",
        "http://jabber.org/protocol/muc#owner",
        ns::COMMANDS,
        ns::PING,
        ns::MAM,
        ns::VERSION,
        "urn:xmpp:sid:0",
    ]
    .into_iter()
    .map(Feature::new)
    .collect()
}

/// disco#info for the bare component JID.
pub fn gateway_disco_info() -> DiscoInfoResult {
    DiscoInfoResult {
        node: None,
        identities: vec![Identity::new("gateway", "irc", "en", "biboumi")],
        features: gateway_features(),
        extensions: vec![],
    }
}

/// disco#info for an IRC-server Iid (`server@component`).
pub fn server_disco_info() -> DiscoInfoResult {
    DiscoInfoResult {
        node: None,
        identities: vec![Identity::new("conference", "irc", "en", "biboumi")],
        features: gateway_features(),
        extensions: vec![],
    }
}

/// disco#info for a channel Iid (`chan%server@component`): adds the
/// "non-anonymous" and self-ping feature markers every MUC room carries.
pub fn channel_disco_info(name: &str) -> DiscoInfoResult {
    let mut features = gateway_features();
    features.push(Feature::new("muc_nonanonymous"));
    features.push(Feature::new("urn:xmpp:ping#self"));
    DiscoInfoResult {
        node: None,
        identities: vec![Identity::new("conference", "irc", "en", name)],
        features,
        extensions: vec![],
    }
}

/// disco#items for the component root: one item per currently-connected
/// IRC server (name used as both jid-local and name).
pub fn gateway_disco_items(servers: &[String], component_hostname: &str) -> DiscoItemsResult {
    let items = servers
        .iter()
        .filter_map(|server| {
            format!("{server}@{component_hostname}").parse().ok().map(|jid| Item {
                jid,
                node: None,
                name: Some(server.clone()),
            })
        })
        .collect();
    DiscoItemsResult { node: None, items }
}

/// disco#items for a server Iid: one item per currently-joined channel.
pub fn server_disco_items(channels: &[String], server: &str, component_hostname: &str) -> DiscoItemsResult {
    let items = channels
        .iter()
        .filter_map(|chan| {
            format!("{chan}%{server}@{component_hostname}")
                .parse()
                .ok()
                .map(|jid| Item {
                    jid,
                    node: None,
                    name: Some(chan.clone()),
                })
        })
        .collect();
    DiscoItemsResult { node: None, items }
}
