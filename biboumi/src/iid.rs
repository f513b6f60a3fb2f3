//! IRC-in-JID address (spec.md §3, §6 "Address grammar").
//!
//! `Iid` is biboumi's encoding of an IRC target (a channel, a nick, or a
//! bare IRC server) as the local part of an XMPP JID: `local%server`, or
//! just `local` in fixed-server mode.

use std::collections::BTreeSet;
use std::fmt;

/// What an [`Iid`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IidKind {
    /// An IRC channel (first character of `local` is a configured chantype).
    Channel,
    /// An IRC user / nickname.
    User,
    /// The IRC server itself (empty local part).
    Server,
    /// Neither of the above; only produced by malformed input.
    None,
}

/// A parsed IRC-in-JID address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Iid {
    /// What kind of entity this addresses.
    pub kind: IidKind,
    /// The local part: a channel name (with sigil), a nick, or empty.
    pub local: String,
    /// The IRC server's configured name.
    pub server: String,
}

/// XEP-0106 escapes the `%` separator and `#` sigil (among others) used in
/// the JID local part grammar. Only the two characters biboumi's own
/// grammar depends on are handled here; anything else passes through
/// untouched, matching the original's narrower escaping.
fn xep0106_decode(s: &str) -> String {
    s.replace("\\23", "#").replace("\\40", "@")
}

fn xep0106_encode(s: &str) -> String {
    s.replace('#', "\\23")
}

impl Iid {
    /// Parses `local` (already XEP-0106-decoded) into an [`Iid`], given the
    /// server's current `CHANTYPES` set (default `{#, &}`).
    ///
    /// In "normal" mode `local` is `target%server`; in fixed-server mode
    /// (when `fixed_server` is `Some`) the whole of `local` is the target
    /// and the server is the configured constant.
    pub fn parse(local: &str, chantypes: &BTreeSet<char>, fixed_server: Option<&str>) -> Iid {
        let decoded = xep0106_decode(local);
        let (target, server) = match fixed_server {
            Some(server) => (decoded, server.to_owned()),
            None => match decoded.split_once('%') {
                Some((target, server)) => (target.to_owned(), server.to_owned()),
                None => (decoded, String::new()),
            },
        };

        let kind = if target.is_empty() {
            IidKind::Server
        } else if target.starts_with(|c| chantypes.contains(&c)) {
            IidKind::Channel
        } else {
            IidKind::User
        };

        Iid {
            kind,
            local: target,
            server,
        }
    }

    /// Default `CHANTYPES` before any ISUPPORT advertisement is seen.
    pub fn default_chantypes() -> BTreeSet<char> {
        BTreeSet::from(['#', '&'])
    }

    /// Renders back to the JID-local-part grammar this was parsed from.
    pub fn to_local_part(&self, fixed_server: bool) -> String {
        let encoded = xep0106_encode(&self.local);
        if fixed_server {
            encoded
        } else {
            format!("{encoded}%{}", self.server)
        }
    }
}

impl fmt::Display for Iid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_local_part(false))
    }
}
