// Copyright (c) 2017 Maxime “pep” Buquet <pep@bouah.net>
// Copyright (c) 2017 Emmanuel Gil Peyrot <linkmauve@linkmauve.fr>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Provides a `Jid` struct for Jabber IDs, as well as `BareJid` and `FullJid`
//! for the cases where the resource part may or may not be present.
//!
//! A JID looks like `node@domain/resource`, where the `node@` and the
//! `/resource` are optional, except that a [`FullJid`] requires the resource
//! to be present while it is forbidden on a [`BareJid`]. [`Jid`] covers both
//! cases in a single enum.

#![deny(unsafe_code)]

mod bare;
mod error;
mod full;
mod parts;

pub use crate::bare::BareJid;
pub use crate::error::Error;
pub use crate::full::FullJid;
pub use crate::parts::{DomainPart, NodePart, ResourcePart};

use std::fmt;
use std::str::FromStr;

use crate::parts::split_jid;

/// An enum representing a Jabber ID, with or without a resource.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Jid {
    /// A bare JID, with no resource.
    Bare(BareJid),

    /// A full JID, with a resource.
    Full(FullJid),
}

impl fmt::Debug for Jid {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Jid::Bare(jid) => jid.fmt(fmt),
            Jid::Full(jid) => jid.fmt(fmt),
        }
    }
}

impl Jid {
    /// Parses a `Jid` from a string, such as `node@domain/resource`,
    /// `node@domain` or plain `domain`.
    pub fn new(s: &str) -> Result<Jid, Error> {
        s.parse()
    }

    /// The localpart of this JID, if any.
    pub fn node(&self) -> Option<&str> {
        match self {
            Jid::Bare(jid) => jid.node(),
            Jid::Full(jid) => jid.node(),
        }
    }

    /// The domain of this JID.
    pub fn domain(&self) -> &str {
        match self {
            Jid::Bare(jid) => jid.domain(),
            Jid::Full(jid) => jid.domain(),
        }
    }

    /// The resource of this JID, if any.
    pub fn resource(&self) -> Option<&str> {
        match self {
            Jid::Bare(_) => None,
            Jid::Full(jid) => Some(jid.resource()),
        }
    }

    /// Returns the bare version of this JID, dropping the resource if any.
    pub fn to_bare(&self) -> BareJid {
        match self {
            Jid::Bare(jid) => jid.clone(),
            Jid::Full(jid) => jid.to_bare(),
        }
    }

    /// Consumes this JID to produce its bare version, dropping the resource
    /// if any.
    pub fn into_bare(self) -> BareJid {
        match self {
            Jid::Bare(jid) => jid,
            Jid::Full(jid) => jid.into_bare(),
        }
    }

    /// Returns true if this JID has no resource.
    pub fn is_bare(&self) -> bool {
        matches!(self, Jid::Bare(_))
    }

    /// Returns true if this JID has a resource.
    pub fn is_full(&self) -> bool {
        matches!(self, Jid::Full(_))
    }
}

impl FromStr for Jid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Jid, Error> {
        let (node, domain, resource) = split_jid(s)?;
        Ok(match resource {
            Some(resource) => Jid::Full(FullJid::from_parts(node, domain, resource)?),
            None => Jid::Bare(BareJid::from_parts(node, domain)?),
        })
    }
}

impl TryFrom<String> for Jid {
    type Error = Error;

    fn try_from(s: String) -> Result<Jid, Error> {
        s.parse()
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Jid::Bare(jid) => jid.fmt(fmt),
            Jid::Full(jid) => jid.fmt(fmt),
        }
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Jid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Jid {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Jid, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bare() {
        let jid: Jid = "foo@example.com".parse().unwrap();
        assert_eq!(jid.node(), Some("foo"));
        assert_eq!(jid.domain(), "example.com");
        assert_eq!(jid.resource(), None);
        assert!(jid.is_bare());
    }

    #[test]
    fn parse_full() {
        let jid: Jid = "foo@example.com/resource".parse().unwrap();
        assert_eq!(jid.node(), Some("foo"));
        assert_eq!(jid.domain(), "example.com");
        assert_eq!(jid.resource(), Some("resource"));
        assert!(jid.is_full());
    }

    #[test]
    fn parse_domain_only() {
        let jid: Jid = "example.com".parse().unwrap();
        assert_eq!(jid.node(), None);
        assert_eq!(jid.domain(), "example.com");
    }

    #[test]
    fn reject_resource_in_bare() {
        assert!(BareJid::from_str("foo@example.com/resource").is_err());
    }

    #[test]
    fn reject_empty_node() {
        assert_eq!(Jid::from_str("@example.com"), Err(Error::NodeEmptyWithAt));
    }

    #[test]
    fn reject_empty_resource() {
        assert_eq!(
            Jid::from_str("foo@example.com/"),
            Err(Error::ResourceEmptyWithSlash)
        );
    }

    #[test]
    fn roundtrip_display() {
        let jid: FullJid = "foo@example.com/resource".parse().unwrap();
        assert_eq!(jid.to_string(), "foo@example.com/resource");
        assert_eq!(jid.to_bare().to_string(), "foo@example.com");
    }

    #[test]
    fn irc_style_node_with_percent() {
        // biboumi JIDs embed an IRC server name as `local%server` in the
        // node part of a JID, which must survive untouched.
        let jid: BareJid = "#foo%irc.example.com@biboumi.example.com".parse().unwrap();
        assert_eq!(jid.node(), Some("#foo%irc.example.com"));
    }
}
