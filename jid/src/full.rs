// Copyright (c) 2017 Maxime “pep” Buquet <pep@bouah.net>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::fmt;
use std::str::FromStr;

use crate::parts::{split_jid, DomainPart, NodePart, ResourcePart};
use crate::{BareJid, Error, Jid};

/// A full JID, that is a JID with a resource part, like `node@domain/resource`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FullJid {
    pub(crate) node: Option<NodePart>,
    pub(crate) domain: DomainPart,
    pub(crate) resource: ResourcePart,
}

impl fmt::Debug for FullJid {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "FullJid({})", self)
    }
}

impl FullJid {
    /// Parses a full JID from a string, such as `node@domain/resource`.
    pub fn new(s: &str) -> Result<FullJid, Error> {
        s.parse()
    }

    /// Constructs a full JID from its already stringprep’d parts.
    pub(crate) fn from_parts(
        node: Option<&str>,
        domain: &str,
        resource: &str,
    ) -> Result<FullJid, Error> {
        Ok(FullJid {
            node: node.map(NodePart::new).transpose()?,
            domain: DomainPart::new(domain)?,
            resource: ResourcePart::new(resource)?,
        })
    }

    /// The localpart of this JID, if any.
    pub fn node(&self) -> Option<&str> {
        self.node.as_ref().map(|node| node.as_str())
    }

    /// The domain of this JID.
    pub fn domain(&self) -> &str {
        self.domain.as_str()
    }

    /// The resource of this JID.
    pub fn resource(&self) -> &str {
        self.resource.as_str()
    }

    /// Returns the bare JID obtained by removing this JID’s resource.
    pub fn to_bare(&self) -> BareJid {
        BareJid {
            node: self.node.clone(),
            domain: self.domain.clone(),
        }
    }

    /// Consumes this JID to produce the bare JID obtained by removing its
    /// resource.
    pub fn into_bare(self) -> BareJid {
        BareJid {
            node: self.node,
            domain: self.domain,
        }
    }
}

impl FromStr for FullJid {
    type Err = Error;

    fn from_str(s: &str) -> Result<FullJid, Error> {
        let (node, domain, resource) = split_jid(s)?;
        let resource = resource.ok_or(Error::ResourceEmpty)?;
        FullJid::from_parts(node, domain, resource)
    }
}

impl TryFrom<String> for FullJid {
    type Error = Error;

    fn try_from(s: String) -> Result<FullJid, Error> {
        s.parse()
    }
}

impl fmt::Display for FullJid {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        if let Some(ref node) = self.node {
            write!(fmt, "{}@", node)?;
        }
        write!(fmt, "{}/{}", self.domain, self.resource)
    }
}

impl From<FullJid> for Jid {
    fn from(jid: FullJid) -> Jid {
        Jid::Full(jid)
    }
}

impl TryFrom<Jid> for FullJid {
    type Error = Error;

    fn try_from(jid: Jid) -> Result<FullJid, Error> {
        match jid {
            Jid::Full(jid) => Ok(jid),
            Jid::Bare(_) => Err(Error::ResourceEmpty),
        }
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for FullJid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for FullJid {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<FullJid, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
