// Copyright (c) 2017 Maxime “pep” Buquet <pep@bouah.net>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::fmt;
use std::str::FromStr;

use crate::parts::{split_jid, DomainPart, NodePart};
use crate::{Error, FullJid, Jid, ResourcePart};

/// A bare JID, that is a JID without a resource, like `node@domain`, or
/// just `domain`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BareJid {
    pub(crate) node: Option<NodePart>,
    pub(crate) domain: DomainPart,
}

impl fmt::Debug for BareJid {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "BareJid({})", self)
    }
}

impl BareJid {
    /// Parses a bare JID from a string, such as `node@domain` or `domain`.
    pub fn new(s: &str) -> Result<BareJid, Error> {
        s.parse()
    }

    /// Constructs a bare JID from its already stringprep’d parts.
    pub(crate) fn from_parts(node: Option<&str>, domain: &str) -> Result<BareJid, Error> {
        Ok(BareJid {
            node: node.map(NodePart::new).transpose()?,
            domain: DomainPart::new(domain)?,
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

    /// Constructs a full JID using this bare JID as the basis, and the
    /// given resourcepart.
    pub fn with_resource(self, resource: &str) -> Result<FullJid, Error> {
        Ok(FullJid {
            node: self.node,
            domain: self.domain,
            resource: ResourcePart::new(resource)?,
        })
    }

    /// Constructs a full JID using this bare JID as the basis, and an
    /// already-parsed resourcepart.
    pub fn with_resource_str(self, resource: ResourcePart) -> FullJid {
        FullJid {
            node: self.node,
            domain: self.domain,
            resource,
        }
    }
}

impl FromStr for BareJid {
    type Err = Error;

    fn from_str(s: &str) -> Result<BareJid, Error> {
        let (node, domain, resource) = split_jid(s)?;
        if resource.is_some() {
            return Err(Error::ResourceInBareJid);
        }
        BareJid::from_parts(node, domain)
    }
}

impl TryFrom<String> for BareJid {
    type Error = Error;

    fn try_from(s: String) -> Result<BareJid, Error> {
        s.parse()
    }
}

impl fmt::Display for BareJid {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        if let Some(ref node) = self.node {
            write!(fmt, "{}@", node)?;
        }
        fmt.write_str(self.domain.as_str())
    }
}

impl From<BareJid> for Jid {
    fn from(jid: BareJid) -> Jid {
        Jid::Bare(jid)
    }
}

impl TryFrom<Jid> for BareJid {
    type Error = Error;

    fn try_from(jid: Jid) -> Result<BareJid, Error> {
        match jid {
            Jid::Bare(jid) => Ok(jid),
            Jid::Full(jid) => Ok(jid.into_bare()),
        }
    }
}

impl From<FullJid> for BareJid {
    fn from(full: FullJid) -> BareJid {
        full.into_bare()
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for BareJid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for BareJid {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<BareJid, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
