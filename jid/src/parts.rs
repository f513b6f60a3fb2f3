// Copyright (c) 2017 Maxime “pep” Buquet <pep@bouah.net>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::fmt;
use std::str::FromStr;

use memchr::memchr;
use stringprep::{nameprep, nodeprep, resourceprep};

use crate::Error;

/// The localpart of a JID, the part before the (optional) @.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodePart(pub(crate) String);

impl NodePart {
    /// Construct a nodepart from a string, performing the `nodeprep`
    /// stringprep profile on it.
    pub fn new(s: &str) -> Result<NodePart, Error> {
        if s.is_empty() {
            return Err(Error::NodeEmpty);
        }
        let node = nodeprep(s).map_err(|_| Error::NodeOrResourceInvalid)?;
        if node.is_empty() {
            return Err(Error::NodeEmpty);
        }
        Ok(NodePart(node.into_owned()))
    }

    /// The string representation of this nodepart.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for NodePart {
    type Err = Error;

    fn from_str(s: &str) -> Result<NodePart, Error> {
        NodePart::new(s)
    }
}

impl fmt::Display for NodePart {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

/// The domain of a JID, the mandatory part of any JID.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DomainPart(pub(crate) String);

impl DomainPart {
    /// Construct a domainpart from a string, performing the `nameprep`
    /// stringprep profile on it.
    ///
    /// IP literals and raw IP addresses are passed through unchanged, as
    /// `nameprep` doesn’t apply to them.
    pub fn new(s: &str) -> Result<DomainPart, Error> {
        if s.is_empty() {
            return Err(Error::DomainEmpty);
        }
        if s.starts_with('[') && s.ends_with(']') {
            return Ok(DomainPart(s.to_owned()));
        }
        if s.parse::<std::net::IpAddr>().is_ok() {
            return Ok(DomainPart(s.to_owned()));
        }
        let domain = nameprep(s).map_err(|_| Error::DomainInvalid)?;
        if domain.is_empty() {
            return Err(Error::DomainEmpty);
        }
        Ok(DomainPart(domain.into_owned()))
    }

    /// The string representation of this domainpart.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for DomainPart {
    type Err = Error;

    fn from_str(s: &str) -> Result<DomainPart, Error> {
        DomainPart::new(s)
    }
}

impl fmt::Display for DomainPart {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

/// The resource of a JID, the part after the (optional) /.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourcePart(pub(crate) String);

impl ResourcePart {
    /// Construct a resourcepart from a string, performing the
    /// `resourceprep` stringprep profile on it.
    pub fn new(s: &str) -> Result<ResourcePart, Error> {
        if s.is_empty() {
            return Err(Error::ResourceEmpty);
        }
        let resource = resourceprep(s).map_err(|_| Error::NodeOrResourceInvalid)?;
        if resource.is_empty() {
            return Err(Error::ResourceEmpty);
        }
        Ok(ResourcePart(resource.into_owned()))
    }

    /// The string representation of this resourcepart.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ResourcePart {
    type Err = Error;

    fn from_str(s: &str) -> Result<ResourcePart, Error> {
        ResourcePart::new(s)
    }
}

impl fmt::Display for ResourcePart {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

/// Splits a string into its node, domain and resource parts, none of which
/// are stringprep’d or validated yet.
pub(crate) fn split_jid(s: &str) -> Result<(Option<&str>, &str, Option<&str>), Error> {
    let at = memchr(b'@', s.as_bytes());
    let slash = memchr(b'/', s.as_bytes());

    // The @ must come before the / if both are present.
    let at = match (at, slash) {
        (Some(at), Some(slash)) if at > slash => None,
        (at, _) => at,
    };

    let (node, rest) = match at {
        Some(idx) => {
            if idx == 0 {
                return Err(Error::NodeEmptyWithAt);
            }
            (Some(&s[..idx]), &s[idx + 1..])
        }
        None => (None, s),
    };

    let slash = memchr(b'/', rest.as_bytes());
    let (domain, resource) = match slash {
        Some(idx) => {
            if idx == rest.len() - 1 {
                return Err(Error::ResourceEmptyWithSlash);
            }
            (&rest[..idx], Some(&rest[idx + 1..]))
        }
        None => (rest, None),
    };

    if domain.is_empty() {
        return Err(Error::NoDomain);
    }

    Ok((node, domain, resource))
}
