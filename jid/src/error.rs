// Copyright (c) 2017 Maxime “pep” Buquet <pep@bouah.net>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::error::Error as StdError;
use std::fmt;

/// An error that signifies that a `Jid` cannot be parsed from a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Happens when the node is empty, but should be `Some`.
    NodeEmpty,

    /// Happens when the domain is empty.
    DomainEmpty,

    /// Happens when the resource is empty, but should be `Some`.
    ResourceEmpty,

    /// Happens when there is no domain, this is probably because the given
    /// string was empty.
    NoDomain,

    /// Happens when the localpart is empty on a bare or full JID (example:
    /// `@example.com`).
    NodeEmptyWithAt,

    /// Happens when the resource is empty on a full JID (example:
    /// `example.com/`).
    ResourceEmptyWithSlash,

    /// Happens when parsing a bare JID, but a resource is present.
    ResourceInBareJid,

    /// Happens when the localpart or resource fails a stringprep-like
    /// normalisation, or contains characters forbidden in a JID.
    NodeOrResourceInvalid,

    /// Happens when the domain fails validation.
    DomainInvalid,
}

impl StdError for Error {}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Error::NodeEmpty => "nodepart empty despite the presence of a @",
            Error::DomainEmpty => "no domain found in this JID",
            Error::ResourceEmpty => "resourcepart empty despite the presence of a /",
            Error::NoDomain => "no domain found in this JID",
            Error::NodeEmptyWithAt => "nodepart empty despite the presence of a @",
            Error::ResourceEmptyWithSlash => "resourcepart empty despite the presence of a /",
            Error::ResourceInBareJid => "a resource was found while parsing a bare JID",
            Error::NodeOrResourceInvalid => "nodepart or resourcepart contains invalid characters",
            Error::DomainInvalid => "domain contains invalid characters",
        };
        fmt.write_str(s)
    }
}
