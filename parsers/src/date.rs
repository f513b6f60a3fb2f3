// Copyright (c) 2017 Emmanuel Gil Peyrot <linkmauve@linkmauve.fr>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! XEP-0082: XMPP Date and Time Profiles.

use alloc::string::String;
use core::fmt;
use core::str::FromStr;

use chrono::{DateTime as ChronoDateTime, FixedOffset, SecondsFormat};

use xso::{error::Error, AsXmlText, FromXmlText};

/// A wrapper around [`chrono::DateTime<FixedOffset>`] implementing the
/// profile of ISO 8601 mandated by XEP-0082, used as the `stamp` attribute
/// of [`crate::delay::Delay`] and in MAM results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DateTime(pub ChronoDateTime<FixedOffset>);

impl From<ChronoDateTime<FixedOffset>> for DateTime {
    fn from(dt: ChronoDateTime<FixedOffset>) -> DateTime {
        DateTime(dt)
    }
}

impl From<DateTime> for ChronoDateTime<FixedOffset> {
    fn from(dt: DateTime) -> ChronoDateTime<FixedOffset> {
        dt.0
    }
}

impl FromStr for DateTime {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<DateTime, chrono::ParseError> {
        ChronoDateTime::parse_from_rfc3339(s).map(DateTime)
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        // XEP-0082 mandates a literal 'Z' for UTC rather than the +00:00
        // offset chrono writes by default.
        write!(
            fmt,
            "{}",
            self.0.to_rfc3339_opts(SecondsFormat::Micros, true)
        )
    }
}

impl FromXmlText for DateTime {
    fn from_xml_text(s: String) -> Result<Self, Error> {
        s.parse().map_err(Error::text_parse_error)
    }
}

impl AsXmlText for DateTime {
    fn as_xml_text(&self) -> Result<std::borrow::Cow<'_, str>, Error> {
        Ok(std::borrow::Cow::Owned(self.to_string()))
    }
}
