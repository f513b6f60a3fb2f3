// Copyright (c) 2017 Maxime “pep” Buquet <pep@bouah.net>
// Copyright (c) 2017 Emmanuel Gil Peyrot <linkmauve@linkmauve.fr>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/// XEP-0045: Multi-User Chat, join request and history negotiation.
pub mod muc;

/// XEP-0045: Multi-User Chat, user item and status codes.
pub mod user;

pub use self::muc::{History, Muc};
pub use self::user::MucUser;
