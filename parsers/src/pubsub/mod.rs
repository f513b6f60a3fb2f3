// Copyright (c) 2017 Emmanuel Gil Peyrot <linkmauve@linkmauve.fr>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Minimal identifiers from the `http://jabber.org/protocol/pubsub` family.
//!
//! [`crate::mam`] addresses archive queries by pubsub node name, even
//! though the full publish-subscribe protocol is otherwise unused here.

generate_id!(
    /// The name of a PubSub node, used to identify it on a JID.
    NodeName
);
