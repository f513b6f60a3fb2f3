//! `IrcChannel` / `IrcUser` (spec.md §3 data model).

use std::collections::BTreeSet;

/// A user as seen inside one [`IrcChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcUser {
    /// The nickname, as currently known.
    pub nick: String,
    /// `user@host`, if known (from a `JOIN`/WHO reply).
    pub host: Option<String>,
    /// The set of channel modes this user currently holds (`o`, `v`, ...).
    pub modes: BTreeSet<char>,
    /// Whether this entry is the bridge's own IRC identity in the channel.
    pub is_self: bool,
}

impl IrcUser {
    /// A freshly-seen user with no modes yet.
    pub fn new(nick: &str) -> IrcUser {
        IrcUser {
            nick: nick.to_owned(),
            host: None,
            modes: BTreeSet::new(),
            is_self: false,
        }
    }
}

/// One IRC channel as tracked by a single [`crate::irc::client::IrcClient`].
#[derive(Debug, Clone)]
pub struct IrcChannel {
    /// Case-folded channel name (with sigil).
    pub name: String,
    /// True once `RPL_ENDOFNAMES` (366) has been received for this join.
    pub joined: bool,
    /// True once a `PART` has been requested but not yet confirmed by the
    /// self-referential `PART` echo.
    pub parting: bool,
    /// The last known topic text.
    pub topic: Option<String>,
    /// Who set the current topic, if known.
    pub topic_author: Option<String>,
    /// The full roster, including the bridge's own entry.
    pub users: Vec<IrcUser>,
    /// Whether this channel should remain joined even with zero resources
    /// attached (spec.md §4.8 "Resource tracking").
    pub persistent: bool,
}

impl IrcChannel {
    /// A freshly-created, not-yet-joined channel entry.
    pub fn new(name: &str) -> IrcChannel {
        IrcChannel {
            name: name.to_owned(),
            joined: false,
            parting: false,
            topic: None,
            topic_author: None,
            users: Vec::new(),
            persistent: false,
        }
    }

    /// The roster entry marked `is_self`, if any.
    pub fn self_user(&self) -> Option<&IrcUser> {
        self.users.iter().find(|u| u.is_self)
    }

    /// Marks `nick` as the self entry (adding it if absent), clearing any
    /// previous self marker (invariant: exactly one `is_self` entry).
    pub fn set_self(&mut self, nick: &str) {
        for user in &mut self.users {
            user.is_self = user.nick == nick;
        }
        if !self.users.iter().any(|u| u.nick == nick) {
            let mut user = IrcUser::new(nick);
            user.is_self = true;
            self.users.push(user);
        }
    }

    /// Looks up a user by nick.
    pub fn user(&self, nick: &str) -> Option<&IrcUser> {
        self.users.iter().find(|u| u.nick == nick)
    }

    /// Looks up a user by nick, mutably.
    pub fn user_mut(&mut self, nick: &str) -> Option<&mut IrcUser> {
        self.users.iter_mut().find(|u| u.nick == nick)
    }

    /// Removes a user by nick, returning it if present.
    pub fn remove_user(&mut self, nick: &str) -> Option<IrcUser> {
        let pos = self.users.iter().position(|u| u.nick == nick)?;
        Some(self.users.remove(pos))
    }

    /// Renames a user in place (used for `NICK`).
    pub fn rename_user(&mut self, old_nick: &str, new_nick: &str) {
        if let Some(user) = self.user_mut(old_nick) {
            user.nick = new_nick.to_owned();
        }
    }
}

/// A point-in-time copy of a channel's roster and topic, handed back
/// across the bridge/connection task boundary (spec.md §4.8 "Resource
/// tracking" — the "I'm here" sequence sent to a newly-joined resource
/// needs the existing participant list without touching IRC).
#[derive(Debug, Clone)]
pub struct ChannelSnapshot {
    pub users: Vec<IrcUser>,
    pub topic: Option<String>,
    pub topic_author: Option<String>,
}

impl From<&IrcChannel> for ChannelSnapshot {
    fn from(channel: &IrcChannel) -> Self {
        ChannelSnapshot {
            users: channel.users.clone(),
            topic: channel.topic.clone(),
            topic_author: channel.topic_author.clone(),
        }
    }
}
