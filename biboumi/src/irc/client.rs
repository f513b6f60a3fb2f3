//! Per-(user, server) IRC connection state machine (spec.md §4.7).
//!
//! [`IrcClient`] is pure state plus a synchronous `handle_line` dispatcher;
//! the actual socket I/O lives in [`crate::irc::connection`]. Keeping the
//! protocol logic free of `async`/sockets makes it possible to unit test
//! registration, ISUPPORT parsing, and mode application directly against
//! wire-format strings.

use std::collections::HashMap;
use std::time::Instant;

use super::channel::{ChannelSnapshot, IrcChannel, IrcUser};
use super::ctcp::Ctcp;
use super::event::IrcEvent;
use super::isupport::ISupport;
use super::message::IrcMessage;

/// A (port, use_tls) candidate, tried in order (spec.md §4.7 "Connection
/// plan").
pub type ConnectCandidate = (u16, bool);

/// Per-server connection options (subset of `irc_server_options`, spec.md
/// §6 "Persisted state").
#[derive(Debug, Clone)]
pub struct IrcClientOptions {
    pub nick: String,
    pub username: String,
    pub realname: String,
    pub pass: Option<String>,
    pub ports: Vec<ConnectCandidate>,
    pub throttle_limit: u32,
    pub after_connection_commands: Vec<String>,
    /// Whether a TLS connection requires a fully valid certificate chain
    /// (spec.md §4.4 "TLS"). When `false`, any certificate is accepted.
    pub verify_cert: bool,
    /// A SHA-1 fingerprint trusted as an alternative to chain validation
    /// (spec.md §4.4 "(b)").
    pub trusted_fingerprint: Option<String>,
    /// Charset inbound IRC bytes are decoded from (spec.md §1
    /// `to_utf8(bytes, charset)`; SPEC_FULL.md "Encoding conversion").
    pub encoding_in: String,
    /// Charset outbound lines are encoded as.
    pub encoding_out: String,
}

impl Default for IrcClientOptions {
    fn default() -> Self {
        IrcClientOptions {
            nick: "biboumi-user".to_owned(),
            username: "biboumi".to_owned(),
            realname: "biboumi".to_owned(),
            pass: None,
            ports: vec![(6667, false), (6670, true), (6697, true)],
            throttle_limit: 10,
            after_connection_commands: Vec::new(),
            verify_cert: true,
            trusted_fingerprint: None,
            encoding_in: "UTF-8".to_owned(),
            encoding_out: "UTF-8".to_owned(),
        }
    }
}

/// Case-folds an IRC name the simple ASCII-lowercase way (biboumi's
/// channel map key). A fuller implementation would honor the server's
/// advertised `CASEMAPPING`; ASCII case-folding is what every modern
/// network actually uses in practice.
pub fn casefold(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// The state machine for one `(user, IRC server)` connection.
pub struct IrcClient {
    pub hostname: String,
    pub options: IrcClientOptions,
    pub current_nick: String,
    pub welcomed: bool,
    pub isupport: ISupport,
    pub channels: HashMap<String, IrcChannel>,
    pub pending_joins: Vec<(String, Option<String>)>,
    pub connect_time: Instant,
    next_port_candidate: usize,
}

impl IrcClient {
    /// A freshly-created client, not yet connected.
    pub fn new(hostname: &str, options: IrcClientOptions) -> IrcClient {
        IrcClient {
            hostname: hostname.to_owned(),
            current_nick: options.nick.clone(),
            options,
            welcomed: false,
            isupport: ISupport::default(),
            channels: HashMap::new(),
            pending_joins: Vec::new(),
            connect_time: Instant::now(),
            next_port_candidate: 0,
        }
    }

    /// Pops the next `(port, tls)` candidate to try connecting to, or
    /// `None` once the stack is exhausted.
    pub fn next_candidate(&mut self) -> Option<ConnectCandidate> {
        let candidate = self.options.ports.get(self.next_port_candidate).copied();
        self.next_port_candidate += 1;
        candidate
    }

    /// Resets the candidate stack (used after a full registration, so a
    /// future reconnect starts from the top again).
    pub fn reset_candidates(&mut self) {
        self.next_port_candidate = 0;
    }

    /// The lines to send right after the TCP (and, if any, TLS) handshake
    /// completes, to register with the server.
    pub fn registration_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(pass) = &self.options.pass {
            lines.push(IrcMessage::new("PASS", vec![pass.clone()]).to_line());
        }
        lines.push(IrcMessage::new("NICK", vec![self.options.nick.clone()]).to_line());
        lines.push(
            IrcMessage::new(
                "USER",
                vec![
                    self.options.username.clone(),
                    "ignored".to_owned(),
                    "ignored".to_owned(),
                    self.options.realname.clone(),
                ],
            )
            .to_line(),
        );
        lines
    }

    /// Queues a channel to `JOIN` once welcomed (or immediately if already
    /// welcomed, in which case the caller should send the line straight
    /// away instead of calling this).
    pub fn queue_join(&mut self, channel: &str, password: Option<String>) {
        self.pending_joins.push((channel.to_owned(), password));
    }

    /// A read-only snapshot of one channel's current roster/topic, for a
    /// bridge resource that just joined an already-joined channel.
    pub fn channel_snapshot(&self, name: &str) -> Option<ChannelSnapshot> {
        self.channels.get(&casefold(name)).map(ChannelSnapshot::from)
    }

    /// Every channel currently considered joined (`RPL_ENDOFNAMES` seen).
    pub fn joined_channel_names(&self) -> Vec<String> {
        self.channels
            .values()
            .filter(|c| c.joined)
            .map(|c| c.name.clone())
            .collect()
    }

    /// Drains the queued joins as wire lines, clearing the queue.
    pub fn drain_pending_joins(&mut self) -> Vec<String> {
        self.pending_joins
            .drain(..)
            .map(|(chan, pass)| match pass {
                Some(pass) => IrcMessage::new("JOIN", vec![chan, pass]).to_line(),
                None => IrcMessage::new("JOIN", vec![chan]).to_line(),
            })
            .collect()
    }

    /// Parses and applies one incoming wire line, returning the
    /// higher-level events it produced.
    pub fn handle_line(&mut self, line: &str) -> Vec<IrcEvent> {
        let Some(msg) = IrcMessage::parse(line) else {
            return Vec::new();
        };

        match msg.command.as_str() {
            "001" => self.handle_welcome(&msg),
            "005" => {
                self.isupport.apply_numeric_005(&msg.args[1.min(msg.args.len())..]);
                Vec::new()
            }
            "332" => self.handle_topic_numeric(&msg),
            "333" => self.handle_topic_who_time(&msg),
            "353" => self.handle_names(&msg),
            "366" => self.handle_end_of_names(&msg),
            "JOIN" => self.handle_join(&msg),
            "PART" => self.handle_part(&msg),
            "QUIT" => self.handle_quit(&msg),
            "KICK" => self.handle_kick(&msg),
            "NICK" => self.handle_nick(&msg),
            "MODE" => self.handle_mode(&msg),
            "TOPIC" => self.handle_topic_command(&msg),
            "PRIVMSG" => self.handle_privmsg(&msg),
            "NOTICE" => self.handle_notice(&msg),
            "INVITE" => self.handle_invite(&msg),
            "PING" => Vec::new(), // PONG is sent directly by the connection loop
            "433" => self.handle_nick_error(&msg, "nickname in use"),
            "432" => self.handle_nick_error(&msg, "erroneous nickname"),
            "438" => self.handle_nick_error(&msg, "changing nicks too fast"),
            _ => Vec::new(),
        }
    }

    fn handle_welcome(&mut self, msg: &IrcMessage) -> Vec<IrcEvent> {
        if let Some(nick) = msg.args.first() {
            self.current_nick = nick.clone();
        }
        self.welcomed = true;
        self.reset_candidates();
        vec![IrcEvent::Welcomed {
            nick: self.current_nick.clone(),
        }]
    }

    fn handle_join(&mut self, msg: &IrcMessage) -> Vec<IrcEvent> {
        let Some(nick) = msg.prefix_nick() else {
            return Vec::new();
        };
        let Some(chan_name) = msg.args.first() else {
            return Vec::new();
        };
        let key = casefold(chan_name);
        let is_self = nick == self.current_nick;
        let channel = self.channels.entry(key).or_insert_with(|| IrcChannel::new(chan_name));

        if is_self {
            channel.set_self(nick);
            channel.parting = false;
            vec![IrcEvent::SelfJoined {
                channel: chan_name.clone(),
            }]
        } else {
            let host = msg.prefix.as_ref().and_then(|p| p.split_once('!')).map(|(_, h)| h.to_owned());
            if channel.user(nick).is_none() {
                let mut user = IrcUser::new(nick);
                user.host = host.clone();
                channel.users.push(user);
            }
            vec![IrcEvent::UserJoined {
                channel: chan_name.clone(),
                nick: nick.to_owned(),
                host,
            }]
        }
    }

    fn handle_part(&mut self, msg: &IrcMessage) -> Vec<IrcEvent> {
        let Some(nick) = msg.prefix_nick() else {
            return Vec::new();
        };
        let Some(chan_name) = msg.args.first() else {
            return Vec::new();
        };
        let message = msg.args.get(1).cloned();
        let key = casefold(chan_name);
        if let Some(channel) = self.channels.get_mut(&key) {
            channel.remove_user(nick);
            if nick == self.current_nick {
                self.channels.remove(&key);
            }
        }
        vec![IrcEvent::Part {
            channel: chan_name.clone(),
            nick: nick.to_owned(),
            message,
        }]
    }

    fn handle_quit(&mut self, msg: &IrcMessage) -> Vec<IrcEvent> {
        let Some(nick) = msg.prefix_nick() else {
            return Vec::new();
        };
        let message = msg.args.first().cloned();
        let mut channels = Vec::new();
        for (_, channel) in self.channels.iter_mut() {
            if channel.remove_user(nick).is_some() {
                channels.push(channel.name.clone());
            }
        }
        vec![IrcEvent::Quit {
            nick: nick.to_owned(),
            channels,
            message,
        }]
    }

    fn handle_kick(&mut self, msg: &IrcMessage) -> Vec<IrcEvent> {
        let Some(by) = msg.prefix_nick() else {
            return Vec::new();
        };
        let (Some(chan_name), Some(target)) = (msg.args.first(), msg.args.get(1)) else {
            return Vec::new();
        };
        let reason = msg.args.get(2).cloned();
        let key = casefold(chan_name);
        let is_self_kicked = target == &self.current_nick;
        if let Some(channel) = self.channels.get_mut(&key) {
            channel.remove_user(target);
        }
        if is_self_kicked {
            self.channels.remove(&key);
        }
        vec![IrcEvent::Kick {
            channel: chan_name.clone(),
            target: target.clone(),
            by: by.to_owned(),
            reason,
        }]
    }

    fn handle_nick(&mut self, msg: &IrcMessage) -> Vec<IrcEvent> {
        let Some(old_nick) = msg.prefix_nick() else {
            return Vec::new();
        };
        let Some(new_nick) = msg.args.first() else {
            return Vec::new();
        };
        let mut channels = Vec::new();
        for (_, channel) in self.channels.iter_mut() {
            if channel.user(old_nick).is_some() {
                channel.rename_user(old_nick, new_nick);
                channels.push(channel.name.clone());
            }
        }
        if old_nick == self.current_nick {
            self.current_nick = new_nick.clone();
        }
        vec![IrcEvent::NickChange {
            old_nick: old_nick.to_owned(),
            new_nick: new_nick.clone(),
            channels,
        }]
    }

    fn handle_mode(&mut self, msg: &IrcMessage) -> Vec<IrcEvent> {
        let Some(by) = msg.prefix_nick().map(str::to_owned).or_else(|| msg.prefix.clone()) else {
            return Vec::new();
        };
        let Some(target) = msg.args.first() else {
            return Vec::new();
        };
        let Some(modestring) = msg.args.get(1) else {
            return Vec::new();
        };
        let args: Vec<String> = msg.args.get(2..).map(|s| s.to_vec()).unwrap_or_default();
        let key = casefold(target);
        let changed_nicks = if let Some(channel) = self.channels.get_mut(&key) {
            self.isupport.apply_channel_modes(channel, modestring, &args)
        } else {
            Vec::new()
        };
        vec![IrcEvent::ModeChange {
            target: target.clone(),
            by,
            modestring: modestring.clone(),
            args,
            changed_nicks,
        }]
    }

    fn handle_topic_numeric(&mut self, msg: &IrcMessage) -> Vec<IrcEvent> {
        let (Some(chan_name), Some(topic)) = (msg.args.get(1), msg.args.get(2)) else {
            return Vec::new();
        };
        let key = casefold(chan_name);
        let entry = self.channels.entry(key).or_insert_with(|| IrcChannel::new(chan_name));
        entry.topic = Some(topic.clone());
        vec![IrcEvent::Topic {
            channel: chan_name.clone(),
            topic: Some(topic.clone()),
            author: entry.topic_author.clone(),
        }]
    }

    fn handle_topic_who_time(&mut self, msg: &IrcMessage) -> Vec<IrcEvent> {
        let (Some(chan_name), Some(who)) = (msg.args.get(1), msg.args.get(2)) else {
            return Vec::new();
        };
        let key = casefold(chan_name);
        if let Some(channel) = self.channels.get_mut(&key) {
            channel.topic_author = Some(who.split('!').next().unwrap_or(who).to_owned());
        }
        Vec::new()
    }

    fn handle_topic_command(&mut self, msg: &IrcMessage) -> Vec<IrcEvent> {
        let Some(author) = msg.prefix_nick() else {
            return Vec::new();
        };
        let Some(chan_name) = msg.args.first() else {
            return Vec::new();
        };
        let topic = msg.args.get(1).cloned();
        let key = casefold(chan_name);
        let entry = self.channels.entry(key).or_insert_with(|| IrcChannel::new(chan_name));
        entry.topic = topic.clone();
        entry.topic_author = Some(author.to_owned());
        vec![IrcEvent::Topic {
            channel: chan_name.clone(),
            topic,
            author: Some(author.to_owned()),
        }]
    }

    fn handle_names(&mut self, msg: &IrcMessage) -> Vec<IrcEvent> {
        let (Some(chan_name), Some(names)) = (msg.args.get(2), msg.args.get(3)) else {
            return Vec::new();
        };
        let key = casefold(chan_name);
        let channel = self.channels.entry(key).or_insert_with(|| IrcChannel::new(chan_name));
        for token in names.split_whitespace() {
            let mut chars = token.chars();
            let mut modes = Vec::new();
            let mut rest = token;
            while let Some(c) = chars.clone().next() {
                if let Some(mode) = self.isupport.mode_for_prefix(c) {
                    modes.push(mode);
                    chars.next();
                    rest = chars.as_str();
                } else {
                    break;
                }
            }
            if rest.is_empty() {
                continue;
            }
            let is_self = rest == self.current_nick;
            if let Some(existing) = channel.user_mut(rest) {
                existing.modes.extend(modes.iter().copied());
            } else {
                let mut user = IrcUser::new(rest);
                user.modes.extend(modes);
                channel.users.push(user);
            }
            if is_self {
                channel.set_self(rest);
            }
        }
        Vec::new()
    }

    fn handle_end_of_names(&mut self, msg: &IrcMessage) -> Vec<IrcEvent> {
        let Some(chan_name) = msg.args.get(1) else {
            return Vec::new();
        };
        let key = casefold(chan_name);
        if let Some(channel) = self.channels.get_mut(&key) {
            channel.joined = true;
        }
        vec![IrcEvent::EndOfNames {
            channel: chan_name.clone(),
        }]
    }

    fn handle_privmsg(&mut self, msg: &IrcMessage) -> Vec<IrcEvent> {
        let Some(from) = msg.prefix_nick() else {
            return Vec::new();
        };
        let (Some(target), Some(body)) = (msg.args.first(), msg.args.get(1)) else {
            return Vec::new();
        };
        if let Some(ctcp) = Ctcp::parse(body) {
            let is_channel = self.channels.contains_key(&casefold(target));
            return vec![IrcEvent::CtcpRequest {
                from: from.to_owned(),
                target: is_channel.then(|| target.clone()),
                ctcp,
            }];
        }
        if self.channels.contains_key(&casefold(target)) {
            vec![IrcEvent::ChannelMessage {
                channel: target.clone(),
                from: from.to_owned(),
                body: body.clone(),
            }]
        } else {
            vec![IrcEvent::PrivateMessage {
                from: from.to_owned(),
                body: body.clone(),
            }]
        }
    }

    fn handle_notice(&mut self, msg: &IrcMessage) -> Vec<IrcEvent> {
        let Some(from) = msg.prefix_nick() else {
            return Vec::new();
        };
        let (Some(target), Some(body)) = (msg.args.first(), msg.args.get(1)) else {
            return Vec::new();
        };
        if self.channels.contains_key(&casefold(target)) {
            vec![IrcEvent::ChannelNotice {
                channel: target.clone(),
                from: from.to_owned(),
                body: body.clone(),
            }]
        } else {
            vec![IrcEvent::PrivateNotice {
                from: from.to_owned(),
                body: body.clone(),
            }]
        }
    }

    fn handle_invite(&mut self, msg: &IrcMessage) -> Vec<IrcEvent> {
        let Some(from) = msg.prefix_nick() else {
            return Vec::new();
        };
        let Some(chan_name) = msg.args.get(1) else {
            return Vec::new();
        };
        vec![IrcEvent::Invite {
            channel: chan_name.clone(),
            from: from.to_owned(),
        }]
    }

    fn handle_nick_error(&mut self, msg: &IrcMessage, reason: &str) -> Vec<IrcEvent> {
        let attempted_nick = msg.args.get(1).cloned().unwrap_or_default();
        vec![IrcEvent::NickError {
            attempted_nick,
            reason: reason.to_owned(),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> IrcClient {
        IrcClient::new("irc.example.org", IrcClientOptions::default())
    }

    #[test]
    fn welcome_numeric_sets_current_nick_and_welcomed() {
        let mut client = client();
        let events = client.handle_line(":irc.example.org 001 actual_nick :Welcome");
        assert!(client.welcomed);
        assert_eq!(client.current_nick, "actual_nick");
        assert_eq!(
            events,
            vec![IrcEvent::Welcomed {
                nick: "actual_nick".to_owned()
            }]
        );
    }

    #[test]
    fn full_join_sequence_marks_channel_joined() {
        let mut client = client();
        client.handle_line(":irc.example.org 001 nick :hi");
        client.handle_line(":nick!user@host JOIN #chan");
        client.handle_line(":irc.example.org 353 nick = #chan :nick @alice +bob");
        client.handle_line(":irc.example.org 366 nick #chan :End of names");
        let chan = client.channels.get("#chan").unwrap();
        assert!(chan.joined);
        assert!(chan.self_user().is_some());
        assert_eq!(chan.users.len(), 3);
    }

    #[test]
    fn names_reply_assigns_prefix_modes() {
        let mut client = client();
        client.isupport.apply_numeric_005(&["PREFIX=(ov)@+".to_owned()]);
        client.handle_line(":irc.example.org 001 nick :hi");
        client.handle_line(":irc.example.org 353 nick = #chan :@alice +bob carl");
        let chan = client.channels.get("#chan").unwrap();
        assert!(chan.user("alice").unwrap().modes.contains(&'o'));
        assert!(chan.user("bob").unwrap().modes.contains(&'v'));
        assert!(chan.user("carl").unwrap().modes.is_empty());
    }

    #[test]
    fn part_removes_user_and_drops_self_channel() {
        let mut client = client();
        client.handle_line(":irc.example.org 001 nick :hi");
        client.handle_line(":nick!u@h JOIN #chan");
        client.handle_line(":nick!u@h PART #chan :bye");
        assert!(!client.channels.contains_key("#chan"));
    }

    #[test]
    fn quit_clears_user_from_every_channel() {
        let mut client = client();
        client.handle_line(":irc.example.org 001 nick :hi");
        client.handle_line(":nick!u@h JOIN #chan1");
        client.handle_line(":nick!u@h JOIN #chan2");
        client.handle_line(":alice!a@h JOIN #chan1");
        client.handle_line(":alice!a@h JOIN #chan2");
        let events = client.handle_line(":alice!a@h QUIT :gone");
        assert_eq!(
            events,
            vec![IrcEvent::Quit {
                nick: "alice".to_owned(),
                channels: vec!["#chan1".to_owned(), "#chan2".to_owned()],
                message: Some("gone".to_owned()),
            }]
        );
    }

    #[test]
    fn nick_numerics_map_to_errors() {
        let mut client = client();
        let events = client.handle_line(":irc.example.org 433 * wantednick :Nickname is already in use.");
        assert_eq!(
            events,
            vec![IrcEvent::NickError {
                attempted_nick: "wantednick".to_owned(),
                reason: "nickname in use".to_owned(),
            }]
        );
    }

    #[test]
    fn connection_plan_falls_back_through_ports() {
        let mut client = client();
        assert_eq!(client.next_candidate(), Some((6667, false)));
        assert_eq!(client.next_candidate(), Some((6670, true)));
        assert_eq!(client.next_candidate(), Some((6697, true)));
        assert_eq!(client.next_candidate(), None);
    }

    #[test]
    fn registration_lines_include_pass_nick_user() {
        let mut options = IrcClientOptions::default();
        options.pass = Some("serverpass".to_owned());
        let client = IrcClient::new("irc.example.org", options);
        let lines = client.registration_lines();
        assert_eq!(lines[0], "PASS serverpass");
        assert_eq!(lines[1], "NICK biboumi-user");
        assert_eq!(lines[2], "USER biboumi ignored ignored biboumi");
    }
}
