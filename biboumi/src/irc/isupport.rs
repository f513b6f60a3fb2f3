//! ISUPPORT (numeric 005) parsing and channel-mode classification
//! (spec.md §4.7 "ISUPPORT parsing", "Mode application").

use std::collections::BTreeSet;

use super::channel::IrcChannel;

/// The four CHANMODES classes (A, B, C, D).
#[derive(Debug, Clone, Default)]
pub struct ChanModes {
    /// Always takes an argument (ban/except/invite-exempt lists).
    pub a: BTreeSet<char>,
    /// Always takes an argument; if also a PREFIX letter it is a
    /// per-user-per-channel mode (e.g. `o`, `v`).
    pub b: BTreeSet<char>,
    /// Takes an argument only when being set.
    pub c: BTreeSet<char>,
    /// Never takes an argument.
    pub d: BTreeSet<char>,
}

impl ChanModes {
    fn parse(value: &str) -> ChanModes {
        let mut groups = value.split(',');
        let mut next = || groups.next().unwrap_or("").chars().collect::<BTreeSet<char>>();
        ChanModes {
            a: next(),
            b: next(),
            c: next(),
            d: next(),
        }
    }
}

/// Parsed ISUPPORT state for one IRC server connection.
#[derive(Debug, Clone)]
pub struct ISupport {
    /// `CHANTYPES`, default `{#, &}`.
    pub chantypes: BTreeSet<char>,
    /// `CHANMODES=A,B,C,D`.
    pub chanmodes: ChanModes,
    /// Ordered prefix-char -> mode-char map, most significant first.
    pub sorted_user_modes: Vec<(char, char)>,
}

impl Default for ISupport {
    fn default() -> Self {
        ISupport {
            chantypes: crate::iid::Iid::default_chantypes(),
            chanmodes: ChanModes::default(),
            sorted_user_modes: Vec::new(),
        }
    }
}

impl ISupport {
    /// Applies one 005 numeric's worth of `KEY=VALUE` tokens (the target
    /// and trailing description have already been stripped by the caller).
    pub fn apply_numeric_005(&mut self, tokens: &[String]) {
        for token in tokens {
            let Some((key, value)) = token.split_once('=') else {
                continue;
            };
            match key {
                "CHANMODES" => self.chanmodes = ChanModes::parse(value),
                "CHANTYPES" => self.chantypes = value.chars().collect(),
                "PREFIX" => {
                    if let Some((modes, prefixes)) = parse_prefix(value) {
                        self.sorted_user_modes = prefixes.into_iter().zip(modes).map(|(p, m)| (p, m)).collect();
                    }
                }
                _ => {}
            }
        }
    }

    /// Maps a PREFIX character to its mode character.
    pub fn mode_for_prefix(&self, prefix: char) -> Option<char> {
        self.sorted_user_modes
            .iter()
            .find(|(p, _)| *p == prefix)
            .map(|(_, m)| *m)
    }

    /// Maps a mode character to its PREFIX character.
    pub fn prefix_for_mode(&self, mode: char) -> Option<char> {
        self.sorted_user_modes
            .iter()
            .find(|(_, m)| *m == mode)
            .map(|(p, _)| *p)
    }

    /// Whether `mode` is a per-user channel mode (appears in PREFIX).
    pub fn is_user_mode(&self, mode: char) -> bool {
        self.sorted_user_modes.iter().any(|(_, m)| *m == mode)
    }

    /// Whether `mode` requires an argument when being *added*.
    fn takes_arg_on_add(&self, mode: char) -> bool {
        self.chanmodes.a.contains(&mode)
            || self.chanmodes.b.contains(&mode)
            || self.chanmodes.c.contains(&mode)
            || self.is_user_mode(mode)
    }

    /// Whether `mode` requires an argument when being *removed*.
    fn takes_arg_on_remove(&self, mode: char) -> bool {
        self.chanmodes.a.contains(&mode) || self.chanmodes.b.contains(&mode) || self.is_user_mode(mode)
    }

    /// Walks a MODE command's `modestring` + `args`, applying user-affecting
    /// changes to `channel` and returning the set of nicks whose role
    /// changed (one entry per modified user, regardless of how many letters
    /// touched them).
    pub fn apply_channel_modes(
        &self,
        channel: &mut IrcChannel,
        modestring: &str,
        args: &[String],
    ) -> Vec<String> {
        let mut add = true;
        let mut arg_iter = args.iter();
        let mut touched = Vec::new();

        for c in modestring.chars() {
            match c {
                '+' => add = true,
                '-' => add = false,
                _ => {
                    let needs_arg = if add {
                        self.takes_arg_on_add(c)
                    } else {
                        self.takes_arg_on_remove(c)
                    };
                    let arg = if needs_arg { arg_iter.next() } else { None };

                    if self.is_user_mode(c) {
                        if let Some(nick) = arg {
                            if let Some(user) = channel.user_mut(nick) {
                                if add {
                                    user.modes.insert(c);
                                } else {
                                    user.modes.remove(&c);
                                }
                                if !touched.contains(nick) {
                                    touched.push(nick.clone());
                                }
                            }
                        }
                    }
                }
            }
        }

        touched
    }
}

fn parse_prefix(value: &str) -> Option<(Vec<char>, Vec<char>)> {
    let value = value.strip_prefix('(')?;
    let (modes, prefixes) = value.split_once(')')?;
    Some((modes.chars().collect(), prefixes.chars().collect()))
}
