//! IRC line framing: `[:prefix SP] command SP args* [SP :trailing]`
//! (spec.md §4.7 "Message framing", §6 "IRC client protocol").

use std::fmt;

/// A single parsed IRC line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessage {
    /// The optional `:prefix` (usually `nick!user@host` or a server name).
    pub prefix: Option<String>,
    /// The command name or three-digit numeric.
    pub command: String,
    /// Positional arguments, in order; the last one may have contained a
    /// space (it was the trailing argument on the wire).
    pub args: Vec<String>,
}

impl IrcMessage {
    /// Parses a single CRLF-stripped line.
    pub fn parse(line: &str) -> Option<IrcMessage> {
        let mut rest = line;
        let prefix = if let Some(stripped) = rest.strip_prefix(':') {
            let (prefix, remainder) = stripped.split_once(' ').unwrap_or((stripped, ""));
            rest = remainder.trim_start_matches(' ');
            Some(prefix.to_owned())
        } else {
            None
        };

        if rest.is_empty() {
            return None;
        }

        let mut args = Vec::new();
        let command;
        match rest.split_once(' ') {
            Some((cmd, remainder)) => {
                command = cmd.to_owned();
                rest = remainder;
                loop {
                    let rest_trimmed = rest.trim_start_matches(' ');
                    if rest_trimmed.is_empty() {
                        break;
                    }
                    if let Some(trailing) = rest_trimmed.strip_prefix(':') {
                        args.push(trailing.to_owned());
                        break;
                    }
                    match rest_trimmed.split_once(' ') {
                        Some((arg, remainder)) => {
                            args.push(arg.to_owned());
                            rest = remainder;
                        }
                        None => {
                            args.push(rest_trimmed.to_owned());
                            break;
                        }
                    }
                }
            }
            None => {
                command = rest.to_owned();
            }
        }

        Some(IrcMessage {
            prefix,
            command: command.to_uppercase(),
            args,
        })
    }

    /// Builds a new outgoing message with no prefix.
    pub fn new(command: &str, args: Vec<String>) -> IrcMessage {
        IrcMessage {
            prefix: None,
            command: command.to_owned(),
            args,
        }
    }

    /// The nick portion of `prefix`, if it looks like `nick!user@host`.
    pub fn prefix_nick(&self) -> Option<&str> {
        self.prefix.as_deref().and_then(|p| p.split('!').next())
    }

    /// Serializes this message as a CRLF-terminated wire line. An argument
    /// containing a space or starting with `:` becomes the trailing
    /// argument, and must be the last one (the caller is responsible for
    /// only putting such an argument last).
    pub fn to_line(&self) -> String {
        let mut line = String::new();
        if let Some(prefix) = &self.prefix {
            line.push(':');
            line.push_str(prefix);
            line.push(' ');
        }
        line.push_str(&self.command);
        for (i, arg) in self.args.iter().enumerate() {
            line.push(' ');
            let is_last = i + 1 == self.args.len();
            if is_last && (arg.contains(' ') || arg.starts_with(':') || arg.is_empty()) {
                line.push(':');
            }
            line.push_str(arg);
        }
        line
    }
}

impl fmt::Display for IrcMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_line())
    }
}

/// Splits a byte buffer on CRLF, returning the complete lines found and the
/// unconsumed tail (kept for the next read).
/// Splits CRLF-terminated lines off the front of `buffer`, returning each
/// line's raw bytes (charset conversion is the caller's job — spec.md §1
/// treats `to_utf8(bytes, charset)` as a pure function applied to exactly
/// this kind of raw line, per the configured `encoding_in`).
pub fn split_lines(buffer: &mut Vec<u8>) -> Vec<Vec<u8>> {
    let mut lines = Vec::new();
    loop {
        let pos = buffer.windows(2).position(|w| w == b"\r\n");
        match pos {
            Some(pos) => {
                let mut line: Vec<u8> = buffer.drain(..pos + 2).collect();
                line.truncate(line.len() - 2);
                lines.push(line);
            }
            None => break,
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_prefix_command_args_trailing() {
        let msg = IrcMessage {
            prefix: Some("nick!user@host".to_owned()),
            command: "PRIVMSG".to_owned(),
            args: vec!["#chan".to_owned(), "hello world".to_owned()],
        };
        let line = msg.to_line();
        assert_eq!(line, ":nick!user@host PRIVMSG #chan :hello world");
        let parsed = IrcMessage::parse(&line).unwrap();
        assert_eq!(parsed.prefix, msg.prefix);
        assert_eq!(parsed.command, msg.command);
        assert_eq!(parsed.args, msg.args);
    }

    #[test]
    fn parse_without_prefix_or_trailing() {
        let parsed = IrcMessage::parse("JOIN #chan").unwrap();
        assert_eq!(parsed.prefix, None);
        assert_eq!(parsed.command, "JOIN");
        assert_eq!(parsed.args, vec!["#chan".to_owned()]);
    }

    #[test]
    fn parse_numeric_with_multiple_middle_args() {
        let parsed = IrcMessage::parse(":irc.example.org 353 nick = #chan :alice bob").unwrap();
        assert_eq!(parsed.command, "353");
        assert_eq!(
            parsed.args,
            vec![
                "nick".to_owned(),
                "=".to_owned(),
                "#chan".to_owned(),
                "alice bob".to_owned()
            ]
        );
    }

    #[test]
    fn split_lines_keeps_unterminated_tail() {
        let mut buf = b"PING :a\r\nPING :b\r\nPAR".to_vec();
        let lines = split_lines(&mut buf);
        assert_eq!(lines, vec![b"PING :a".to_vec(), b"PING :b".to_vec()]);
        assert_eq!(buf, b"PAR");
    }

    #[test]
    fn prefix_nick_extraction() {
        let msg = IrcMessage::parse(":alice!~a@host PRIVMSG #c :hi").unwrap();
        assert_eq!(msg.prefix_nick(), Some("alice"));
    }
}
