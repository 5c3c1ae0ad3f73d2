//! IRC command types.
//!
//! Type-safe representations of the IRC commands a bot sends and reacts to.
//! Commands outside that subset, and known commands with an unexpected
//! number of arguments, are kept verbatim in [`Command::Raw`].
//!
//! # Reference
//! - RFC 2812: Internet Relay Chat: Client Protocol

use std::fmt::{self, Write};

use crate::error::MessageParseError;
use crate::response::Response;

/// IRC command with its parameters.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Command {
    // === Connection Registration (RFC 2812 Section 3.1) ===
    /// `PASS password`
    PASS(String),
    /// `NICK nickname`
    NICK(String),
    /// `USER username mode realname`
    USER(String, String, String),
    /// `QUIT [message]`
    QUIT(Option<String>),

    // === Channel Operations (RFC 2812 Section 3.2) ===
    /// `JOIN channels [keys]`
    JOIN(String, Option<String>),
    /// `PART channels [message]`
    PART(String, Option<String>),
    /// `MODE target [modes and arguments]`
    MODE(String, Vec<String>),

    // === Messaging (RFC 2812 Section 3.3) ===
    /// `PRIVMSG target text`
    PRIVMSG(String, String),
    /// `NOTICE target text`
    NOTICE(String, String),

    // === User Queries (RFC 2812 Section 3.6) ===
    /// `WHOIS [target] mask`
    WHOIS(Option<String>, String),

    // === Miscellaneous (RFC 2812 Section 3.7) ===
    /// `PING server1 [server2]`
    PING(String, Option<String>),
    /// `PONG server1 [server2]`
    PONG(String, Option<String>),
    /// `ERROR message`
    ERROR(String),

    /// Numeric reply with its arguments.
    Response(Response, Vec<String>),
    /// Any other command, with its arguments.
    Raw(String, Vec<String>),
}

fn owned(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| (*s).to_owned()).collect()
}

impl Command {
    /// Parse a command from its name and arguments.
    #[must_use = "command parsing result should be handled"]
    pub fn new(cmd: &str, args: Vec<&str>) -> Result<Command, MessageParseError> {
        if cmd.is_empty() {
            return Err(MessageParseError::InvalidCommand);
        }

        let cmd_upper = cmd.to_ascii_uppercase();
        let command = match (cmd_upper.as_str(), args.as_slice()) {
            ("PASS", [p]) => Command::PASS((*p).to_owned()),
            ("NICK", [n, ..]) => Command::NICK((*n).to_owned()),
            ("USER", [u, m, _, r]) => {
                Command::USER((*u).to_owned(), (*m).to_owned(), (*r).to_owned())
            }
            ("QUIT", []) => Command::QUIT(None),
            ("QUIT", [m]) => Command::QUIT(Some((*m).to_owned())),
            ("JOIN", [c]) => Command::JOIN((*c).to_owned(), None),
            ("JOIN", [c, k]) => Command::JOIN((*c).to_owned(), Some((*k).to_owned())),
            ("PART", [c]) => Command::PART((*c).to_owned(), None),
            ("PART", [c, m]) => Command::PART((*c).to_owned(), Some((*m).to_owned())),
            ("MODE", [t, rest @ ..]) => Command::MODE((*t).to_owned(), owned(rest)),
            ("PRIVMSG", [t, m]) => Command::PRIVMSG((*t).to_owned(), (*m).to_owned()),
            ("NOTICE", [t, m]) => Command::NOTICE((*t).to_owned(), (*m).to_owned()),
            ("WHOIS", [m]) => Command::WHOIS(None, (*m).to_owned()),
            ("WHOIS", [t, m]) => Command::WHOIS(Some((*t).to_owned()), (*m).to_owned()),
            ("PING", [s]) => Command::PING((*s).to_owned(), None),
            ("PING", [s, t]) => Command::PING((*s).to_owned(), Some((*t).to_owned())),
            ("PONG", [s]) => Command::PONG((*s).to_owned(), None),
            ("PONG", [s, t]) => Command::PONG((*s).to_owned(), Some((*t).to_owned())),
            ("ERROR", [m]) => Command::ERROR((*m).to_owned()),
            _ => match cmd.parse::<Response>() {
                Ok(resp) => Command::Response(resp, owned(&args)),
                Err(_) => Command::Raw(cmd.to_owned(), owned(&args)),
            },
        };

        Ok(command)
    }

    /// The command word as sent on the wire (`"PRIVMSG"`, `"330"`, ...).
    pub fn name(&self) -> String {
        match self {
            Command::PASS(_) => "PASS".into(),
            Command::NICK(_) => "NICK".into(),
            Command::USER(..) => "USER".into(),
            Command::QUIT(_) => "QUIT".into(),
            Command::JOIN(..) => "JOIN".into(),
            Command::PART(..) => "PART".into(),
            Command::MODE(..) => "MODE".into(),
            Command::PRIVMSG(..) => "PRIVMSG".into(),
            Command::NOTICE(..) => "NOTICE".into(),
            Command::WHOIS(..) => "WHOIS".into(),
            Command::PING(..) => "PING".into(),
            Command::PONG(..) => "PONG".into(),
            Command::ERROR(_) => "ERROR".into(),
            Command::Response(resp, _) => resp.to_string(),
            Command::Raw(cmd, _) => cmd.clone(),
        }
    }

    /// The command's parameters in wire order, trailing parameter last.
    pub fn args(&self) -> Vec<&str> {
        match self {
            Command::PASS(p) => vec![p.as_str()],
            Command::NICK(n) => vec![n.as_str()],
            Command::USER(u, m, r) => vec![u.as_str(), m.as_str(), "*", r.as_str()],
            Command::QUIT(m) => m.iter().map(String::as_str).collect(),
            Command::JOIN(c, k) | Command::PART(c, k) => {
                std::iter::once(c.as_str()).chain(k.as_deref()).collect()
            }
            Command::MODE(t, rest) => std::iter::once(t.as_str())
                .chain(rest.iter().map(String::as_str))
                .collect(),
            Command::PRIVMSG(t, m) | Command::NOTICE(t, m) => vec![t.as_str(), m.as_str()],
            Command::WHOIS(t, m) => t.as_deref().into_iter().chain([m.as_str()]).collect(),
            Command::PING(s, t) | Command::PONG(s, t) => {
                std::iter::once(s.as_str()).chain(t.as_deref()).collect()
            }
            Command::ERROR(m) => vec![m.as_str()],
            Command::Response(_, args) | Command::Raw(_, args) => {
                args.iter().map(String::as_str).collect()
            }
        }
    }

    /// Commands whose last parameter is free text and always written with a colon.
    fn has_freeform_trailing(&self) -> bool {
        matches!(
            self,
            Command::USER(..)
                | Command::QUIT(Some(_))
                | Command::PART(_, Some(_))
                | Command::PRIVMSG(..)
                | Command::NOTICE(..)
                | Command::ERROR(_)
        )
    }
}

/// Whether a final argument must be sent as a `:`-prefixed trailing parameter.
pub(crate) fn needs_colon_prefix(arg: &str) -> bool {
    arg.is_empty() || arg.contains(' ') || arg.starts_with(':')
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())?;

        let args = self.args();
        let freeform = self.has_freeform_trailing();
        for (i, arg) in args.iter().enumerate() {
            f.write_char(' ')?;
            let is_last = i + 1 == args.len();
            if is_last && (freeform || needs_colon_prefix(arg)) {
                f.write_char(':')?;
            }
            f.write_str(arg)?;
        }

        Ok(())
    }
}
