//! # sdbot-proto
//!
//! The IRC client protocol subset spoken by sd-bot: owned message parsing
//! and serialization, numeric replies, and `tokio_util` codecs.
//!
//! ## Features
//!
//! - IRC message parsing with prefixes, commands, and parameters
//! - Typed commands for registration, keepalive, messaging and WHOIS;
//!   anything else is preserved as [`Command::Raw`]
//! - Typed numeric replies via [`Response`]
//! - Optional Tokio integration ([`LineCodec`], [`IrcCodec`])

#![deny(clippy::all)]
#![warn(missing_docs)]

//! ## Quick Start
//!
//! ```rust
//! use sdbot_proto::{Command, Message};
//!
//! let msg: Message = ":nick!user@host PRIVMSG #systemd :hello".parse().unwrap();
//! assert_eq!(msg.source_nickname(), Some("nick"));
//! assert!(matches!(msg.command, Command::PRIVMSG(_, _)));
//!
//! let reply = Message::notice("nick", "Added user successfully");
//! assert_eq!(reply.to_string(), "NOTICE nick :Added user successfully");
//! ```

pub mod casemap;
pub mod chan;
pub mod command;
pub mod error;
#[cfg(feature = "tokio")]
pub mod irc;
#[cfg(feature = "tokio")]
pub mod line;
pub mod message;
pub mod prefix;
pub mod response;

pub use self::casemap::{irc_eq, irc_to_lower};
pub use self::chan::ChannelExt;
pub use self::command::Command;
pub use self::error::{MessageParseError, ProtocolError};
#[cfg(feature = "tokio")]
pub use self::irc::IrcCodec;
#[cfg(feature = "tokio")]
pub use self::line::LineCodec;
pub use self::message::Message;
pub use self::prefix::Prefix;
pub use self::response::Response;

/// Maximum accepted length of one inbound IRC line, terminator included.
pub const MAX_IRC_LINE_LEN: usize = 8191;
