//! Client handle and the handler seam.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use sdbot_proto::Message;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

use super::limit::FloodControl;
use crate::config::IrcConfig;
use crate::error::LinkError;

/// Where the link is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Disconnected,
    Connecting,
    /// Socket is up, registration not yet acknowledged.
    Connected,
    /// RPL_WELCOME received.
    Registered,
}

/// Receives every inbound message the link does not consume.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handle one message. Return `true` if it was consumed.
    async fn handle(&self, client: &Client, msg: &Message) -> bool;

    /// Called once RPL_WELCOME arrives, before the channel is joined.
    async fn registered(&self, _client: &Client) {}

    /// Called after a transport generation has been torn down.
    fn disconnected(&self) {}
}

/// A queued line and the transport generation it was written for.
#[derive(Debug)]
pub struct Outbound {
    /// `None` for lines that may go out on any connection.
    pub generation: Option<u64>,
    pub msg: Message,
}

impl fmt::Display for Outbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.msg, f)
    }
}

/// Mutable link fields, all behind one lock.
#[derive(Debug)]
pub(super) struct LinkState {
    pub login: LoginState,
    /// Bumped for every transport that comes up.
    pub generation: u64,
    /// Consecutive failures; reset by RPL_WELCOME.
    pub failures: u32,
    /// Keepalive pings sent and not yet answered by any inbound line.
    pub pending_pings: u8,
    pub flood: FloodControl,
}

pub(super) struct Shared {
    pub config: IrcConfig,
    pub tx: mpsc::Sender<Outbound>,
    pub link: Mutex<LinkState>,
}

/// Cheap, cloneable handle for sending on the IRC link.
///
/// Clients handed to a [`Handler`] are bound to the transport that delivered
/// the message; whatever they queue is dropped if that transport is gone by
/// the time the line would be written. Clients from
/// [`Connection::client`](super::Connection::client) are unbound and their
/// lines wait for the next connection.
#[derive(Clone)]
pub struct Client {
    pub(super) shared: Arc<Shared>,
    generation: Option<u64>,
}

impl Client {
    /// A client and the receiving end of its outbound queue.
    ///
    /// [`Connection`](super::Connection) drains the queue onto the socket;
    /// anything else holding the receiver sees exactly what would be sent.
    pub fn pair(config: IrcConfig) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(1);
        let client = Self {
            shared: Arc::new(Shared {
                config,
                tx,
                link: Mutex::new(LinkState {
                    login: LoginState::Disconnected,
                    generation: 0,
                    failures: 0,
                    pending_pings: 0,
                    flood: FloodControl::new(),
                }),
            }),
            generation: None,
        };
        (client, rx)
    }

    /// A handle whose lines only go out on transport `generation`.
    pub(super) fn bound(&self, generation: u64) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            generation: Some(generation),
        }
    }

    /// Queue a message, waiting first if flood control demands it.
    ///
    /// While the link is down this waits until a new generation drains the
    /// queue. Fails only once the connection has shut down for good.
    pub async fn write(&self, msg: Message) -> Result<(), LinkError> {
        let wait = self.shared.link.lock().flood.check(msg.len(), Instant::now());
        if !wait.is_zero() {
            debug!(wait = ?wait, "Flood control delaying line");
            tokio::time::sleep(wait).await;
        }
        self.send_now(msg).await
    }

    /// Queue a message without flood control.
    pub(super) async fn send_now(&self, msg: Message) -> Result<(), LinkError> {
        let line = Outbound {
            generation: self.generation,
            msg,
        };
        self.shared.tx.send(line).await.map_err(|_| LinkError::Closed)
    }

    /// Say `text` in the configured channel.
    pub async fn write_line(&self, text: impl Into<String>) -> Result<(), LinkError> {
        self.write(Message::privmsg(self.channel(), text)).await
    }

    /// Reply to `msg` where it was said: the channel, or the sender for
    /// private messages.
    pub async fn privmsg(&self, reply_to: &Message, text: impl Into<String>) -> Result<(), LinkError> {
        match self.target(reply_to) {
            Some(target) => self.write(Message::privmsg(target, text)).await,
            None => Ok(()),
        }
    }

    /// Reply to the sender of `msg` with a NOTICE.
    pub async fn notice(&self, reply_to: &Message, text: impl Into<String>) -> Result<(), LinkError> {
        match reply_to.source_nickname() {
            Some(nick) => self.write(Message::notice(nick, text)).await,
            None => Ok(()),
        }
    }

    /// Where a reply to `msg` should go: the channel it was said in, or the
    /// sender for private messages.
    pub fn target(&self, msg: &Message) -> Option<String> {
        msg.response_target().map(str::to_owned)
    }

    /// Configured nickname.
    pub fn nick(&self) -> &str {
        &self.shared.config.nick
    }

    /// Configured channel, `#` included.
    pub fn channel(&self) -> String {
        self.shared.config.channel_name()
    }

    pub fn login_state(&self) -> LoginState {
        self.shared.link.lock().login
    }

    /// Consecutive connection failures since the last successful registration.
    pub fn failures(&self) -> u32 {
        self.shared.link.lock().failures
    }

    pub(super) fn set_login(&self, login: LoginState) {
        self.shared.link.lock().login = login;
    }

    /// Reset per-generation state for a fresh transport; returns its number.
    pub(super) fn begin_generation(&self) -> u64 {
        let mut link = self.shared.link.lock();
        link.generation += 1;
        link.login = LoginState::Connected;
        link.pending_pings = 0;
        link.flood.reset();
        link.generation
    }

    /// Record a failure; returns the new failure count.
    pub(super) fn record_failure(&self) -> u32 {
        let mut link = self.shared.link.lock();
        link.login = LoginState::Disconnected;
        link.failures = link.failures.saturating_add(1);
        link.failures
    }

    pub(super) fn mark_registered(&self) {
        let mut link = self.shared.link.lock();
        link.login = LoginState::Registered;
        link.failures = 0;
    }

    /// USER, NICK and, if configured, PASS.
    pub(super) fn registration(&self) -> Vec<Message> {
        let config = &self.shared.config;
        let mut preamble = vec![
            Message::user(config.nick.as_str(), config.realname.as_str()),
            Message::nick(config.nick.as_str()),
        ];
        if let Some(password) = config.server_password() {
            preamble.push(Message::pass(password));
        }
        preamble
    }
}
