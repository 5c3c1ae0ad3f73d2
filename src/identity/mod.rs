//! Nickname to account resolution.
//!
//! Nicknames are cheap to take over; accounts are not. Before trusting a
//! sender the bot asks the server which account the nick is logged in to
//! with `WHOIS nick nick`. When the server rate-limits WHOIS (263) it falls
//! back to asking NickServ instead. Whichever answer arrives first wins.
//!
//! Answers are cached until the nick parts, quits or the link drops, and a
//! rename carries the cached account along.

mod cache;
mod pending;

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use sdbot_proto::{Command, Message, Response, irc_eq, irc_to_lower};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::network::Client;

pub use cache::IdentityCache;
pub use pending::{PendingRequests, REQUEST_TTL};

/// How often stale lookups are swept.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(15);

const NICKSERV: &str = "NickServ";

/// `Information on armin (account armin):`, with optional bold markers
/// around either name.
static NICKSERV_INFO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Information on \x02?([^ \x02]+)\x02? \(account \x02?([^ \x02)]+)\x02?\)")
        .expect("NickServ info pattern is valid")
});

fn fold(nick: &str) -> String {
    irc_to_lower(nick)
}

/// Pull `(nick, account)` out of a NickServ `info` reply.
fn parse_info(text: &str) -> Option<(&str, &str)> {
    let caps = NICKSERV_INFO.captures(text)?;
    Some((caps.get(1)?.as_str(), caps.get(2)?.as_str()))
}

/// Resolves nicknames to accounts and keeps the answers fresh.
#[derive(Debug, Default)]
pub struct IdentityResolver {
    cache: IdentityCache,
    pending: PendingRequests,
}

impl IdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// The account `nick` is logged in to, or `None` if that cannot be
    /// established.
    ///
    /// A cache hit answers without touching the network. A miss sends one
    /// WHOIS and waits for a reply; the reply itself fills the cache. A
    /// lookup that is swept, superseded or older than [`REQUEST_TTL`] comes
    /// back as `None`, even while the WHOIS is still stuck in the queue.
    pub async fn resolve(&self, client: &Client, nick: &str) -> Option<String> {
        if let Some(account) = self.cache.get(nick) {
            return Some(account);
        }

        let mut reply = self.pending.insert(nick, Instant::now());
        let lookup = async {
            tokio::select! {
                sent = client.write(Message::whois(nick, nick)) => {
                    if let Err(e) = sent {
                        warn!(nick = %nick, error = %e, "Could not send WHOIS");
                        return None;
                    }
                }
                // Swept or replaced before the WHOIS left the queue.
                early = &mut reply => return early.ok(),
            }
            reply.await.ok()
        };

        match tokio::time::timeout(REQUEST_TTL, lookup).await {
            Ok(account) => account,
            Err(_) => {
                debug!(nick = %nick, "Identity lookup timed out");
                None
            }
        }
    }

    /// Consume lookup replies and presence changes.
    ///
    /// Returns `true` for messages that belong to identity tracking; the
    /// rest of the handler chain never sees those.
    pub async fn handle(&self, client: &Client, msg: &Message) -> bool {
        match &msg.command {
            // :server 330 <me> <nick> <account> :is logged in as
            Command::Response(Response::RPL_WHOISACCOUNT, args) => {
                if let [_, nick, account, ..] = args.as_slice()
                    && self.pending.fulfil(nick, account, &self.cache)
                {
                    debug!(nick = %nick, account = %account, "Resolved via WHOIS");
                }
                true
            }
            // :server 263 <me> WHOIS :This command could not be completed ...
            Command::Response(Response::RPL_TRYAGAIN, _) => {
                self.fall_back(client);
                true
            }
            Command::NOTICE(_, text) if msg.source_nickname().is_some_and(|n| irc_eq(n, NICKSERV)) => {
                let Some((nick, account)) = parse_info(text) else {
                    return false;
                };
                if self.pending.fulfil(nick, account, &self.cache) {
                    debug!(nick = %nick, account = %account, "Resolved via NickServ");
                }
                true
            }
            Command::PART(..) | Command::QUIT(_) => {
                if let Some(nick) = msg.source_nickname() {
                    self.cache.remove(nick);
                }
                true
            }
            Command::NICK(new) => {
                if let Some(old) = msg.source_nickname() {
                    self.cache.rename(old, new);
                }
                true
            }
            Command::Raw(cmd, _) if cmd.eq_ignore_ascii_case("DISCONNECT") => {
                self.clear();
                true
            }
            _ => false,
        }
    }

    /// Ask NickServ about every lookup that has not fallen back yet.
    fn fall_back(&self, client: &Client) {
        let nicks = self.pending.start_fallback();
        if nicks.is_empty() {
            return;
        }
        debug!(count = nicks.len(), "WHOIS rate limited, asking NickServ");

        // Off the read pump: flood control may make these wait.
        let client = client.clone();
        tokio::spawn(async move {
            for nick in nicks {
                let query = Message::privmsg(NICKSERV, format!("info {nick}"));
                if let Err(e) = client.write(query).await {
                    warn!(nick = %nick, error = %e, "Could not query NickServ");
                    break;
                }
            }
        });
    }

    /// Forget every cached account. Outstanding lookups are left to the sweep.
    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Drop lookups older than [`REQUEST_TTL`], waking their waiters.
    pub fn sweep(&self, now: Instant) -> usize {
        self.pending.sweep(now)
    }

    /// Sweep every [`SWEEP_INTERVAL`] until `shutdown` is cancelled.
    pub fn spawn_sweeper(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let resolver = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(SWEEP_INTERVAL);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticks.tick() => {
                        let swept = resolver.sweep(Instant::now());
                        if swept > 0 {
                            debug!(swept, "Dropped stale identity lookups");
                        }
                    }
                }
            }
        })
    }

    pub fn cache(&self) -> &IdentityCache {
        &self.cache
    }

    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }
}
