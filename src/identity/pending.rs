//! Outstanding identity lookups.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;

use super::cache::IdentityCache;
use super::fold;

/// Lookups older than this are abandoned.
pub const REQUEST_TTL: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct PendingRequest {
    /// Nick as the caller spelled it, for the NickServ fallback.
    nick: String,
    reply: oneshot::Sender<String>,
    created: Instant,
    fallback_sent: bool,
}

/// Lookups waiting for a WHOIS or NickServ answer, keyed by folded nick.
#[derive(Debug, Default)]
pub struct PendingRequests {
    requests: Mutex<HashMap<String, PendingRequest>>,
}

impl PendingRequests {
    /// Register a lookup for `nick`.
    ///
    /// An earlier lookup for the same nick is dropped, which wakes its waiter
    /// with a closed channel.
    pub fn insert(&self, nick: &str, now: Instant) -> oneshot::Receiver<String> {
        let (reply, rx) = oneshot::channel();
        let request = PendingRequest {
            nick: nick.to_owned(),
            reply,
            created: now,
            fallback_sent: false,
        };
        self.requests.lock().insert(fold(nick), request);
        rx
    }

    /// Deliver `account` to the lookup for `nick`, caching it first.
    ///
    /// The cache entry exists before the waiter wakes, so presence changes
    /// processed after this call always see it. Returns `false` if there was
    /// no such lookup (it timed out, or the other reply path got there
    /// first); nothing is cached then.
    pub fn fulfil(&self, nick: &str, account: &str, cache: &IdentityCache) -> bool {
        let Some(request) = self.requests.lock().remove(&fold(nick)) else {
            return false;
        };
        cache.insert(nick, account);
        // A waiter that gave up is not an error.
        let _ = request.reply.send(account.to_owned());
        true
    }

    /// Mark every lookup that has not fallen back yet and return their nicks.
    pub fn start_fallback(&self) -> Vec<String> {
        self.requests
            .lock()
            .values_mut()
            .filter(|request| !request.fallback_sent)
            .map(|request| {
                request.fallback_sent = true;
                request.nick.clone()
            })
            .collect()
    }

    /// Drop lookups older than [`REQUEST_TTL`]; returns how many went.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut requests = self.requests.lock();
        let before = requests.len();
        requests.retain(|_, request| now.saturating_duration_since(request.created) < REQUEST_TTL);
        before - requests.len()
    }

    pub fn len(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
