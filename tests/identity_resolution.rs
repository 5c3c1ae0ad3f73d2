//! Integration tests for nickname to account resolution over a live link.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{FakeServer, Peer, fast_timeouts, irc_config};
use sd_bot::identity::{IdentityResolver, REQUEST_TTL};
use sd_bot::network::{Client, Connection, Handler};
use sdbot_proto::{Command, Message};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

struct Identity(Arc<IdentityResolver>);

#[async_trait]
impl Handler for Identity {
    async fn handle(&self, client: &Client, msg: &Message) -> bool {
        self.0.handle(client, msg).await
    }

    fn disconnected(&self) {
        self.0.clear();
    }
}

struct Harness {
    server: FakeServer,
    peer: Peer,
    client: Client,
    identity: Arc<IdentityResolver>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl Harness {
    async fn start() -> Self {
        let server = FakeServer::bind().await.expect("bind");
        let connection = Connection::with_timeouts(irc_config(&server.address()), fast_timeouts());
        let client = connection.client();
        let identity = Arc::new(IdentityResolver::new());
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(
            connection.run(Arc::new(Identity(Arc::clone(&identity))), shutdown.clone()),
        );

        let mut peer = server.accept_registered().await.expect("accept");
        let join = peer.recv().await.expect("JOIN");
        assert!(matches!(join.command, Command::JOIN(..)));

        Self {
            server,
            peer,
            client,
            identity,
            shutdown,
            task,
        }
    }

    fn resolve(&self, nick: &str) -> JoinHandle<Option<String>> {
        let identity = Arc::clone(&self.identity);
        let client = self.client.clone();
        let nick = nick.to_string();
        tokio::spawn(async move { identity.resolve(&client, &nick).await })
    }

    /// Wait until every line sent so far has been processed by the bot.
    async fn sync(&mut self) {
        self.peer.send_raw("PING :sync").await.unwrap();
        self.peer
            .recv_until(|m| matches!(&m.command, Command::PONG(s, _) if s == "sync"))
            .await
            .unwrap();
    }

    /// Answer the next WHOIS with a 330 for `account`.
    async fn answer_whois(&mut self, nick: &str, account: &str) {
        let whois = self.peer.recv().await.unwrap();
        assert_eq!(whois.to_string(), format!("WHOIS {nick} {nick}"));
        self.peer
            .send_raw(&format!(":irc.test 330 sd-bot {nick} {account} :is logged in as"))
            .await
            .unwrap();
    }

    async fn stop(self) {
        self.shutdown.cancel();
        self.task.await.unwrap();
    }
}

async fn finished(handle: JoinHandle<Option<String>>) -> Option<String> {
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("lookup finished")
        .unwrap()
}

#[tokio::test]
async fn test_whois_resolves_then_cache_answers() {
    let mut h = Harness::start().await;

    let lookup = h.resolve("sztanpet");
    h.answer_whois("sztanpet", "sztanpet_acct").await;
    assert_eq!(finished(lookup).await.as_deref(), Some("sztanpet_acct"));

    // Cached: no second WHOIS, even with different case.
    let again = h.resolve("SZTANPET");
    assert_eq!(finished(again).await.as_deref(), Some("sztanpet_acct"));
    h.peer.expect_silence(Duration::from_millis(100)).await.unwrap();

    h.stop().await;
}

#[tokio::test]
async fn test_rate_limited_whois_falls_back_to_nickserv() {
    let mut h = Harness::start().await;

    let lookup = h.resolve("foo");
    let whois = h.peer.recv().await.unwrap();
    assert_eq!(whois.to_string(), "WHOIS foo foo");
    h.peer
        .send_raw(":irc.test 263 sd-bot WHOIS :This command could not be completed because it has been used recently")
        .await
        .unwrap();

    let query = h.peer.recv().await.unwrap();
    assert_eq!(query.to_string(), "PRIVMSG NickServ :info foo");
    h.peer
        .send_raw(":NickServ!NickServ@services. NOTICE sd-bot :Information on \x02foo\x02 (account \x02foo_acct\x02):")
        .await
        .unwrap();

    assert_eq!(finished(lookup).await.as_deref(), Some("foo_acct"));
    assert_eq!(h.identity.cache().get("foo").as_deref(), Some("foo_acct"));

    h.stop().await;
}

#[tokio::test]
async fn test_quit_and_part_evict() {
    let mut h = Harness::start().await;

    for (nick, leave) in [("foo", ":foo!f@h QUIT :bye"), ("bar", ":bar!b@h PART #systemd")] {
        let lookup = h.resolve(nick);
        h.answer_whois(nick, "acct").await;
        assert!(finished(lookup).await.is_some());

        h.peer.send_raw(leave).await.unwrap();
        h.sync().await;
        assert_eq!(h.identity.cache().get(nick), None);
    }

    h.stop().await;
}

#[tokio::test]
async fn test_quit_right_after_reply_is_not_undone() {
    let mut h = Harness::start().await;

    let lookup = h.resolve("sztanpet");
    let whois = h.peer.recv().await.unwrap();
    assert_eq!(whois.to_string(), "WHOIS sztanpet sztanpet");
    // Reply and departure in one segment: the QUIT is processed before the
    // waiting task gets to run.
    h.peer
        .send_raw(":irc.test 330 sd-bot sztanpet sztanpet_acct :is logged in as\r\n:sztanpet!s@h QUIT :bye")
        .await
        .unwrap();

    assert_eq!(finished(lookup).await.as_deref(), Some("sztanpet_acct"));
    h.sync().await;
    assert_eq!(h.identity.cache().get("sztanpet"), None);

    h.stop().await;
}

#[tokio::test]
async fn test_rename_carries_account() {
    let mut h = Harness::start().await;

    let lookup = h.resolve("foo");
    h.answer_whois("foo", "foo_acct").await;
    assert!(finished(lookup).await.is_some());

    h.peer.send_raw(":foo!f@h NICK foo_away").await.unwrap();
    h.sync().await;

    let renamed = h.resolve("foo_away");
    assert_eq!(finished(renamed).await.as_deref(), Some("foo_acct"));
    assert_eq!(h.identity.cache().get("foo"), None);

    h.stop().await;
}

#[tokio::test]
async fn test_stale_lookup_resolves_to_none() {
    let mut h = Harness::start().await;

    let lookup = h.resolve("ghost");
    let whois = h.peer.recv().await.unwrap();
    assert!(matches!(whois.command, Command::WHOIS(..)));

    h.identity
        .sweep(Instant::now() + REQUEST_TTL + Duration::from_secs(1));
    assert_eq!(finished(lookup).await, None);
    assert!(h.identity.pending().is_empty());

    h.stop().await;
}

#[tokio::test]
async fn test_server_disconnect_notice_clears_cache() {
    let mut h = Harness::start().await;

    for nick in ["foo", "bar"] {
        let lookup = h.resolve(nick);
        h.answer_whois(nick, "acct").await;
        assert!(finished(lookup).await.is_some());
    }
    assert_eq!(h.identity.cache().len(), 2);

    h.peer.send_raw("DISCONNECT :closing link").await.unwrap();
    h.sync().await;
    assert!(h.identity.cache().is_empty());

    // The next lookup asks the server again.
    let lookup = h.resolve("foo");
    h.answer_whois("foo", "foo_acct").await;
    assert_eq!(finished(lookup).await.as_deref(), Some("foo_acct"));

    h.stop().await;
}

#[tokio::test]
async fn test_disconnect_clears_cache() {
    let mut h = Harness::start().await;

    let lookup = h.resolve("foo");
    h.answer_whois("foo", "foo_acct").await;
    assert!(finished(lookup).await.is_some());

    let Harness {
        server,
        peer,
        client,
        identity,
        shutdown,
        task,
    } = h;
    drop(peer);

    // The cache is cleared before the bot dials again.
    let mut peer = server.accept_registered().await.expect("reconnect");
    assert!(identity.cache().is_empty());
    peer.recv().await.expect("JOIN");

    let lookup = {
        let identity = Arc::clone(&identity);
        tokio::spawn(async move { identity.resolve(&client, "foo").await })
    };
    let whois = peer.recv().await.unwrap();
    assert_eq!(whois.to_string(), "WHOIS foo foo");
    peer.send_raw(":irc.test 330 sd-bot foo foo_acct :is logged in as")
        .await
        .unwrap();
    assert_eq!(finished(lookup).await.as_deref(), Some("foo_acct"));

    shutdown.cancel();
    task.await.unwrap();
}
