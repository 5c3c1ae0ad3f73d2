//! Scripted IRC server.
//!
//! Accepts connections from the bot and exposes each one as a [`Peer`] the
//! test reads from and writes to line by line.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use sdbot_proto::{Command, LineCodec, Message};
use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite};

/// A listening fake server.
pub struct FakeServer {
    listener: TcpListener,
}

impl FakeServer {
    /// Bind on an ephemeral localhost port.
    pub async fn bind() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        Ok(Self { listener })
    }

    /// Address the bot should dial.
    pub fn address(&self) -> String {
        self.listener
            .local_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_default()
    }

    /// Wait for the bot to connect.
    pub async fn accept(&self) -> anyhow::Result<Peer> {
        let (stream, _) = timeout(Duration::from_secs(5), self.listener.accept()).await??;
        let (read_half, write_half) = stream.into_split();
        Ok(Peer {
            reader: FramedRead::new(read_half, LineCodec::new()),
            writer: FramedWrite::new(write_half, LineCodec::new()),
        })
    }

    /// Accept and consume the registration preamble.
    #[allow(dead_code)]
    pub async fn accept_registered(&self) -> anyhow::Result<Peer> {
        let mut peer = self.accept().await?;
        peer.expect_registration().await?;
        peer.send_raw(":irc.test 001 sd-bot :Welcome to the test network")
            .await?;
        Ok(peer)
    }
}

/// One accepted bot connection.
pub struct Peer {
    reader: FramedRead<OwnedReadHalf, LineCodec>,
    writer: FramedWrite<OwnedWriteHalf, LineCodec>,
}

#[allow(dead_code)]
impl Peer {
    /// Send one line; the codec adds CRLF.
    pub async fn send_raw(&mut self, line: &str) -> anyhow::Result<()> {
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        self.writer.send(line).await?;
        Ok(())
    }

    /// Next raw line from the bot, terminator stripped.
    pub async fn recv_line(&mut self) -> anyhow::Result<String> {
        self.recv_line_timeout(Duration::from_secs(5)).await
    }

    pub async fn recv_line_timeout(&mut self, dur: Duration) -> anyhow::Result<String> {
        match timeout(dur, self.reader.next()).await? {
            Some(line) => Ok(line?),
            None => anyhow::bail!("connection closed"),
        }
    }

    /// Next message from the bot.
    pub async fn recv(&mut self) -> anyhow::Result<Message> {
        let line = self.recv_line().await?;
        line.parse::<Message>()
            .map_err(|e| anyhow::anyhow!("Parse error: {}", e))
    }

    /// Skip messages until one matches.
    pub async fn recv_until<F>(&mut self, mut predicate: F) -> anyhow::Result<Message>
    where
        F: FnMut(&Message) -> bool,
    {
        loop {
            let msg = self.recv().await?;
            if predicate(&msg) {
                return Ok(msg);
            }
        }
    }

    /// Assert nothing arrives within `dur`.
    pub async fn expect_silence(&mut self, dur: Duration) -> anyhow::Result<()> {
        match self.recv_line_timeout(dur).await {
            Ok(line) => anyhow::bail!("expected silence, got {line:?}"),
            Err(e) if e.downcast_ref::<tokio::time::error::Elapsed>().is_some() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Wait until the bot drops the connection.
    pub async fn expect_closed(&mut self) -> anyhow::Result<()> {
        loop {
            match timeout(Duration::from_secs(5), self.reader.next()).await? {
                Some(Ok(_)) => continue,
                // A reset counts as closed too.
                Some(Err(_)) | None => return Ok(()),
            }
        }
    }

    /// Consume USER and NICK, in that order.
    pub async fn expect_registration(&mut self) -> anyhow::Result<()> {
        let user = self.recv().await?;
        anyhow::ensure!(
            matches!(user.command, Command::USER(..)),
            "expected USER, got {user}"
        );
        let nick = self.recv().await?;
        anyhow::ensure!(
            matches!(nick.command, Command::NICK(_)),
            "expected NICK, got {nick}"
        );
        Ok(())
    }
}
