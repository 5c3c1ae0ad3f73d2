//! Connection supervisor and the two I/O pumps.
//!
//! Each transport generation gets a fresh socket, a child cancellation token
//! and a pair of tasks. The write pump owns the single outbound queue for the
//! generation's lifetime and hands it back when it exits, so queued messages
//! survive a reconnect. Lines written on behalf of an earlier generation
//! (PONGs, the welcome JOIN, handler replies) are dropped instead of being
//! replayed on the new socket. Whichever pump fails first cancels the token;
//! the supervisor joins both before it dials again.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use sdbot_proto::{Command, IrcCodec, LineCodec, Message, Response};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::client::{Client, Handler, LoginState, Outbound};
use crate::config::IrcConfig;
use crate::error::LinkError;

/// Multiplied by `2^failures` between reconnect attempts.
pub const BACKOFF_BASE: Duration = Duration::from_millis(300);
/// Failures beyond this no longer grow the backoff (~5 minutes).
const MAX_BACKOFF_EXPONENT: u32 = 10;
/// Parameter of keepalive pings.
const KEEPALIVE_TOKEN: &str = "sd-bot";

/// Delay before the next dial after `failures` consecutive failures.
pub fn backoff(base: Duration, failures: u32) -> Duration {
    if failures == 0 {
        return Duration::ZERO;
    }
    base * (1u32 << failures.min(MAX_BACKOFF_EXPONENT))
}

/// Deadlines used by the link.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub dial: Duration,
    pub write: Duration,
    /// Read inactivity before a keepalive ping is sent.
    pub read: Duration,
    /// Read inactivity, with a ping outstanding, before the link is dropped.
    pub ping: Duration,
    pub backoff_base: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            dial: Duration::from_secs(5),
            write: Duration::from_secs(5),
            read: Duration::from_secs(30),
            ping: Duration::from_secs(5),
            backoff_base: BACKOFF_BASE,
        }
    }
}

/// The IRC link. Build one, hand out [`Client`]s, then [`run`](Connection::run) it.
pub struct Connection {
    client: Client,
    rx: mpsc::Receiver<Outbound>,
    timeouts: Timeouts,
}

impl Connection {
    pub fn new(config: IrcConfig) -> Self {
        Self::with_timeouts(config, Timeouts::default())
    }

    pub fn with_timeouts(config: IrcConfig, timeouts: Timeouts) -> Self {
        let (client, rx) = Client::pair(config);
        Self {
            client,
            rx,
            timeouts,
        }
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }

    /// Keep the link up until `shutdown` is cancelled.
    ///
    /// Every dial, read or write failure tears the generation down and
    /// reconnects after [`backoff`]. There is no terminal failure.
    pub async fn run(self, handler: Arc<dyn Handler>, shutdown: CancellationToken) {
        let Connection {
            client,
            mut rx,
            timeouts,
        } = self;
        let addr = client.shared.config.addr.clone();

        loop {
            let delay = backoff(timeouts.backoff_base, client.failures());
            if !delay.is_zero() {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            client.set_login(LoginState::Connecting);
            info!(addr = %addr, "Connecting to IRC");
            let dialed = tokio::select! {
                _ = shutdown.cancelled() => break,
                dialed = dial(&addr, timeouts.dial) => dialed,
            };
            let stream = match dialed {
                Ok(stream) => stream,
                Err(e) => {
                    let failures = client.record_failure();
                    warn!(
                        error = %e,
                        failures,
                        retry_in = ?backoff(timeouts.backoff_base, failures),
                        "IRC connection failed"
                    );
                    continue;
                }
            };

            let number = client.begin_generation();
            info!(addr = %addr, generation = number, "Connected, registering");

            let generation = shutdown.child_token();
            let (read_half, write_half) = stream.into_split();
            let writer = tokio::spawn(write_pump(
                FramedWrite::new(write_half, IrcCodec::new()),
                rx,
                client.registration(),
                timeouts.write,
                number,
                generation.clone(),
            ));
            let reader = tokio::spawn(read_pump(
                FramedRead::new(read_half, LineCodec::new()),
                client.bound(number),
                Arc::clone(&handler),
                timeouts,
                generation.clone(),
            ));

            let read_result = reader.await;
            generation.cancel();
            let (returned, write_result) = match writer.await {
                Ok(out) => out,
                Err(e) => {
                    // The queue went down with the task; nothing can be sent anymore.
                    error!(error = %e, "Write pump panicked, stopping IRC link");
                    client.set_login(LoginState::Disconnected);
                    handler.disconnected();
                    return;
                }
            };
            rx = returned;

            client.set_login(LoginState::Disconnected);
            handler.disconnected();

            if shutdown.is_cancelled() {
                break;
            }

            let failure = match read_result {
                Ok(Err(e)) => Some(e),
                Ok(Ok(())) => write_result.err(),
                Err(e) => {
                    error!(error = %e, "Read pump panicked");
                    write_result.err()
                }
            };
            let failures = client.record_failure();
            let retry_in = backoff(timeouts.backoff_base, failures);
            match failure {
                Some(e) => warn!(error = %e, failures, retry_in = ?retry_in, "IRC link lost"),
                None => warn!(failures, retry_in = ?retry_in, "IRC link lost"),
            }
        }

        client.set_login(LoginState::Disconnected);
        info!("IRC link shut down");
    }
}

async fn dial(addr: &str, limit: Duration) -> Result<TcpStream, LinkError> {
    match tokio::time::timeout(limit, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(LinkError::Dial {
            addr: addr.to_owned(),
            source,
        }),
        Err(_) => Err(LinkError::DialTimeout {
            addr: addr.to_owned(),
        }),
    }
}

// ============================================================================
// Write pump
// ============================================================================

type Sink = FramedWrite<OwnedWriteHalf, IrcCodec>;

async fn write_pump(
    mut sink: Sink,
    mut rx: mpsc::Receiver<Outbound>,
    preamble: Vec<Message>,
    limit: Duration,
    number: u64,
    generation: CancellationToken,
) -> (mpsc::Receiver<Outbound>, Result<(), LinkError>) {
    let result = drain(&mut sink, &mut rx, preamble, limit, number, &generation).await;
    if let Err(ref e) = result {
        debug!(error = %e, "Write pump failed");
    }
    generation.cancel();
    (rx, result)
}

async fn drain(
    sink: &mut Sink,
    rx: &mut mpsc::Receiver<Outbound>,
    preamble: Vec<Message>,
    limit: Duration,
    number: u64,
    generation: &CancellationToken,
) -> Result<(), LinkError> {
    for msg in preamble {
        write_one(sink, msg, limit).await?;
    }

    loop {
        let line = tokio::select! {
            biased;
            _ = generation.cancelled() => return Ok(()),
            line = rx.recv() => match line {
                Some(line) => line,
                None => return Ok(()),
            },
        };
        if is_stale(&line, number) {
            debug!(line = %line, generation = ?line.generation, "Dropping line for a closed connection");
            continue;
        }
        write_one(sink, line.msg, limit).await?;
    }
}

/// Bound to a generation other than the one being written.
fn is_stale(line: &Outbound, number: u64) -> bool {
    line.generation.is_some_and(|g| g != number)
}

async fn write_one(sink: &mut Sink, msg: Message, limit: Duration) -> Result<(), LinkError> {
    debug!(line = %msg, ">");
    tokio::time::timeout(limit, sink.send(msg))
        .await
        .map_err(|_| LinkError::WriteTimeout)??;
    Ok(())
}

// ============================================================================
// Read pump
// ============================================================================

type Lines = FramedRead<OwnedReadHalf, LineCodec>;

async fn read_pump(
    mut lines: Lines,
    client: Client,
    handler: Arc<dyn Handler>,
    timeouts: Timeouts,
    generation: CancellationToken,
) -> Result<(), LinkError> {
    let result = tokio::select! {
        _ = generation.cancelled() => Ok(()),
        result = read_loop(&mut lines, &client, handler.as_ref(), &timeouts) => result,
    };
    if let Err(ref e) = result {
        debug!(error = %e, "Read pump failed");
    }
    generation.cancel();
    result
}

async fn read_loop(
    lines: &mut Lines,
    client: &Client,
    handler: &dyn Handler,
    timeouts: &Timeouts,
) -> Result<(), LinkError> {
    loop {
        let deadline = if client.shared.link.lock().pending_pings > 0 {
            timeouts.ping
        } else {
            timeouts.read
        };

        let line = match tokio::time::timeout(deadline, lines.next()).await {
            Ok(Some(line)) => line?,
            Ok(None) => return Err(LinkError::Eof),
            Err(_) => {
                {
                    let mut link = client.shared.link.lock();
                    if link.pending_pings > 0 {
                        return Err(LinkError::PingTimeout);
                    }
                    link.pending_pings += 1;
                }
                debug!("Read idle, sending keepalive ping");
                client.send_now(Message::ping(KEEPALIVE_TOKEN)).await?;
                continue;
            }
        };

        // Any line at all proves the server is alive.
        {
            let mut link = client.shared.link.lock();
            link.pending_pings = link.pending_pings.saturating_sub(1);
        }

        if line.is_empty() {
            continue;
        }
        debug!(line = %line, "<");

        let msg = match line.parse::<Message>() {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "Skipping malformed line");
                continue;
            }
        };
        dispatch(client, handler, msg).await?;
    }
}

/// Consume housekeeping commands; pass the rest to the handler.
async fn dispatch(client: &Client, handler: &dyn Handler, msg: Message) -> Result<(), LinkError> {
    match &msg.command {
        Command::PING(server, extra) => {
            client
                .send_now(Command::PONG(server.clone(), extra.clone()).into())
                .await
        }
        Command::Response(Response::RPL_WELCOME, _) => {
            info!("Registered with IRC server");
            client.mark_registered();
            handler.registered(client).await;
            client.write(Message::join(client.channel())).await
        }
        Command::Response(Response::ERR_NICKNAMEINUSE, _) => {
            let nick = format!("{}{}", client.nick(), rand::thread_rng().gen_range(0..10));
            warn!(nick = %nick, "Nickname in use, trying another");
            client.send_now(Message::nick(nick)).await
        }
        _ => {
            if !handler.handle(client, &msg).await {
                debug!(command = %msg.command.name(), "Unhandled message");
            }
            Ok(())
        }
    }
}
