//! IRC link management.
//!
//! A [`Connection`] owns the socket and runs the reconnect loop; cloneable
//! [`Client`] handles let the rest of the bot send messages; a [`Handler`]
//! receives everything the link does not consume itself.
//!
//! ```text
//!  supervisor (Connection::run)
//!     │  dial, backoff, teardown
//!     ├──▶ write pump ◀── mpsc(1) ◀── Client::write (flood control)
//!     │                        ▲
//!     └──▶ read pump ──────────┘ PONG, PING, NICK (no flood control)
//!             │
//!             └──▶ Handler::handle
//! ```
//!
//! Each queued [`Outbound`] line carries the generation of the client that
//! wrote it. The read pump and the handlers it calls write through a client
//! bound to their own generation, so nothing they queue leaks onto a later
//! connection.

mod client;
mod connection;
mod limit;

pub use client::{Client, Handler, LoginState, Outbound};
pub use connection::{BACKOFF_BASE, Connection, Timeouts, backoff};
pub use limit::{FloodControl, line_cost};
