//! Error types for the bot.
//!
//! Each concern gets its own enum: the IRC link, the durable state store and
//! webhook payload decoding. Configuration errors live next to the config
//! types. The binary folds all of them into `anyhow::Error`.

use std::io;
use std::path::PathBuf;

use sdbot_proto::ProtocolError;
use thiserror::Error;

// ============================================================================
// IRC link
// ============================================================================

/// Why one transport generation ended, or why a send could not be queued.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("dial {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("dial {addr}: timed out")]
    DialTimeout { addr: String },

    #[error("no reply to keepalive ping")]
    PingTimeout,

    #[error("write timed out")]
    WriteTimeout,

    #[error("connection closed by server")]
    Eof,

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The connection supervisor has stopped; nothing will drain the queue.
    #[error("link is shut down")]
    Closed,
}

// ============================================================================
// Durable state
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("encoding state: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// The file exists but does not hold a value of the expected shape.
    #[error("{}: corrupt state file: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: rmp_serde::decode::Error,
    },
}

// ============================================================================
// Webhook payloads
// ============================================================================

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("missing X-GitHub-Event header")]
    MissingEvent,

    #[error("unreadable body: {0}")]
    Body(String),

    #[error("invalid form body: {0}")]
    Form(String),

    #[error("form body has no payload field")]
    MissingPayload,

    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}
