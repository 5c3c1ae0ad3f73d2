//! Integration test common infrastructure.
//!
//! Provides a scripted IRC server the bot dials into, plus config and
//! timeout presets short enough for real-time tests.

pub mod server;

use std::time::Duration;

use sd_bot::config::IrcConfig;
use sd_bot::network::Timeouts;

#[allow(unused_imports)]
pub use server::{FakeServer, Peer};

/// IRC config pointing at `addr`.
#[allow(dead_code)]
pub fn irc_config(addr: &str) -> IrcConfig {
    IrcConfig {
        addr: addr.to_string(),
        nick: "sd-bot".to_string(),
        password: String::new(),
        channel: "systemd".to_string(),
        realname: "github.com/sztanpet/sd-bot".to_string(),
    }
}

/// Reconnects within milliseconds; keepalive left out of the way.
#[allow(dead_code)]
pub fn fast_timeouts() -> Timeouts {
    Timeouts {
        dial: Duration::from_secs(2),
        write: Duration::from_secs(2),
        read: Duration::from_secs(30),
        ping: Duration::from_secs(5),
        backoff_base: Duration::from_millis(10),
    }
}

/// Like [`fast_timeouts`], with keepalive pings after a short idle period.
#[allow(dead_code)]
pub fn keepalive_timeouts() -> Timeouts {
    Timeouts {
        read: Duration::from_millis(300),
        ping: Duration::from_millis(300),
        ..fast_timeouts()
    }
}
