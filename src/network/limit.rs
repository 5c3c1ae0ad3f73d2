//! Outbound flood control.
//!
//! Implements Hybrid's algorithm: every line costs two seconds plus 1/120 of
//! a second per character. Cost accumulates as `badness`, drained by the
//! time elapsed between sends. Once ten seconds of badness have built up the
//! server is close to an "Excess Flood" kill, and the sender has to wait.

use std::time::Duration;

use tokio::time::Instant;

/// Flat cost of any line.
const LINE_COST: Duration = Duration::from_secs(2);
/// Characters that add one second of cost.
const CHARS_PER_SECOND: u32 = 120;
/// Badness at which senders start to wait.
const THRESHOLD: Duration = Duration::from_secs(10);

/// Cost of a line of `chars` characters.
pub fn line_cost(chars: usize) -> Duration {
    let chars = u32::try_from(chars).unwrap_or(u32::MAX);
    LINE_COST + Duration::from_secs(1) * chars / CHARS_PER_SECOND
}

/// Per-connection flood control state.
#[derive(Debug, Default)]
pub struct FloodControl {
    badness: Duration,
    last_send: Option<Instant>,
}

impl FloodControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for a line of `chars` characters sent at `now`.
    ///
    /// Returns how long the caller must wait before queueing it, which is
    /// zero unless the threshold has been reached.
    pub fn check(&mut self, chars: usize, now: Instant) -> Duration {
        let cost = line_cost(chars);

        self.badness = match self.last_send {
            Some(last) => (self.badness + cost).saturating_sub(now.saturating_duration_since(last)),
            // Nothing sent yet on this link.
            None => Duration::ZERO,
        };
        self.last_send = Some(now);

        if self.badness >= THRESHOLD {
            cost
        } else {
            Duration::ZERO
        }
    }

    /// Forget all history. Called for every new transport generation.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn badness(&self) -> Duration {
        self.badness
    }
}
