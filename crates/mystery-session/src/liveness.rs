//! Keepalive pings and silent-disconnect detection.
//!
//! The monitor pings the server on a fixed interval and expects a pong
//! within a timeout. It is the only place a lost link is reported: the
//! first timeout or send failure produces a [`Disconnected`] notification,
//! and the monitor stays disconnected for good afterwards.
//!
//! ```text
//!   Idle ──(start)──→ Connected ──(ping sent)──→ AwaitingPong
//!                        ↑                           │
//!                        └──────────(pong)───────────┘
//!
//!   Connected / AwaitingPong ──(timeout | send failure)──→ Disconnected
//! ```

use std::time::Duration;

use mystery_tick::{OneShotTimer, RepeatingTimer};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::SessionError;

// ---------------------------------------------------------------------------
// LivenessConfig
// ---------------------------------------------------------------------------

/// Keepalive timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    /// Seconds of silence before the next ping.
    pub ping_interval_secs: u64,
    /// Seconds to wait for the pong before declaring the link dead.
    pub pong_timeout_secs: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: 15,
            pong_timeout_secs: 10,
        }
    }
}

impl LivenessConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// States and notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthState {
    /// Not started yet.
    Idle,
    /// Link believed healthy; no ping outstanding.
    Connected,
    /// A ping was sent and its pong has not arrived.
    AwaitingPong,
    /// Link lost. Terminal.
    Disconnected,
}

/// Why the link was declared lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectCause {
    /// No pong arrived within the timeout.
    PongTimeout,
    /// The transport refused a send.
    SendFailed,
}

/// The one-time notification that the link is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnected {
    pub cause: DisconnectCause,
}

/// What the monitor needs from the connection it watches.
pub trait KeepaliveLink {
    /// Sends a ping. An error means the link is down.
    fn send_ping(&mut self) -> Result<(), SessionError>;
}

// ---------------------------------------------------------------------------
// LivenessMonitor
// ---------------------------------------------------------------------------

/// Keepalive state machine driven by explicit `now` instants.
#[derive(Debug)]
pub struct LivenessMonitor {
    state: HealthState,
    ping: RepeatingTimer,
    timeout: OneShotTimer,
}

impl LivenessMonitor {
    pub fn new(config: &LivenessConfig) -> Self {
        Self {
            state: HealthState::Idle,
            ping: RepeatingTimer::new(config.ping_interval()),
            timeout: OneShotTimer::new(config.pong_timeout()),
        }
    }

    /// Starts the keepalive cycle. The first ping is due one interval
    /// after `now`. Does nothing unless the monitor is idle.
    pub fn start(&mut self, now: Instant) {
        if self.state != HealthState::Idle {
            return;
        }
        self.ping.start(now);
        self.state = HealthState::Connected;
        tracing::debug!(interval = ?self.ping.period(), "liveness monitor started");
    }

    /// Advances the monitor to `now`.
    ///
    /// An expired pong timeout is checked before a due ping, so a dead link
    /// is reported even when both deadlines passed since the last poll.
    /// Returns the disconnect notification the first time the link is
    /// found dead, and `None` on every other call.
    pub fn poll<L>(&mut self, link: &mut L, now: Instant) -> Option<Disconnected>
    where
        L: KeepaliveLink + ?Sized,
    {
        if !self.is_active() {
            return None;
        }

        if self.timeout.poll(now) {
            tracing::warn!("no pong before timeout");
            return self.disconnect(DisconnectCause::PongTimeout);
        }

        if self.ping.poll(now) {
            match link.send_ping() {
                Ok(()) => {
                    tracing::trace!("keepalive ping sent");
                    self.timeout.arm(now);
                    self.state = HealthState::AwaitingPong;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "keepalive ping failed");
                    return self.disconnect(DisconnectCause::SendFailed);
                }
            }
        }
        None
    }

    /// A pong arrived. Cancels the pending timeout, if any.
    pub fn on_pong(&mut self) {
        if self.timeout.cancel() && self.state == HealthState::AwaitingPong {
            tracing::trace!("pong received");
            self.state = HealthState::Connected;
        }
    }

    /// A send on the watched link failed.
    ///
    /// Returns the disconnect notification unless one was already given.
    pub fn on_send_failure(&mut self) -> Option<Disconnected> {
        if !self.is_active() {
            return None;
        }
        self.disconnect(DisconnectCause::SendFailed)
    }

    /// Restarts the ping interval from `now`. Called on chat activity so a
    /// busy link is not pinged needlessly. An armed timeout is left alone.
    pub fn reschedule(&mut self, now: Instant) {
        if self.is_active() {
            self.ping.start(now);
        }
    }

    /// Cancels both timers without raising a notification.
    pub fn shutdown(&mut self) {
        self.ping.cancel();
        self.timeout.cancel();
        if self.state != HealthState::Disconnected {
            tracing::debug!("liveness monitor shut down");
        }
        self.state = HealthState::Disconnected;
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    /// When the next ping is due, while running.
    pub fn next_ping(&self) -> Option<Instant> {
        self.ping.deadline()
    }

    /// When the outstanding ping times out, if one is outstanding.
    pub fn pong_deadline(&self) -> Option<Instant> {
        self.timeout.deadline()
    }

    fn is_active(&self) -> bool {
        matches!(
            self.state,
            HealthState::Connected | HealthState::AwaitingPong
        )
    }

    fn disconnect(&mut self, cause: DisconnectCause) -> Option<Disconnected> {
        self.ping.cancel();
        self.timeout.cancel();
        self.state = HealthState::Disconnected;
        tracing::warn!(?cause, "connection lost");
        Some(Disconnected { cause })
    }
}
