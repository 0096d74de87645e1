//! Session layer for Mystery Online.
//!
//! This crate sits between the wire and the dispatch router:
//!
//! 1. **Queues**: FIFO buffers of room and direct messages with a
//!    put-back operation ([`MessageQueue`], [`PrivateMessageQueue`])
//! 2. **Session**: owns the transport connection, turns transport events
//!    into queued messages and sends outbound lines ([`Session`])
//! 3. **Liveness**: keepalive pings and the single disconnect
//!    notification ([`LivenessMonitor`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Client / Dispatch Router (above)  ← pulls messages, drives the monitor
//!     ↕
//! Session Layer (this crate)  ← queues, session, liveness
//!     ↕
//! Protocol + Transport (below)  ← envelopes, wire lines, transport events
//! ```

mod error;
mod liveness;
mod queue;
mod session;

pub use error::SessionError;
pub use liveness::{
    DisconnectCause, Disconnected, HealthState, KeepaliveLink, LivenessConfig, LivenessMonitor,
};
pub use queue::{MessageQueue, PrivateMessageQueue, Queue};
pub use session::{ProcessReport, Session, SessionConfig, SessionEvents};
