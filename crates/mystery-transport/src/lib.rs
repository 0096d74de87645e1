//! Transport abstraction layer for Mystery Online.
//!
//! Provides the [`Connector`] and [`ChatTransport`] traits that abstract over
//! the line-oriented chat network the client talks to. Everything above this
//! crate only sees single lines of text addressed to a room or a user, plus a
//! stream of [`TransportEvent`]s.
//!
//! # Polling model
//!
//! [`ChatTransport::poll_event`] never blocks. The client calls it from its
//! high-frequency tick and processes whatever events are currently buffered.
//!
//! # Feature Flags
//!
//! - `irc` (default): IRC transport using `irc-proto` framing over `tokio` TCP
//!
//! [`MemoryTransport`] is always available; it runs the client without a
//! network, for local play and tests.

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "irc")]
mod irc;
mod memory;

pub use error::TransportError;
#[cfg(feature = "irc")]
pub use irc::{IrcConnector, IrcTransport};
pub use memory::{MemoryConnector, MemoryHandle, MemoryTransport, Outbound};

/// Channel name prefixes recognised by IRC servers.
const CHANNEL_PREFIXES: [char; 4] = ['#', '&', '+', '!'];

/// Returns `true` if `target` names a room rather than a user.
pub fn is_channel(target: &str) -> bool {
    target.starts_with(CHANNEL_PREFIXES)
}

/// Something that happened on the transport, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The server accepted our registration. Channels can be joined now.
    Welcome,

    /// A user (possibly us) joined a channel.
    Join { nick: String, channel: String },

    /// A user left the network.
    Quit { nick: String, reason: String },

    /// A line was broadcast to a channel.
    RoomMessage {
        sender: String,
        channel: String,
        text: String,
    },

    /// A line was sent directly to us.
    PrivateMessage { sender: String, text: String },

    /// The nickname we asked for is already taken.
    NicknameInUse { nick: String },

    /// Part of the member list of a channel, space separated.
    Roster { channel: String, members: String },

    /// Informational notice from the server or a user.
    Notice { sender: String, text: String },

    /// Answer to one of our pings.
    Pong { server: String },
}

/// Establishes connections to a chat server.
pub trait Connector {
    /// The transport type produced by this connector.
    type Transport: ChatTransport;

    /// Connects to `server:port` and registers as `identity`.
    ///
    /// Fails with [`TransportError::ServerConnection`] when the server is
    /// unreachable.
    async fn connect(
        &self,
        server: &str,
        port: u16,
        identity: &str,
    ) -> Result<Self::Transport, TransportError>;
}

/// A live connection to a chat server.
///
/// All methods are non-blocking. Send methods only queue the line for
/// delivery; they fail with [`TransportError::NotConnected`] once the link
/// is known to be down.
pub trait ChatTransport {
    /// Joins a channel.
    fn join_channel(&mut self, channel: &str) -> Result<(), TransportError>;

    /// Sends one line of text to a channel or a user.
    fn send_line(&mut self, target: &str, text: &str) -> Result<(), TransportError>;

    /// Pings the server. The answer arrives as [`TransportEvent::Pong`].
    fn ping(&mut self, server: &str) -> Result<(), TransportError>;

    /// Sets a mode on a channel or user.
    fn set_mode(&mut self, target: &str, mode: &str) -> Result<(), TransportError>;

    /// Requests a different nickname.
    fn change_nick(&mut self, nick: &str) -> Result<(), TransportError>;

    /// Leaves the network. Nothing can be sent afterwards.
    fn quit(&mut self, reason: &str) -> Result<(), TransportError>;

    /// Waits until queued lines have been written out, so a final
    /// [`quit`](Self::quit) is not lost when the transport is dropped.
    async fn flush(&mut self) {}

    /// Returns the next buffered event, or `None` when nothing is pending.
    fn poll_event(&mut self) -> Option<TransportEvent>;

    /// The nickname this connection currently uses.
    fn nickname(&self) -> &str;

    /// Whether the underlying link is still up.
    fn is_open(&self) -> bool;
}
