//! Unified error type for the Mystery Online client core.

use mystery_protocol::ProtocolError;
use mystery_session::SessionError;
use mystery_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates the `From` impls, so
/// `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum MysteryError {
    /// A transport-level error (connect, send).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (malformed envelope, unknown tag).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (unreachable server, bad channel, nickname).
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl MysteryError {
    /// `true` for errors that end the client: the server could not be
    /// reached or the configured room is not a channel.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Session(SessionError::ServerConnection(_) | SessionError::ChannelConnection(_))
                | Self::Transport(TransportError::ServerConnection(_))
        )
    }
}
