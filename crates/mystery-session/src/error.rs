//! Error types for the session layer.

use mystery_protocol::ProtocolError;
use mystery_transport::TransportError;

/// Errors that can occur while running a chat session.
///
/// `ServerConnection` and `ChannelConnection` are fatal. `NotConnected`
/// means the link dropped; it is reported to the liveness monitor rather
/// than ending the program. `NicknameConflict` can be resolved by picking
/// another nickname.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The server could not be reached when the session was created.
    #[error("could not connect to server: {0}")]
    ServerConnection(#[source] TransportError),

    /// The configured room is not a channel name.
    #[error("could not connect to {0}: not a channel")]
    ChannelConnection(String),

    /// A send was attempted while the link is down.
    #[error("not connected to server")]
    NotConnected,

    /// The nickname is taken and no alternative was supplied.
    #[error("nickname {0} is already in use")]
    NicknameConflict(String),

    /// A line could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::ServerConnection(_) | TransportError::Codec(_) => {
                Self::ServerConnection(err)
            }
            TransportError::NotConnected
            | TransportError::ConnectionClosed(_)
            | TransportError::SendFailed(_) => Self::NotConnected,
        }
    }
}

impl SessionError {
    /// `true` for errors the liveness monitor should turn into a
    /// disconnect notification.
    pub fn is_link_down(&self) -> bool {
        matches!(self, Self::NotConnected)
    }
}
