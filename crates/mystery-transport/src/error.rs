/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The server could not be reached or refused the connection.
    #[error("could not connect to server: {0}")]
    ServerConnection(#[source] std::io::Error),

    /// The link is down; nothing can be sent until a new connection is made.
    #[error("not connected to server")]
    NotConnected,

    /// The connection was closed by the remote side.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Writing a line to the socket failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The wire codec could not be set up.
    #[error("codec error: {0}")]
    Codec(String),
}
