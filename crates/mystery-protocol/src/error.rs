//! Error types for the protocol layer.
//!
//! Classification never fails, so these errors only show up when a caller
//! decodes a line as a kind it does not have, or when a peer sends a
//! payload whose inner structure is wrong (an item with missing fields).

use crate::Kind;

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The line does not have the shape its kind requires.
    #[error("malformed {kind} envelope: {reason}")]
    MalformedEnvelope { kind: Kind, reason: String },

    /// A tag name that is not part of the protocol.
    #[error("unknown tag: {0}")]
    UnknownTag(String),
}

impl ProtocolError {
    pub(crate) fn malformed(kind: Kind, reason: impl Into<String>) -> Self {
        Self::MalformedEnvelope {
            kind,
            reason: reason.into(),
        }
    }
}
