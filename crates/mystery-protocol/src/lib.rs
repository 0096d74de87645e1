//! Wire protocol for Mystery Online.
//!
//! This crate defines what travels inside a chat room line:
//!
//! - **Types** ([`Envelope`], [`Kind`], [`Tag`], [`ChatMessage`], etc.):
//!   the message values the rest of the client works with.
//! - **Codec** ([`encode_chat`], [`decode_chat`], [`classify`], ...):
//!   how those values map to and from a flat `#`-delimited string.
//! - **Errors** ([`ProtocolError`]): what can go wrong while decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (lines of text) and session
//! (queues and sends). It doesn't know about connections; it only knows
//! how to build and take apart lines.
//!
//! ```text
//! Transport (lines) → Protocol (Envelope) → Session (queues, sends)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{
    CHAT_CONTROL_FIELDS, DELIMITER, PRIVATE_LINE_LIMIT, TRUNCATION_SUFFIX, classify,
    decode_chat, decode_tagged, encode_chat, encode_tagged, normalize_line_breaks,
    truncate_private,
};
pub use error::ProtocolError;
pub use types::{
    ChatFields, ChatMessage, DEFAULT_SENDER, Envelope, ItemPayload, Kind, MusicCommand,
    PrivateEnvelope, Roster, Tag, TaggedMessage,
};
