//! The flat `#`-delimited wire format.
//!
//! Every application message travels as one line of text in a chat room.
//! Two shapes exist:
//!
//! ```text
//! chat:   loc#subloc#char#spriteId#pos#colorId#spriteOption#text
//! tagged: tag#payload            (tag ∈ c, OOC, m, l, r, i, cl)
//! ```
//!
//! A chat line has exactly seven delimiters before its free text, so any
//! line with seven or more `#` is read as chat. The free text itself may
//! contain `#`; decoding splits at most seven times so it survives intact.
//!
//! These functions are pure. The kind of a line is always recomputed from
//! its text, never stored.

use std::borrow::Cow;

use crate::{ChatFields, ChatMessage, Kind, ProtocolError, Tag, TaggedMessage};

/// Field separator on the wire.
pub const DELIMITER: char = '#';

/// Number of delimiters a chat line carries before its free text.
pub const CHAT_CONTROL_FIELDS: usize = 7;

/// Longest private message text that is put on the wire.
pub const PRIVATE_LINE_LIMIT: usize = 480;

/// Appended to private messages cut at [`PRIVATE_LINE_LIMIT`].
pub const TRUNCATION_SUFFIX: &str = "..";

/// Replaces `\n` and `\r` with spaces. The transport is line oriented.
pub fn normalize_line_breaks(text: &str) -> Cow<'_, str> {
    if text.contains(['\n', '\r']) {
        Cow::Owned(text.replace(['\n', '\r'], " "))
    } else {
        Cow::Borrowed(text)
    }
}

/// Joins the seven control fields and the text into a chat line.
pub fn encode_chat(fields: &ChatFields, text: &str) -> String {
    let line = format!(
        "{loc}#{subloc}#{char}#{sprite}#{pos}#{color}#{option}#{text}",
        loc = fields.location,
        subloc = fields.sublocation,
        char = fields.character,
        sprite = fields.sprite_id,
        pos = fields.position,
        color = fields.color_id,
        option = fields.sprite_option,
    );
    normalize_line_breaks(&line).into_owned()
}

/// Prefixes `payload` with the wire literal of `tag`.
pub fn encode_tagged(tag: Tag, payload: &str) -> String {
    let line = format!("{}{DELIMITER}{payload}", tag.wire());
    normalize_line_breaks(&line).into_owned()
}

/// Decodes a chat line received from `sender`.
///
/// # Errors
/// [`ProtocolError::MalformedEnvelope`] if the line has fewer than eight
/// segments. Lines that [`classify`] as [`Kind::Chat`] always have enough.
pub fn decode_chat(raw: &str, sender: &str) -> Result<ChatMessage, ProtocolError> {
    let mut parts = raw.splitn(CHAT_CONTROL_FIELDS + 1, DELIMITER);
    let mut next = || {
        parts.next().ok_or_else(|| {
            ProtocolError::malformed(
                Kind::Chat,
                format!("expected {} fields", CHAT_CONTROL_FIELDS + 1),
            )
        })
    };

    let fields = ChatFields {
        location: next()?.to_string(),
        sublocation: next()?.to_string(),
        character: next()?.to_string(),
        sprite_id: next()?.to_string(),
        position: next()?.to_string(),
        color_id: next()?.to_string(),
        sprite_option: next()?.to_string(),
    };
    let text = next()?.to_string();

    Ok(ChatMessage {
        sender: sender.to_string(),
        fields,
        text,
    })
}

/// Decodes a tagged line received from `sender`, returning everything after
/// the first delimiter as the payload.
///
/// # Errors
/// [`ProtocolError::MalformedEnvelope`] if the line has no delimiter.
pub fn decode_tagged(raw: &str, sender: &str) -> Result<TaggedMessage, ProtocolError> {
    let (_, payload) = raw
        .split_once(DELIMITER)
        .ok_or_else(|| ProtocolError::malformed(classify(raw), "missing tag delimiter"))?;
    Ok(TaggedMessage {
        payload: payload.to_string(),
        sender: sender.to_string(),
    })
}

/// Determines the kind of a wire line. First matching rule wins.
pub fn classify(raw: &str) -> Kind {
    if raw.matches(DELIMITER).count() >= CHAT_CONTROL_FIELDS {
        return Kind::Chat;
    }
    // Checked in this order so that the result is stable for every peer.
    const PREFIXES: [(&str, Kind); 7] = [
        ("c#", Kind::Char),
        ("OOC#", Kind::Ooc),
        ("m#", Kind::Music),
        ("l#", Kind::Loc),
        ("r#", Kind::Roll),
        ("i#", Kind::Item),
        ("cl#", Kind::Clear),
    ];
    PREFIXES
        .iter()
        .find(|(prefix, _)| raw.starts_with(prefix))
        .map_or(Kind::Unknown, |&(_, kind)| kind)
}

/// Cuts private message text to [`PRIVATE_LINE_LIMIT`] characters plus
/// [`TRUNCATION_SUFFIX`]. Shorter text is returned unchanged.
pub fn truncate_private(text: &str) -> Cow<'_, str> {
    match text.char_indices().nth(PRIVATE_LINE_LIMIT) {
        Some((cut, _)) => Cow::Owned(format!("{}{TRUNCATION_SUFFIX}", &text[..cut])),
        None => Cow::Borrowed(text),
    }
}
