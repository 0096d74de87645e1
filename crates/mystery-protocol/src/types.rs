//! Protocol types: envelopes, kinds, tags, and the decoded message shapes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::codec::{self, DELIMITER};
use crate::ProtocolError;

/// Sender of an envelope authored locally and not yet attributed by a
/// remote echo.
pub const DEFAULT_SENDER: &str = "default";

// ---------------------------------------------------------------------------
// Kind / Tag
// ---------------------------------------------------------------------------

/// The semantic category of a wire line, derived by [`codec::classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    #[serde(rename = "chat")]
    Chat,
    #[serde(rename = "char")]
    Char,
    #[serde(rename = "OOC")]
    Ooc,
    #[serde(rename = "music")]
    Music,
    #[serde(rename = "loc")]
    Loc,
    #[serde(rename = "roll")]
    Roll,
    #[serde(rename = "item")]
    Item,
    #[serde(rename = "clear")]
    Clear,
    /// No rule matched. Dispatch drops these.
    #[serde(rename = "unknown")]
    Unknown,
}

impl Kind {
    /// The tag that produces this kind on the wire, if it is a tagged kind.
    pub fn tag(self) -> Option<Tag> {
        match self {
            Self::Char => Some(Tag::Char),
            Self::Ooc => Some(Tag::Ooc),
            Self::Music => Some(Tag::Music),
            Self::Loc => Some(Tag::Loc),
            Self::Roll => Some(Tag::Roll),
            Self::Item => Some(Tag::Item),
            Self::Clear => Some(Tag::Clear),
            Self::Chat | Self::Unknown => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Char => "char",
            Self::Ooc => "OOC",
            Self::Music => "music",
            Self::Loc => "loc",
            Self::Roll => "roll",
            Self::Item => "item",
            Self::Clear => "clear",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Short literal prefix identifying a non-chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tag {
    #[serde(rename = "char")]
    Char,
    #[serde(rename = "OOC")]
    Ooc,
    #[serde(rename = "music")]
    Music,
    #[serde(rename = "loc")]
    Loc,
    #[serde(rename = "roll")]
    Roll,
    #[serde(rename = "item")]
    Item,
    #[serde(rename = "clear")]
    Clear,
}

impl Tag {
    /// The literal written before the first `#` on the wire.
    pub fn wire(self) -> &'static str {
        match self {
            Self::Char => "c",
            Self::Ooc => "OOC",
            Self::Music => "m",
            Self::Loc => "l",
            Self::Roll => "r",
            Self::Item => "i",
            Self::Clear => "cl",
        }
    }

    /// The kind a line carrying this tag classifies as.
    pub fn kind(self) -> Kind {
        match self {
            Self::Char => Kind::Char,
            Self::Ooc => Kind::Ooc,
            Self::Music => Kind::Music,
            Self::Loc => Kind::Loc,
            Self::Roll => Kind::Roll,
            Self::Item => Kind::Item,
            Self::Clear => Kind::Clear,
        }
    }

    /// Whether a send with this tag is also recorded in the sender's own
    /// message queue.
    ///
    /// Character, location and music changes are applied to local state by
    /// the caller directly, so they are not echoed.
    pub fn mirrors_locally(self) -> bool {
        matches!(self, Self::Ooc | Self::Roll | Self::Item | Self::Clear)
    }
}

impl FromStr for Tag {
    type Err = ProtocolError;

    /// Parses the kind name (`"char"`, `"OOC"`, `"music"`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "char" => Ok(Self::Char),
            "OOC" => Ok(Self::Ooc),
            "music" => Ok(Self::Music),
            "loc" => Ok(Self::Loc),
            "roll" => Ok(Self::Roll),
            "item" => Ok(Self::Item),
            "clear" => Ok(Self::Clear),
            other => Err(ProtocolError::UnknownTag(other.to_string())),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.kind(), f)
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// One line of protocol payload plus the user it is attributed to.
///
/// The body never contains `\n` or `\r`; every constructor replaces them
/// with spaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Envelope {
    body: String,
    sender: String,
}

impl Envelope {
    /// Wraps a raw line received from `sender`.
    pub fn new(body: impl Into<String>, sender: impl Into<String>) -> Self {
        let body: String = body.into();
        let body = if body.contains(['\n', '\r']) {
            codec::normalize_line_breaks(&body).into_owned()
        } else {
            body
        };
        Self {
            body,
            sender: sender.into(),
        }
    }

    /// Wraps a locally authored line ([`DEFAULT_SENDER`]).
    pub fn local(body: impl Into<String>) -> Self {
        Self::new(body, DEFAULT_SENDER)
    }

    /// Builds a chat envelope.
    pub fn chat(fields: &ChatFields, text: &str, sender: impl Into<String>) -> Self {
        Self::new(codec::encode_chat(fields, text), sender)
    }

    /// Builds a tagged envelope.
    pub fn tagged(tag: Tag, payload: &str, sender: impl Into<String>) -> Self {
        Self::new(codec::encode_tagged(tag, payload), sender)
    }

    /// The wire text.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Who the envelope is attributed to.
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// `true` if authored locally and never echoed back.
    pub fn is_local(&self) -> bool {
        self.sender == DEFAULT_SENDER
    }

    /// Classifies the body. Recomputed on every call.
    pub fn kind(&self) -> Kind {
        codec::classify(&self.body)
    }

    /// Decodes the body as a chat line.
    pub fn decode_chat(&self) -> Result<ChatMessage, ProtocolError> {
        codec::decode_chat(&self.body, &self.sender)
    }

    /// Decodes the body as a tagged line.
    pub fn decode_tagged(&self) -> Result<TaggedMessage, ProtocolError> {
        codec::decode_tagged(&self.body, &self.sender)
    }

    /// Consumes the envelope, returning the wire text.
    pub fn into_body(self) -> String {
        self.body
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.body)
    }
}

// ---------------------------------------------------------------------------
// Decoded messages
// ---------------------------------------------------------------------------

/// The seven control fields of a chat line, in wire order.
///
/// Values are kept as text: the protocol does not interpret them, and
/// peers are free to send anything that has no `#` in it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatFields {
    pub location: String,
    pub sublocation: String,
    pub character: String,
    pub sprite_id: String,
    pub position: String,
    pub color_id: String,
    pub sprite_option: String,
}

/// A decoded chat line: `(sender, loc, subloc, char, spriteId, pos,
/// colorId, spriteOption, text)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: String,
    pub fields: ChatFields,
    pub text: String,
}

impl ChatMessage {
    /// `true` if this is our own message rather than a remote echo.
    pub fn is_local(&self) -> bool {
        self.sender == DEFAULT_SENDER
    }
}

/// A decoded tagged line: `(payload, sender)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedMessage {
    pub payload: String,
    pub sender: String,
}

/// A direct message. The receiver is recorded but a session has a single
/// mailbox, so it is not used for routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateEnvelope {
    pub body: String,
    pub sender: String,
    pub receiver: String,
}

impl PrivateEnvelope {
    pub fn new(
        body: impl Into<String>,
        sender: impl Into<String>,
        receiver: impl Into<String>,
    ) -> Self {
        Self {
            body: body.into(),
            sender: sender.into(),
            receiver: receiver.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tagged payloads
// ---------------------------------------------------------------------------

/// Payload of a music message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MusicCommand {
    /// Start playing the track at this URL.
    Play(String),
    /// Stop the current track.
    Stop,
}

impl MusicCommand {
    /// Wire literal for [`MusicCommand::Stop`].
    pub const STOP: &'static str = "stop";

    pub fn from_payload(payload: &str) -> Self {
        if payload == Self::STOP {
            Self::Stop
        } else {
            Self::Play(payload.to_string())
        }
    }

    pub fn to_payload(&self) -> &str {
        match self {
            Self::Play(url) => url,
            Self::Stop => Self::STOP,
        }
    }
}

/// Payload of an item message: `name#type#description#image`.
///
/// Only the first three `#` separate fields, so the image reference may
/// itself contain `#`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPayload {
    pub name: String,
    pub item_type: String,
    pub description: String,
    pub image: String,
}

impl ItemPayload {
    const FIELDS: usize = 4;

    /// Parses an item payload.
    ///
    /// # Errors
    /// [`ProtocolError::MalformedEnvelope`] if fewer than four fields are
    /// present.
    pub fn parse(payload: &str) -> Result<Self, ProtocolError> {
        let parts: Vec<&str> = payload.splitn(Self::FIELDS, DELIMITER).collect();
        match parts.as_slice() {
            [name, item_type, description, image] => Ok(Self {
                name: (*name).to_string(),
                item_type: (*item_type).to_string(),
                description: (*description).to_string(),
                image: (*image).to_string(),
            }),
            _ => Err(ProtocolError::malformed(
                Kind::Item,
                format!("expected {} item fields, got {}", Self::FIELDS, parts.len()),
            )),
        }
    }

    /// Joins the fields back into a payload.
    pub fn to_payload(&self) -> String {
        format!(
            "{}#{}#{}#{}",
            self.name, self.item_type, self.description, self.image
        )
    }
}

/// Channel status markers that may precede a nick in a roster reply.
const STATUS_PREFIXES: [char; 5] = ['@', '+', '%', '&', '~'];

/// Members of the room as announced by a roster reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    pub members: Vec<String>,
}

impl Roster {
    /// Parses a space separated member list, dropping status markers and
    /// the local user.
    pub fn parse(list: &str, local_nick: &str) -> Self {
        let members = list
            .split_whitespace()
            .map(|nick| nick.trim_start_matches(STATUS_PREFIXES))
            .filter(|nick| !nick.is_empty() && *nick != local_nick)
            .map(str::to_string)
            .collect();
        Self { members }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // =====================================================================
    // Envelope
    // =====================================================================

    #[test]
    fn test_envelope_new_normalizes_line_breaks() {
        let env = Envelope::new("one\ntwo\rthree", "ann");
        assert_eq!(env.body(), "one two three");
        assert_eq!(env.to_string(), "one two three");
    }

    #[test]
    fn test_envelope_local_uses_default_sender() {
        let env = Envelope::local("OOC#hi");
        assert_eq!(env.sender(), DEFAULT_SENDER);
        assert!(env.is_local());
    }

    #[test]
    fn test_envelope_kind_is_derived_from_body() {
        assert_eq!(Envelope::local("r#2d4: 5").kind(), Kind::Roll);
        assert_eq!(Envelope::local("plain text").kind(), Kind::Unknown);
    }

    #[test]
    fn test_envelope_tagged_round_trip() {
        let env = Envelope::tagged(Tag::Roll, "3d6: 14", "ann");
        assert_eq!(env.body(), "r#3d6: 14");
        assert_eq!(env.kind(), Kind::Roll);
        let msg = env.decode_tagged().unwrap();
        assert_eq!(msg.payload, "3d6: 14");
        assert_eq!(msg.sender, "ann");
    }

    #[test]
    fn test_envelope_chat_decode_carries_sender() {
        let fields = ChatFields {
            location: "Hall".into(),
            ..ChatFields::default()
        };
        let env = Envelope::chat(&fields, "hi", "ann");
        assert_eq!(env.kind(), Kind::Chat);
        let msg = env.decode_chat().unwrap();
        assert_eq!(msg.sender, "ann");
        assert_eq!(msg.fields.location, "Hall");
        assert_eq!(msg.text, "hi");
        assert!(!msg.is_local());
    }

    #[test]
    fn test_envelope_serializes_body_and_sender() {
        let json = serde_json::to_value(Envelope::new("OOC#x", "ann")).unwrap();
        assert_eq!(json["body"], "OOC#x");
        assert_eq!(json["sender"], "ann");
    }

    // =====================================================================
    // Tag / Kind
    // =====================================================================

    #[test]
    fn test_tag_wire_literals() {
        let expected = [
            (Tag::Char, "c"),
            (Tag::Ooc, "OOC"),
            (Tag::Music, "m"),
            (Tag::Loc, "l"),
            (Tag::Roll, "r"),
            (Tag::Item, "i"),
            (Tag::Clear, "cl"),
        ];
        for (tag, wire) in expected {
            assert_eq!(tag.wire(), wire);
            assert_eq!(codec::classify(&format!("{wire}#x")), tag.kind());
            assert_eq!(tag.kind().tag(), Some(tag));
        }
    }

    #[test]
    fn test_tag_from_str_kind_names() {
        assert_eq!("OOC".parse::<Tag>().unwrap(), Tag::Ooc);
        assert_eq!("clear".parse::<Tag>().unwrap(), Tag::Clear);
        assert!(matches!(
            "ooc".parse::<Tag>(),
            Err(ProtocolError::UnknownTag(t)) if t == "ooc"
        ));
    }

    #[test]
    fn test_tag_mirrors_locally_only_for_log_kinds() {
        assert!(Tag::Ooc.mirrors_locally());
        assert!(Tag::Roll.mirrors_locally());
        assert!(Tag::Item.mirrors_locally());
        assert!(Tag::Clear.mirrors_locally());
        assert!(!Tag::Char.mirrors_locally());
        assert!(!Tag::Music.mirrors_locally());
        assert!(!Tag::Loc.mirrors_locally());
    }

    #[test]
    fn test_kind_display_and_serde_names_match() {
        assert_eq!(Kind::Ooc.to_string(), "OOC");
        assert_eq!(Tag::Music.to_string(), "music");
        let json = serde_json::to_string(&Kind::Unknown).unwrap();
        assert_eq!(json, "\"unknown\"");
        let kind: Kind = serde_json::from_str("\"OOC\"").unwrap();
        assert_eq!(kind, Kind::Ooc);
    }

    #[test]
    fn test_chat_and_unknown_have_no_tag() {
        assert_eq!(Kind::Chat.tag(), None);
        assert_eq!(Kind::Unknown.tag(), None);
    }

    // =====================================================================
    // Payloads
    // =====================================================================

    #[test]
    fn test_music_command_stop_and_play() {
        assert_eq!(MusicCommand::from_payload("stop"), MusicCommand::Stop);
        assert_eq!(
            MusicCommand::from_payload("http://a/b.mp3"),
            MusicCommand::Play("http://a/b.mp3".into())
        );
        assert_eq!(MusicCommand::Stop.to_payload(), "stop");
    }

    #[test]
    fn test_item_payload_parse_four_fields() {
        let item = ItemPayload::parse("Knife#weapon#Very sharp#http://x/k.png#v2").unwrap();
        assert_eq!(item.name, "Knife");
        assert_eq!(item.item_type, "weapon");
        assert_eq!(item.description, "Very sharp");
        assert_eq!(item.image, "http://x/k.png#v2");
    }

    #[test]
    fn test_item_payload_too_few_fields_is_malformed() {
        let err = ItemPayload::parse("Knife#weapon").unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::MalformedEnvelope { kind: Kind::Item, .. }
        ));
    }

    #[test]
    fn test_item_payload_to_payload_round_trip() {
        let raw = "Key#key#Opens the shed#key.png";
        assert_eq!(ItemPayload::parse(raw).unwrap().to_payload(), raw);
    }

    #[test]
    fn test_roster_parse_strips_prefixes_and_self() {
        let roster = Roster::parse("@me +ann bob  %carl", "me");
        assert_eq!(roster.members, vec!["ann", "bob", "carl"]);
        assert_eq!(roster.len(), 3);
    }

    #[test]
    fn test_roster_parse_empty() {
        assert!(Roster::parse("   ", "me").is_empty());
    }
}
