use mystery_protocol::{
    ChatFields, Kind, classify, decode_chat, encode_chat, normalize_line_breaks,
};
use proptest::prelude::*;

/// A control field: anything without the delimiter or a line break.
fn field() -> impl Strategy<Value = String> {
    "[^#\r\n]{0,12}"
}

fn fields_strategy() -> impl Strategy<Value = ChatFields> {
    (field(), field(), field(), field(), field(), field(), field()).prop_map(
        |(location, sublocation, character, sprite_id, position, color_id, sprite_option)| {
            ChatFields {
                location,
                sublocation,
                character,
                sprite_id,
                position,
                color_id,
                sprite_option,
            }
        },
    )
}

proptest! {
    #[test]
    fn prop_chat_roundtrip(
        fields in fields_strategy(),
        text in any::<String>(),
        sender in "[a-zA-Z0-9_]{1,9}",
    ) {
        let line = encode_chat(&fields, &text);
        let message = decode_chat(&line, &sender).unwrap();

        prop_assert_eq!(message.sender, sender);
        prop_assert_eq!(message.fields, fields);
        prop_assert_eq!(message.text, normalize_line_breaks(&text).into_owned());
    }

    #[test]
    fn prop_encoded_chat_classifies_as_chat(fields in fields_strategy(), text in any::<String>()) {
        prop_assert_eq!(classify(&encode_chat(&fields, &text)), Kind::Chat);
    }

    // Dense in `#` so both sides of the threshold are hit often.
    #[test]
    fn prop_classify_chat_iff_seven_delimiters(raw in "[#a-zA-Z ]{0,40}") {
        let is_chat = classify(&raw) == Kind::Chat;
        prop_assert_eq!(is_chat, raw.matches('#').count() >= 7);
    }

    #[test]
    fn prop_classify_chat_iff_seven_delimiters_any_text(raw in any::<String>()) {
        let is_chat = classify(&raw) == Kind::Chat;
        prop_assert_eq!(is_chat, raw.matches('#').count() >= 7);
    }
}
