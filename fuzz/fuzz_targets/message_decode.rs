#![no_main]
use arbitrary::Arbitrary;
use blocknet::networking::message::{Message, MessageType};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    tagged: bool,
    handshake_pending: bool,
    bytes: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let decoded = if input.tagged {
        Message::decode_tagged(&input.bytes, 1 << 16)
    } else {
        // Block-announce frames carry no tag; the type comes from handshake state.
        let ty = if input.handshake_pending {
            MessageType::BlockAnnounceHandshake
        } else {
            MessageType::BlockAnnounce
        };
        Message::decode_untagged(ty, &input.bytes, 1 << 16)
    };
    if let Ok(msg) = decoded {
        // Canonical encoding: whatever decodes re-encodes to the same bytes.
        let again = if input.tagged {
            msg.encode_tagged()
        } else {
            msg.encode_untagged()
        };
        assert_eq!(again.ok().as_deref(), Some(&input.bytes[..]));
    }
});
