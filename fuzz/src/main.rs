//! AFL harness for server response decoding.
//!
//! Every input is fed to the envelope decoder for both payload kinds and,
//! when it is UTF-8, to the version parser. Decoding may fail but must never
//! panic; AFL reports any panic as a crash.

use sonar::{
    api::{License, Pong, envelope::decode_reply},
    protocol::ProtocolVersion,
};

const MAX_INPUT: usize = 64 * 1024;

fn main() {
    afl::fuzz!(|data: &[u8]| {
        let Some(input) = data.get(..data.len().min(MAX_INPUT)) else {
            return;
        };
        drop(decode_reply::<Pong>(200, Some("OK"), input));
        drop(decode_reply::<License>(200, Some("OK"), input));
        drop(decode_reply::<Pong>(500, Some("Internal Server Error"), input));
        if let Ok(text) = std::str::from_utf8(input)
            && let Ok(version) = text.parse::<ProtocolVersion>()
        {
            assert_eq!(version.to_string().parse::<ProtocolVersion>(), Ok(version));
        }
    });
}
