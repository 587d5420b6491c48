#![no_main]

use libfuzzer_sys::fuzz_target;
use stepwatch::wire::{decode_sessions, encode_session};

fuzz_target!(|data: &[u8]| {
    // Remote payloads are untrusted: decode may fail but must not panic,
    // and whatever decodes must re-encode and validate cleanly.
    if let Ok(sessions) = decode_sessions(data) {
        for session in &sessions {
            let _ = session.validate();
            let _ = session.correlation_links();
            let _ = encode_session(session);
        }
    }
});
