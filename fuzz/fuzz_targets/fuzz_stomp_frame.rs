#![no_main]

use libfuzzer_sys::fuzz_target;
use matchmaking_session::stomp;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(Some(frame)) = stomp::decode(text) {
        // A decoded frame must survive its own encoding.
        let again = stomp::decode(&frame.encode());
        assert!(matches!(again, Ok(Some(_))));
    }
});
