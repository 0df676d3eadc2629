#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Match payloads arrive as MESSAGE bodies; malformed ones must only error.
    let _ = serde_json::from_slice::<matchmaking_session::MatchEvent>(data);

    if let Ok(s) = std::str::from_utf8(data) {
        let _ = serde_json::from_str::<matchmaking_session::protocol::QueueStatus>(s);
    }
});
