#![no_main]

use libfuzzer_sys::fuzz_target;

use promstore::codec::{decode, encode};

fuzz_target!(|data: &str| {
    // Group members are read back from a shared store and may be garbage.
    // Decoding must never panic, and whatever decodes must re-encode to a
    // key that decodes to the same name and labels.
    if let Ok((name, labels)) = decode(data) {
        let key = encode(&name, &labels, None);
        assert_eq!(decode(&key), Ok((name, labels)));
    }
});
