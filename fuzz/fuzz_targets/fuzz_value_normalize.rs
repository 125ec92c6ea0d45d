#![no_main]

use libfuzzer_sys::fuzz_target;

use promstore::render::normalize_value;

fuzz_target!(|data: &str| {
    // Stored values come from other processes. Normalizing must not panic
    // and a normalized value must be stable.
    if let Some(value) = normalize_value(data) {
        assert_eq!(normalize_value(&value).as_deref(), Some(value.as_str()));
    }
});
