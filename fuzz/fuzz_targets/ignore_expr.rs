#![no_main]

use libfuzzer_sys::fuzz_target;
use tarantula::filter::IgnoreSet;

fuzz_target!(|data: &[u8]| {
    // Parsing must return an error, never panic
    if let Ok(input) = std::str::from_utf8(data) {
        let _ = IgnoreSet::from_expr(input);
    }
});
