#![no_main]

use libfuzzer_sys::fuzz_target;
use std::path::Path;
use timeguard::config::TimingConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Must reject or accept, never panic
        let _ = TimingConfig::parse(input, Path::new("tconfig.txt"));
    }
});
