//! Fuzz target for the TOML configuration parser.
//!
//! Run with: cargo +nightly fuzz run fuzz_config_parser
//!
//! Exercises `AppConfig::parse()` with arbitrary input. Whatever parses must
//! also pass the derived helpers without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(config) = crelay_config::AppConfig::parse(s) {
            let _ = config.gpio_pins();
            let _ = config.listen_addr();
            assert_eq!(config.labels_with_overrides(&[]).len(), 8);
        }
    }
});
