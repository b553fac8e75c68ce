//! Fuzz target for the HTTP parameter decoder.
//!
//! Run with: cargo +nightly fuzz run fuzz_http_form
//!
//! `Command::from_form` must accept any query string or body. A channel it
//! returns is never zero.

#![no_main]

use crelay_core::Command;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let input = String::from_utf8_lossy(data);
    let command = Command::from_form(&input);
    if let Some(channel) = command.action.channel() {
        assert_ne!(channel, 0);
    }
});
