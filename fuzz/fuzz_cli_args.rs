//! Fuzz target for the command-line grammar.
//!
//! Run with: cargo +nightly fuzz run fuzz_cli_args
//!
//! Splits the input on whitespace and feeds it to `Command::from_args`.

#![no_main]

use crelay_core::Command;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let words: Vec<&str> = s.split_whitespace().collect();
        let _ = Command::from_args(&words);
    }
});
