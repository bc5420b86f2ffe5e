//! Fuzz target for role name parsing.
//!
//! A role that parses must render back to a string that parses to the same
//! role.

#![no_main]

use dbroute::Role;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    if let Ok(role) = data.parse::<Role>() {
        let rendered = role.to_string();
        assert_eq!(rendered.parse::<Role>().ok(), Some(role));
    }
});
