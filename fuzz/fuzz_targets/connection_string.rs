//! Fuzz target for connection string parsing.
//!
//! Parsing must never panic, and anything that parses must survive
//! validation and pool-config mapping without panicking either.

#![no_main]

use arbitrary::Arbitrary;
use dbroute::{ConnectionParameters, Role};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    pairs: Vec<(String, String)>,
    raw: String,
}

fuzz_target!(|input: Input| {
    if let Ok(params) = ConnectionParameters::from_connection_string(&input.raw) {
        let _ = params.validate();
        let _ = params.pool_config(Role::Primary).validate();
    }

    let joined: String = input
        .pairs
        .iter()
        .map(|(k, v)| format!("{k}={v};"))
        .collect();
    if let Ok(params) = ConnectionParameters::from_connection_string(&joined) {
        let _ = params.validate();
        let _ = params.effective_acquire_timeout();
    }
});
