//! Fuzz target for router configuration documents.

#![no_main]

use dbroute::RouterConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(config) = serde_json::from_slice::<RouterConfig>(data) {
        for params in config.roles.values() {
            let _ = params.validate();
        }
        let _ = config.replica_selection.selector();
    }
});
