//! Fuzz testing for prompt screening.
//!
//! Checks that the injection guard and the path validator:
//!
//! - Never panic on any input
//! - Never accept text that a plain rescan would flag
//! - Return trimmed text on success
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! # Install cargo-fuzz (requires nightly)
//! cargo +nightly install cargo-fuzz
//!
//! # Run the guard fuzz target
//! cargo +nightly fuzz run fuzz_guard
//!
//! # Run with a time limit (e.g., 60 seconds)
//! cargo +nightly fuzz run fuzz_guard -- -max_total_time=60
//! ```

#![no_main]

use std::sync::LazyLock;

use libfuzzer_sys::fuzz_target;
use prompt_gateway::validation::{
    DEFAULT_PROMPT_MAX_LENGTH, InjectionGuard, ValidationOptions, validate_file_path,
};

static GUARD: LazyLock<InjectionGuard> =
    LazyLock::new(|| InjectionGuard::new().expect("built-in signatures compile"));

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let options = ValidationOptions {
        min_length: 1,
        max_length: DEFAULT_PROMPT_MAX_LENGTH,
        required: true,
    };

    if let Ok(accepted) = GUARD.validate_text(text, "prompt", &options) {
        assert_eq!(accepted, text.trim());
        assert!(GUARD.scan(text).is_none());
    }

    let _ = validate_file_path(text);
});
