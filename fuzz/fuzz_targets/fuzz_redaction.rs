//! Fuzz testing for log redaction.
//!
//! Feeds arbitrary strings, and arbitrary JSON when the input parses, through
//! the redactor and checks that a second pass changes nothing.
//!
//! ```bash
//! cargo +nightly fuzz run fuzz_redaction
//! ```

#![no_main]

use std::sync::LazyLock;

use libfuzzer_sys::fuzz_target;
use prompt_gateway::redaction::LogRedactor;

static REDACTOR: LazyLock<LogRedactor> =
    LazyLock::new(|| LogRedactor::new().expect("built-in redaction rules compile"));

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let once = REDACTOR.redact_str(text);
    assert_eq!(REDACTOR.redact_str(&once), once);

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
        let once = REDACTOR.redact(&value);
        assert_eq!(REDACTOR.redact(&once), once);
    }
});
