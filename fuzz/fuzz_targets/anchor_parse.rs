//! Fuzz harness for versioned anchor parsing.
//!
//! Inputs are treated as UTF-8 JSON. Parsing must never panic, and an
//! accepted anchor must survive a render and re-parse unchanged apart from
//! its version, which is always rendered as the newest.

#![no_main]
use cpv_core::anchor::{Anchor, AnchorVersion};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(anchor) = Anchor::from_json_str(text) else {
        return;
    };
    let rendered = serde_json::to_value(&anchor).expect("anchor renders");
    let reparsed = Anchor::from_value(rendered).expect("rendered anchor parses");
    assert_eq!(reparsed.version, AnchorVersion::LATEST);
    assert_eq!(reparsed.anchor_id, anchor.anchor_id);
    assert_eq!(reparsed.merkle, anchor.merkle);
});
