//! Fuzz harness for the RFC 3161 token parser.
//!
//! Arbitrary bytes are fed both as a bare `TimeStampToken` and through the
//! `TimeStampResp` unwrapping path. The parser must return a typed error on
//! malformed DER, never panic, and any token it accepts must carry a
//! non-empty imprint.

#![no_main]
use cpv_core::tsa::{DerTimestampTokenParser, TimestampTokenParser, token_der};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let parser = DerTimestampTokenParser;
    if let Ok(token) = parser.parse(data) {
        assert!(!token.hashed_message.is_empty());
    }
    if let Ok(der) = token_der(data) {
        assert!(der.len() <= data.len());
        let _ = parser.parse(der);
    }
});
