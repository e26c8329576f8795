//! SHA-256 digests and the `sha256:<hex>` string form.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{VerifyError, VerifyResult};

/// Size of a SHA-256 digest in bytes.
pub const HASH_SIZE: usize = 32;

/// Type alias for a 32-byte digest.
pub type Hash = [u8; HASH_SIZE];

/// Literal prefix carried by every prefixed hash string.
pub const HASH_PREFIX: &str = "sha256:";

/// The zero digest used as `PrevHash` of the first event in a chain.
pub const GENESIS_PREV_HASH: Hash = [0u8; HASH_SIZE];

/// Computes SHA-256 over `data`.
#[must_use]
pub fn sha256(data: &[u8]) -> Hash {
    Sha256::digest(data).into()
}

/// Computes SHA-256 over the concatenation `left || right`.
#[must_use]
pub fn sha256_concat(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Formats a digest as `sha256:` followed by 64 lowercase hex characters.
#[must_use]
pub fn to_prefixed(hash: &Hash) -> String {
    format!("{HASH_PREFIX}{}", hex::encode(hash))
}

/// Formats a digest as 64 lowercase hex characters with no prefix.
#[must_use]
pub fn to_bare_hex(hash: &Hash) -> String {
    hex::encode(hash)
}

/// The genesis `PrevHash` in string form.
#[must_use]
pub fn genesis_prev_hash() -> String {
    to_prefixed(&GENESIS_PREV_HASH)
}

/// Parses a hash string that must carry the `sha256:` prefix.
///
/// The prefix and the hex digits are matched case-insensitively.
///
/// # Errors
///
/// Returns [`VerifyError::EncodingError`] if the prefix is missing or the
/// remainder is not exactly 64 hex characters.
pub fn parse_prefixed(value: &str) -> VerifyResult<Hash> {
    let Some(rest) = strip_prefix(value) else {
        return Err(VerifyError::encoding(format!(
            "hash '{value}' is missing the '{HASH_PREFIX}' prefix"
        )));
    };
    decode_hex32(rest)
}

/// Parses a hash string with or without the `sha256:` prefix.
///
/// # Errors
///
/// Returns [`VerifyError::EncodingError`] if the hex part is not exactly 64
/// hex characters.
pub fn parse_lenient(value: &str) -> VerifyResult<Hash> {
    decode_hex32(strip_prefix(value).unwrap_or(value))
}

/// Parses a bare 64-character hex string (no prefix allowed).
///
/// # Errors
///
/// Returns [`VerifyError::EncodingError`] if a prefix is present or the
/// value is not 64 hex characters.
pub fn parse_bare(value: &str) -> VerifyResult<Hash> {
    if strip_prefix(value).is_some() {
        return Err(VerifyError::encoding(format!(
            "value '{value}' must be bare hex without the '{HASH_PREFIX}' prefix"
        )));
    }
    decode_hex32(value)
}

/// Returns the value without its `sha256:` prefix, if the prefix is present.
#[must_use]
pub fn strip_prefix(value: &str) -> Option<&str> {
    let head = value.get(..HASH_PREFIX.len())?;
    head.eq_ignore_ascii_case(HASH_PREFIX)
        .then(|| &value[HASH_PREFIX.len()..])
}

/// Constant-time digest equality.
#[must_use]
pub fn digests_equal(a: &Hash, b: &Hash) -> bool {
    bool::from(a.ct_eq(b))
}

/// Returns true if `hash` is the all-zero genesis digest.
#[must_use]
pub fn is_genesis(hash: &Hash) -> bool {
    digests_equal(hash, &GENESIS_PREV_HASH)
}

fn decode_hex32(hex_part: &str) -> VerifyResult<Hash> {
    if hex_part.len() != HASH_SIZE * 2 {
        return Err(VerifyError::encoding(format!(
            "expected {} hex characters, got {}",
            HASH_SIZE * 2,
            hex_part.len()
        )));
    }
    let mut out = [0u8; HASH_SIZE];
    hex::decode_to_slice(hex_part, &mut out)
        .map_err(|e| VerifyError::encoding(format!("invalid hex digest: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        // SHA-256("abc")
        assert_eq!(
            to_bare_hex(&sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_concat_matches_single_pass() {
        let a = sha256(b"left");
        let b = sha256(b"right");
        let mut joined = Vec::new();
        joined.extend_from_slice(&a);
        joined.extend_from_slice(&b);
        assert_eq!(sha256_concat(&a, &b), sha256(&joined));
        assert_ne!(sha256_concat(&a, &b), sha256_concat(&b, &a));
    }

    #[test]
    fn test_prefixed_round_trip_is_case_insensitive() {
        let hash = sha256(b"event");
        let upper = to_prefixed(&hash).to_uppercase();
        assert_eq!(parse_prefixed(&upper).unwrap(), hash);
        assert_eq!(parse_lenient(&to_bare_hex(&hash)).unwrap(), hash);
    }

    #[test]
    fn test_parse_prefixed_requires_prefix() {
        let bare = to_bare_hex(&sha256(b"x"));
        assert!(matches!(
            parse_prefixed(&bare),
            Err(VerifyError::EncodingError { .. })
        ));
    }

    #[test]
    fn test_parse_bare_rejects_prefix() {
        let prefixed = to_prefixed(&sha256(b"x"));
        assert!(parse_bare(&prefixed).is_err());
        assert!(parse_bare(&prefixed[HASH_PREFIX.len()..]).is_ok());
    }

    #[test]
    fn test_parse_rejects_wrong_length_and_non_hex() {
        assert!(parse_lenient("sha256:abcd").is_err());
        let bad = format!("sha256:{}", "zz".repeat(32));
        assert!(parse_lenient(&bad).is_err());
    }

    #[test]
    fn test_genesis() {
        let genesis = genesis_prev_hash();
        assert_eq!(genesis, format!("sha256:{}", "0".repeat(64)));
        assert!(is_genesis(&parse_prefixed(&genesis).unwrap()));
        assert!(!is_genesis(&sha256(b"")));
    }

    #[test]
    fn test_strip_prefix_handles_short_and_multibyte_input() {
        assert_eq!(strip_prefix("sha"), None);
        assert_eq!(strip_prefix("ßßßßß"), None);
        assert_eq!(strip_prefix("SHA256:ab"), Some("ab"));
    }
}
