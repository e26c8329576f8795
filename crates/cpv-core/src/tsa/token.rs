//! RFC 3161 time-stamp token parsing.
//!
//! Only the members needed for anchor cross-checks are extracted: the
//! `MessageImprint` and `genTime` from the embedded `TSTInfo`, plus policy,
//! serial number and nonce for diagnostics. The CMS signature over `TSTInfo`
//! and the TSA certificate chain are the concern of a
//! [`TsaTrustValidator`](super::TsaTrustValidator).
//!
//! ```text
//! TimeStampResp ::= SEQUENCE { status PKIStatusInfo, timeStampToken ContentInfo OPTIONAL }
//! ContentInfo   ::= SEQUENCE { contentType id-signedData, [0] EXPLICIT SignedData }
//! SignedData    ::= SEQUENCE { version, digestAlgorithms SET, encapContentInfo,
//!                              [0] certificates OPTIONAL, [1] crls OPTIONAL, signerInfos SET }
//! EncapContent  ::= SEQUENCE { id-ct-TSTInfo, [0] EXPLICIT OCTET STRING }
//! TSTInfo       ::= SEQUENCE { version, policy, messageImprint, serialNumber, genTime,
//!                              accuracy OPTIONAL, ordering OPTIONAL, nonce OPTIONAL, ... }
//! ```

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::der::{
    self, DerError, DerReader, TAG_BOOLEAN, TAG_CONTEXT_0, TAG_CONTEXT_1, TAG_GENERALIZED_TIME,
    TAG_INTEGER, TAG_OCTET_STRING, TAG_OID, TAG_SEQUENCE, TAG_SET, Tlv,
};
use crate::error::{VerifyError, VerifyResult};

/// `id-signedData` (1.2.840.113549.1.7.2).
pub const OID_SIGNED_DATA: &str = "1.2.840.113549.1.7.2";
/// `id-ct-TSTInfo` (1.2.840.113549.1.9.16.1.4).
pub const OID_TST_INFO: &str = "1.2.840.113549.1.9.16.1.4";
/// `id-sha256`.
pub const OID_SHA256: &str = "2.16.840.1.101.3.4.2.1";
/// `id-sha384`.
pub const OID_SHA384: &str = "2.16.840.1.101.3.4.2.2";
/// `id-sha512`.
pub const OID_SHA512: &str = "2.16.840.1.101.3.4.2.3";
/// `id-sha1`.
pub const OID_SHA1: &str = "1.3.14.3.2.26";

/// Digest algorithm named by a message imprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    /// SHA-1.
    Sha1,
    /// SHA-256.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
    /// Anything else, by dotted OID or by name as written.
    Other(String),
}

impl DigestAlgorithm {
    /// Maps a dotted OID.
    #[must_use]
    pub fn from_oid(oid: &str) -> Self {
        match oid {
            OID_SHA256 => Self::Sha256,
            OID_SHA384 => Self::Sha384,
            OID_SHA512 => Self::Sha512,
            OID_SHA1 => Self::Sha1,
            other => Self::Other(other.to_string()),
        }
    }

    /// Maps a textual name (`sha-256`, `SHA256`, ...) or a dotted OID.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "sha256" => Self::Sha256,
            "sha384" => Self::Sha384,
            "sha512" => Self::Sha512,
            "sha1" => Self::Sha1,
            _ => Self::from_oid(name.trim()),
        }
    }

    /// Digest size in bytes, when the algorithm is known.
    #[must_use]
    pub const fn output_len(&self) -> Option<usize> {
        match self {
            Self::Sha1 => Some(20),
            Self::Sha256 => Some(32),
            Self::Sha384 => Some(48),
            Self::Sha512 => Some(64),
            Self::Other(_) => None,
        }
    }

    /// Canonical name (`sha-256`, ...) or the raw identifier.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Sha1 => "sha-1",
            Self::Sha256 => "sha-256",
            Self::Sha384 => "sha-384",
            Self::Sha512 => "sha-512",
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for DigestAlgorithm {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for DigestAlgorithm {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_name(&String::deserialize(deserializer)?))
    }
}

/// Members extracted from a time-stamp token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedToken {
    /// `messageImprint.hashAlgorithm`.
    pub hash_algorithm: DigestAlgorithm,
    /// `messageImprint.hashedMessage`.
    #[serde(serialize_with = "hex_bytes")]
    pub hashed_message: Vec<u8>,
    /// `genTime`, the TSA-attested time.
    pub gen_time: DateTime<Utc>,
    /// TSA policy OID.
    pub policy: String,
    /// `serialNumber` content octets.
    #[serde(serialize_with = "hex_bytes")]
    pub serial_number: Vec<u8>,
    /// `nonce` content octets, if present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<Vec<u8>>,
}

impl ParsedToken {
    /// `hashedMessage` as lowercase hex.
    #[must_use]
    pub fn hashed_message_hex(&self) -> String {
        hex::encode(&self.hashed_message)
    }
}

#[allow(clippy::ptr_arg)]
fn hex_bytes<S: serde::Serializer>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

/// Extracts the imprint and time from DER token bytes.
pub trait TimestampTokenParser: Send + Sync {
    /// Parses DER-encoded `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::TokenUnparseable`] if `bytes` is not a
    /// well-formed token.
    fn parse(&self, bytes: &[u8]) -> VerifyResult<ParsedToken>;
}

/// Structural DER parser for `TimeStampToken` and `TimeStampResp`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DerTimestampTokenParser;

impl TimestampTokenParser for DerTimestampTokenParser {
    fn parse(&self, bytes: &[u8]) -> VerifyResult<ParsedToken> {
        let token = locate_token(bytes)?;
        let parsed = parse_content_info(&token)?;
        debug!(
            hash_algorithm = %parsed.hash_algorithm,
            gen_time = %parsed.gen_time,
            "time-stamp token parsed"
        );
        Ok(parsed)
    }
}

/// Returns the DER `TimeStampToken` within `bytes`.
///
/// `bytes` may be the token itself or a `TimeStampResp` carrying it.
///
/// # Errors
///
/// Returns [`VerifyError::TokenUnparseable`] if no token can be located.
pub fn token_der(bytes: &[u8]) -> VerifyResult<&[u8]> {
    locate_token(bytes).map(|tlv| tlv.raw)
}

fn locate_token(bytes: &[u8]) -> VerifyResult<Tlv<'_>> {
    let outer = der::parse_single(bytes, TAG_SEQUENCE)?;
    let mut body = DerReader::nested(&outer);
    match body.peek_tag() {
        Some(TAG_OID) => Ok(outer),
        Some(TAG_SEQUENCE) => unwrap_response(&mut body),
        _ => Err(VerifyError::token_unparseable(
            "neither a TimeStampToken nor a TimeStampResp",
        )),
    }
}

/// Returns the `timeStampToken` of a granted response.
fn unwrap_response<'a>(body: &mut DerReader<'a>) -> VerifyResult<Tlv<'a>> {
    let status_info = body.read(TAG_SEQUENCE)?;
    let status = der::decode_u64(DerReader::nested(&status_info).read(TAG_INTEGER)?.content)?;
    // granted (0) or grantedWithMods (1)
    if status > 1 {
        return Err(VerifyError::token_unparseable(format!(
            "TimeStampResp status {status} carries no token"
        )));
    }
    let token = body
        .read_optional(TAG_SEQUENCE)?
        .ok_or_else(|| VerifyError::token_unparseable("TimeStampResp has no timeStampToken"))?;
    body.finish()?;
    Ok(token)
}

fn parse_content_info(content_info: &Tlv<'_>) -> VerifyResult<ParsedToken> {
    let mut reader = DerReader::nested(content_info);
    expect_oid(&mut reader, OID_SIGNED_DATA, "contentType")?;
    let explicit = reader.read(TAG_CONTEXT_0)?;
    reader.finish()?;

    let mut wrapper = DerReader::nested(&explicit);
    let signed_data = wrapper.read(TAG_SEQUENCE)?;
    wrapper.finish()?;

    let mut sd = DerReader::nested(&signed_data);
    sd.read(TAG_INTEGER)?;
    sd.read(TAG_SET)?;
    let encap = sd.read(TAG_SEQUENCE)?;
    sd.read_optional(TAG_CONTEXT_0)?;
    sd.read_optional(TAG_CONTEXT_1)?;
    sd.read(TAG_SET)?;
    sd.finish()?;

    let mut encap = DerReader::nested(&encap);
    expect_oid(&mut encap, OID_TST_INFO, "eContentType")?;
    let econtent = encap
        .read_optional(TAG_CONTEXT_0)?
        .ok_or_else(|| VerifyError::token_unparseable("encapsulated TSTInfo is detached"))?;
    encap.finish()?;
    let octets = DerReader::nested(&econtent).read(TAG_OCTET_STRING)?;

    parse_tst_info(octets.content)
}

fn parse_tst_info(bytes: &[u8]) -> VerifyResult<ParsedToken> {
    let tst = der::parse_single(bytes, TAG_SEQUENCE)?;
    let mut reader = DerReader::nested(&tst);

    let version = der::decode_u64(reader.read(TAG_INTEGER)?.content)?;
    if version != 1 {
        return Err(VerifyError::token_unparseable(format!(
            "unsupported TSTInfo version {version}"
        )));
    }
    let policy = der::decode_oid(reader.read(TAG_OID)?.content)?;

    let imprint = reader.read(TAG_SEQUENCE)?;
    let mut imprint = DerReader::nested(&imprint);
    let alg_id = imprint.read(TAG_SEQUENCE)?;
    let hashed_message = imprint.read(TAG_OCTET_STRING)?.content.to_vec();
    imprint.finish()?;
    let mut alg_id = DerReader::nested(&alg_id);
    let hash_algorithm = DigestAlgorithm::from_oid(&der::decode_oid(alg_id.read(TAG_OID)?.content)?);
    if !alg_id.is_empty() {
        // parameters: NULL or absent for SHA-2, tolerated as-is otherwise
        alg_id.read_any()?;
    }
    alg_id.finish()?;
    if hashed_message.is_empty()
        || hash_algorithm.output_len().is_some_and(|len| len != hashed_message.len())
    {
        return Err(VerifyError::token_unparseable(format!(
            "{}-byte hashedMessage for {hash_algorithm}",
            hashed_message.len()
        )));
    }

    let serial_number = reader.read(TAG_INTEGER)?.content.to_vec();
    let gen_time = parse_generalized_time(reader.read(TAG_GENERALIZED_TIME)?.content)?;

    reader.read_optional(TAG_SEQUENCE)?;
    reader.read_optional(TAG_BOOLEAN)?;
    let nonce = reader.read_optional(TAG_INTEGER)?.map(|t| t.content.to_vec());
    while !reader.is_empty() {
        reader.read_any()?;
    }

    Ok(ParsedToken {
        hash_algorithm,
        hashed_message,
        gen_time,
        policy,
        serial_number,
        nonce,
    })
}

fn expect_oid(reader: &mut DerReader<'_>, expected: &str, what: &str) -> VerifyResult<()> {
    let oid = der::decode_oid(reader.read(TAG_OID)?.content)?;
    if oid == expected {
        Ok(())
    } else {
        Err(VerifyError::token_unparseable(format!(
            "{what} is {oid}, expected {expected}"
        )))
    }
}

/// Parses `YYYYMMDDHHMMSS[.fff]Z`.
fn parse_generalized_time(content: &[u8]) -> VerifyResult<DateTime<Utc>> {
    let text = std::str::from_utf8(content).map_err(|_| DerError::Malformed {
        what: "GeneralizedTime",
    })?;
    NaiveDateTime::parse_from_str(text, "%Y%m%d%H%M%S%.fZ")
        .map(|naive| naive.and_utc())
        .map_err(|e| VerifyError::token_unparseable(format!("invalid genTime '{text}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tsa::der::{encode, encode_constructed};
    use crate::tsa::testing::{oid, response, token, tst_info};

    #[test]
    fn parses_bare_token() {
        let der = token(&tst_info(OID_SHA256, &[0x11; 32], "20260118100000Z"));
        let parsed = DerTimestampTokenParser.parse(&der).unwrap();
        assert_eq!(parsed.hash_algorithm, DigestAlgorithm::Sha256);
        assert_eq!(parsed.hashed_message, vec![0x11; 32]);
        assert_eq!(parsed.gen_time.to_rfc3339(), "2026-01-18T10:00:00+00:00");
        assert_eq!(parsed.policy, "1.2.3.4.1");
        assert_eq!(parsed.nonce, Some(vec![7]));
    }

    #[test]
    fn parses_fractional_gen_time() {
        let der = token(&tst_info(OID_SHA256, &[0; 32], "20260118100000.125Z"));
        let parsed = DerTimestampTokenParser.parse(&der).unwrap();
        assert_eq!(parsed.gen_time.timestamp_subsec_millis(), 125);
    }

    #[test]
    fn parses_granted_response() {
        let der = response(0, Some(token(&tst_info(OID_SHA256, &[1; 32], "20260118100000Z"))));
        assert!(DerTimestampTokenParser.parse(&der).is_ok());
    }

    #[test]
    fn token_der_strips_response_wrapper() {
        let bare = token(&tst_info(OID_SHA256, &[1; 32], "20260118100000Z"));
        let wrapped = response(1, Some(bare.clone()));
        assert_eq!(token_der(&wrapped).unwrap(), bare.as_slice());
        assert_eq!(token_der(&bare).unwrap(), bare.as_slice());
    }

    #[test]
    fn rejected_response_is_unparseable() {
        let der = response(2, None);
        assert!(matches!(
            DerTimestampTokenParser.parse(&der),
            Err(VerifyError::TokenUnparseable { .. })
        ));
    }

    #[test]
    fn reports_non_sha256_algorithm() {
        let der = token(&tst_info(OID_SHA1, &[0; 20], "20260118100000Z"));
        let parsed = DerTimestampTokenParser.parse(&der).unwrap();
        assert_eq!(parsed.hash_algorithm, DigestAlgorithm::Sha1);
    }

    #[test]
    fn imprint_length_must_fit_algorithm() {
        let cases: [(&str, &[u8]); 3] = [(OID_SHA256, &[]), (OID_SHA256, &[0; 20]), (OID_SHA1, &[0; 32])];
        for (alg, message) in cases {
            let der = token(&tst_info(alg, message, "20260118100000Z"));
            assert!(matches!(
                DerTimestampTokenParser.parse(&der),
                Err(VerifyError::TokenUnparseable { .. })
            ));
        }
        let unknown = token(&tst_info("1.2.3.99", &[0; 5], "20260118100000Z"));
        assert_eq!(DerTimestampTokenParser.parse(&unknown).unwrap().hashed_message.len(), 5);
        let empty = token(&tst_info("1.2.3.99", &[], "20260118100000Z"));
        assert!(DerTimestampTokenParser.parse(&empty).is_err());
    }

    #[test]
    fn garbage_is_unparseable() {
        for input in [&b""[..], b"not der", &[0x30, 0x03, 0x02, 0x01]] {
            assert!(matches!(
                DerTimestampTokenParser.parse(input),
                Err(VerifyError::TokenUnparseable { .. })
            ));
        }
    }

    #[test]
    fn wrong_content_type_is_unparseable() {
        let der = encode_constructed(TAG_SEQUENCE, &[
            oid("1.2.840.113549.1.7.1"),
            encode_constructed(TAG_CONTEXT_0, &[encode(TAG_OCTET_STRING, &[])]),
        ]);
        assert!(DerTimestampTokenParser.parse(&der).is_err());
    }

    #[test]
    fn invalid_gen_time_is_unparseable() {
        let der = token(&tst_info(OID_SHA256, &[0; 32], "2026-01-18"));
        assert!(matches!(
            DerTimestampTokenParser.parse(&der),
            Err(VerifyError::TokenUnparseable { .. })
        ));
    }

    #[test]
    fn digest_names_are_normalized() {
        assert_eq!(DigestAlgorithm::from_name("SHA256"), DigestAlgorithm::Sha256);
        assert_eq!(DigestAlgorithm::from_name("sha-256"), DigestAlgorithm::Sha256);
        assert_eq!(DigestAlgorithm::from_name(OID_SHA256), DigestAlgorithm::Sha256);
        assert_eq!(DigestAlgorithm::from_name("md5").name(), "md5");
    }
}
