//! RFC 3161 `TimeStampReq` encoding and the TSA transport seam.
//!
//! ```text
//! TimeStampReq ::= SEQUENCE {
//!     version        INTEGER { v1(1) },
//!     messageImprint MessageImprint,
//!     reqPolicy      TSAPolicyId OPTIONAL,
//!     nonce          INTEGER OPTIONAL,
//!     certReq        BOOLEAN DEFAULT FALSE,
//!     extensions     [0] IMPLICIT Extensions OPTIONAL }
//! ```

use super::der::{
    self, TAG_BOOLEAN, TAG_NULL, TAG_OCTET_STRING, TAG_OID, TAG_SEQUENCE, encode,
    encode_constructed, encode_u64,
};
use super::token::OID_SHA256;
use crate::crypto::Hash;
use crate::error::{VerifyError, VerifyResult};

/// A time-stamp request over a SHA-256 anchor digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeStampRequest {
    /// The 32-byte `AnchorDigest` sent as `hashedMessage`.
    pub anchor_digest: Hash,
    /// Requested TSA policy, dotted OID.
    pub policy: Option<String>,
    /// Replay-protection nonce.
    pub nonce: Option<u64>,
    /// Ask the TSA to include its certificate.
    pub cert_req: bool,
}

impl TimeStampRequest {
    /// A request for `anchor_digest` with `certReq` set and no policy or
    /// nonce.
    #[must_use]
    pub const fn new(anchor_digest: Hash) -> Self {
        Self {
            anchor_digest,
            policy: None,
            nonce: None,
            cert_req: true,
        }
    }

    /// Sets the requested policy OID.
    #[must_use]
    pub fn with_policy(mut self, policy: impl Into<String>) -> Self {
        self.policy = Some(policy.into());
        self
    }

    /// Sets the nonce.
    #[must_use]
    pub const fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }

    /// DER encoding of the request.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::EncodingError`] if the policy is not a valid
    /// dotted OID.
    pub fn to_der(&self) -> VerifyResult<Vec<u8>> {
        let sha256 = der::encode_oid(OID_SHA256)
            .map_err(|e| VerifyError::encoding(format!("hash algorithm OID: {e}")))?;
        let mut parts = vec![
            encode_u64(1),
            encode_constructed(TAG_SEQUENCE, &[
                encode_constructed(TAG_SEQUENCE, &[encode(TAG_OID, &sha256), encode(TAG_NULL, &[])]),
                encode(TAG_OCTET_STRING, &self.anchor_digest),
            ]),
        ];
        if let Some(policy) = &self.policy {
            let oid = der::encode_oid(policy)
                .map_err(|e| VerifyError::encoding(format!("policy '{policy}': {e}")))?;
            parts.push(encode(TAG_OID, &oid));
        }
        if let Some(nonce) = self.nonce {
            parts.push(encode_u64(nonce));
        }
        // DEFAULT FALSE is omitted in DER
        if self.cert_req {
            parts.push(encode(TAG_BOOLEAN, &[0xFF]));
        }
        Ok(encode_constructed(TAG_SEQUENCE, &parts))
    }
}

/// Transport to a time-stamping authority.
///
/// Network I/O, retries and timeouts live in the implementation; this crate
/// only builds requests and checks what comes back.
pub trait TimestampAuthority: Send + Sync {
    /// Name recorded as `TSA.Service` in anchors.
    fn service(&self) -> &str;

    /// Submits a DER `TimeStampReq` and returns the DER response, either a
    /// `TimeStampResp` or a bare `TimeStampToken`.
    ///
    /// # Errors
    ///
    /// Implementations report transport failures as
    /// [`VerifyError::TokenUnparseable`] or [`VerifyError::MissingEvidence`].
    fn timestamp(&self, request_der: &[u8]) -> VerifyResult<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tsa::der::{DerReader, TAG_INTEGER, decode_oid, decode_u64, parse_single};

    #[test]
    fn request_layout_is_rfc3161() {
        let der = TimeStampRequest::new([0x5A; 32])
            .with_policy("1.2.3.4")
            .with_nonce(99)
            .to_der()
            .unwrap();

        let outer = parse_single(&der, TAG_SEQUENCE).unwrap();
        let mut req = DerReader::nested(&outer);
        assert_eq!(decode_u64(req.read(TAG_INTEGER).unwrap().content).unwrap(), 1);

        let imprint = req.read(TAG_SEQUENCE).unwrap();
        let mut imprint = DerReader::nested(&imprint);
        let alg = imprint.read(TAG_SEQUENCE).unwrap();
        let oid = DerReader::nested(&alg).read(TAG_OID).unwrap();
        assert_eq!(decode_oid(oid.content).unwrap(), OID_SHA256);
        assert_eq!(imprint.read(TAG_OCTET_STRING).unwrap().content, &[0x5A; 32]);

        assert_eq!(decode_oid(req.read(TAG_OID).unwrap().content).unwrap(), "1.2.3.4");
        assert_eq!(decode_u64(req.read(TAG_INTEGER).unwrap().content).unwrap(), 99);
        assert_eq!(req.read(TAG_BOOLEAN).unwrap().content, &[0xFF]);
        req.finish().unwrap();
    }

    #[test]
    fn cert_req_false_is_omitted() {
        let mut request = TimeStampRequest::new([0; 32]);
        request.cert_req = false;
        let der = request.to_der().unwrap();
        let outer = parse_single(&der, TAG_SEQUENCE).unwrap();
        let mut req = DerReader::nested(&outer);
        req.read(TAG_INTEGER).unwrap();
        req.read(TAG_SEQUENCE).unwrap();
        assert!(req.is_empty());
    }

    #[test]
    fn invalid_policy_is_encoding_error() {
        let err = TimeStampRequest::new([0; 32])
            .with_policy("not-an-oid")
            .to_der()
            .unwrap_err();
        assert!(matches!(err, VerifyError::EncodingError { .. }));
    }
}
