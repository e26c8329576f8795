//! In-process time-stamp fixtures for unit tests.

use std::sync::Mutex;

use super::der::{
    self, DerReader, TAG_CONTEXT_0, TAG_GENERALIZED_TIME, TAG_INTEGER, TAG_NULL, TAG_OCTET_STRING,
    TAG_OID, TAG_SEQUENCE, TAG_SET, encode, encode_constructed, encode_oid, encode_u64,
};
use super::token::{OID_SIGNED_DATA, OID_TST_INFO};
use super::TimestampAuthority;
use crate::error::{VerifyError, VerifyResult};

pub fn oid(dotted: &str) -> Vec<u8> {
    encode(TAG_OID, &encode_oid(dotted).unwrap())
}

pub fn tst_info(alg: &str, message: &[u8], time: &str) -> Vec<u8> {
    tst_info_with_nonce(alg, message, time, Some(7))
}

pub fn tst_info_with_nonce(alg: &str, message: &[u8], time: &str, nonce: Option<u64>) -> Vec<u8> {
    let mut parts = vec![
        encode_u64(1),
        oid("1.2.3.4.1"),
        encode_constructed(TAG_SEQUENCE, &[
            encode_constructed(TAG_SEQUENCE, &[oid(alg), encode(TAG_NULL, &[])]),
            encode(TAG_OCTET_STRING, message),
        ]),
        encode_u64(42),
        encode(TAG_GENERALIZED_TIME, time.as_bytes()),
    ];
    parts.extend(nonce.map(encode_u64));
    encode_constructed(TAG_SEQUENCE, &parts)
}

pub fn token(tst: &[u8]) -> Vec<u8> {
    let encap = encode_constructed(TAG_SEQUENCE, &[
        oid(OID_TST_INFO),
        encode_constructed(TAG_CONTEXT_0, &[encode(TAG_OCTET_STRING, tst)]),
    ]);
    let signed_data = encode_constructed(TAG_SEQUENCE, &[
        encode_u64(3),
        encode_constructed(TAG_SET, &[]),
        encap,
        encode_constructed(TAG_SET, &[]),
    ]);
    encode_constructed(TAG_SEQUENCE, &[
        oid(OID_SIGNED_DATA),
        encode_constructed(TAG_CONTEXT_0, &[signed_data]),
    ])
}

pub fn response(status: u64, token: Option<Vec<u8>>) -> Vec<u8> {
    let mut parts = vec![encode_constructed(TAG_SEQUENCE, &[encode_u64(status)])];
    parts.extend(token);
    encode_constructed(TAG_SEQUENCE, &parts)
}

/// Authority that stamps whatever imprint it is sent, optionally altered.
pub struct FakeAuthority {
    pub algorithm: &'static str,
    pub gen_time: &'static str,
    pub flip_imprint: bool,
    pub echo_nonce: bool,
    pub requests: Mutex<Vec<Vec<u8>>>,
}

impl Default for FakeAuthority {
    fn default() -> Self {
        Self {
            algorithm: super::OID_SHA256,
            gen_time: "20260118100000Z",
            flip_imprint: false,
            echo_nonce: true,
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl TimestampAuthority for FakeAuthority {
    fn service(&self) -> &str {
        "tsa.test"
    }

    fn timestamp(&self, request_der: &[u8]) -> VerifyResult<Vec<u8>> {
        self.requests.lock().unwrap().push(request_der.to_vec());

        let outer = der::parse_single(request_der, TAG_SEQUENCE)?;
        let mut req = DerReader::nested(&outer);
        req.read(TAG_INTEGER)?;
        let imprint = req.read(TAG_SEQUENCE)?;
        let mut imprint = DerReader::nested(&imprint);
        imprint.read(TAG_SEQUENCE)?;
        let mut message = imprint.read(TAG_OCTET_STRING)?.content.to_vec();
        req.read_optional(TAG_OID)?;
        let nonce = req
            .read_optional(TAG_INTEGER)?
            .map(|n| der::decode_u64(n.content))
            .transpose()?
            .filter(|_| self.echo_nonce);

        if message.is_empty() {
            return Err(VerifyError::missing("imprint"));
        }
        if self.flip_imprint {
            message[0] ^= 0xFF;
        }
        let tst = tst_info_with_nonce(self.algorithm, &message, self.gen_time, nonce);
        Ok(response(0, Some(token(&tst))))
    }
}
