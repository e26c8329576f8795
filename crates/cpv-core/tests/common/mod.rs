//! Shared fixtures for integration tests.
//!
//! The authority here answers requests in-process with unsigned
//! `TimeStampToken`s built from the public DER writer, which is all the
//! parser inspects.

#![allow(dead_code)]

use cpv_core::cancel::CancellationToken;
use cpv_core::crypto::{self, Hash, PublicKey, SignatureAlgorithm};
use cpv_core::error::VerifyResult;
use cpv_core::event::{Event, EventHasher, EventSignature};
use cpv_core::tsa::der::{
    self, DerReader, TAG_CONTEXT_0, TAG_GENERALIZED_TIME, TAG_INTEGER, TAG_NULL,
    TAG_OCTET_STRING, TAG_OID, TAG_SEQUENCE, TAG_SET, encode, encode_constructed, encode_oid,
    encode_u64,
};
use cpv_core::tsa::{OID_SHA256, OID_SIGNED_DATA, OID_TST_INFO, TimestampAuthority};
use ed25519_dalek::{Signer, SigningKey};
use serde_json::json;

pub const CHAIN_ID: &str = "chain-it";
pub const GEN_TIME: &str = "20260118100000Z";

fn object_id(dotted: &str) -> Vec<u8> {
    encode(TAG_OID, &encode_oid(dotted).expect("valid OID"))
}

/// DER `TimeStampToken` attesting `message` under `algorithm_oid`.
pub fn timestamp_token(algorithm_oid: &str, message: &[u8], nonce: Option<u64>) -> Vec<u8> {
    let mut tst = vec![
        encode_u64(1),
        object_id("1.3.6.1.4.1.99999.1"),
        encode_constructed(TAG_SEQUENCE, &[
            encode_constructed(TAG_SEQUENCE, &[object_id(algorithm_oid), encode(TAG_NULL, &[])]),
            encode(TAG_OCTET_STRING, message),
        ]),
        encode_u64(0x2026),
        encode(TAG_GENERALIZED_TIME, GEN_TIME.as_bytes()),
    ];
    tst.extend(nonce.map(encode_u64));
    let tst_info = encode_constructed(TAG_SEQUENCE, &tst);

    let signed_data = encode_constructed(TAG_SEQUENCE, &[
        encode_u64(3),
        encode_constructed(TAG_SET, &[]),
        encode_constructed(TAG_SEQUENCE, &[
            object_id(OID_TST_INFO),
            encode_constructed(TAG_CONTEXT_0, &[encode(TAG_OCTET_STRING, &tst_info)]),
        ]),
        encode_constructed(TAG_SET, &[]),
    ]);
    encode_constructed(TAG_SEQUENCE, &[
        object_id(OID_SIGNED_DATA),
        encode_constructed(TAG_CONTEXT_0, &[signed_data]),
    ])
}

/// Stamps whatever imprint it receives and echoes the nonce.
#[derive(Debug, Default)]
pub struct LocalAuthority;

impl TimestampAuthority for LocalAuthority {
    fn service(&self) -> &str {
        "tsa.local"
    }

    fn timestamp(&self, request_der: &[u8]) -> VerifyResult<Vec<u8>> {
        let request = der::parse_single(request_der, TAG_SEQUENCE)?;
        let mut fields = DerReader::nested(&request);
        fields.read(TAG_INTEGER)?;
        let imprint = fields.read(TAG_SEQUENCE)?;
        let mut imprint = DerReader::nested(&imprint);
        imprint.read(TAG_SEQUENCE)?;
        let message = imprint.read(TAG_OCTET_STRING)?;
        fields.read_optional(TAG_OID)?;
        let nonce = fields
            .read_optional(TAG_INTEGER)?
            .map(|n| der::decode_u64(n.content))
            .transpose()?;

        let status = encode_constructed(TAG_SEQUENCE, &[encode_u64(0)]);
        let token = timestamp_token(OID_SHA256, message.content, nonce);
        Ok(encode_constructed(TAG_SEQUENCE, &[status, token]))
    }
}

pub fn signing_key() -> SigningKey {
    SigningKey::from_bytes(&[42u8; 32])
}

pub fn public_key() -> PublicKey {
    PublicKey::new(
        SignatureAlgorithm::Ed25519,
        signing_key().verifying_key().to_bytes(),
    )
}

/// Builds a sealed, Ed25519-signed chain. `kinds` holds `EventType` names;
/// a tombstone targets the event before it.
pub fn signed_chain(kinds: &[&str]) -> Vec<Event> {
    let hasher = EventHasher::default();
    let key = signing_key();
    let mut prev = crypto::genesis_prev_hash();
    let mut events: Vec<Event> = Vec::with_capacity(kinds.len());
    for (i, kind) in kinds.iter().enumerate() {
        let mut value = json!({
            "EventID": format!("evt-{i:03}"),
            "ChainID": CHAIN_ID,
            "PrevHash": prev,
            "Timestamp": format!("2026-01-18T10:{:02}:00.000Z", i),
            "EventType": kind,
            "SignerInfo": {"KeyID": "device-1", "Algorithm": "Ed25519"},
            "Asset": {"MediaHash": crypto::to_prefixed(&crypto::sha256(format!("frame-{i}").as_bytes()))},
        });
        if *kind == "TOMBSTONE" {
            let target = events.last().map_or("evt-none", Event::event_id);
            value["Tombstone"] = json!({"TargetEventID": target, "Reason": "retention"});
        }
        let sealed = hasher
            .seal(&Event::from_value(value).expect("event shape"))
            .expect("seal");
        let digest = sealed.event_hash_bytes().expect("sealed hash");
        let signed = sealed.with_signature(EventSignature {
            algorithm: "Ed25519".to_string(),
            value: key.sign(&digest).to_bytes().to_vec(),
        });
        prev = signed.event_hash().expect("sealed").to_string();
        events.push(signed);
    }
    events
}

pub fn event_hashes(events: &[Event]) -> Vec<Hash> {
    events
        .iter()
        .map(|e| e.event_hash_bytes().expect("sealed hash"))
        .collect()
}

pub fn none() -> CancellationToken {
    CancellationToken::none()
}
