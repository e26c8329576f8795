//! Integration tests for the provenance guarantees.
//!
//! Each test exercises a guarantee end to end through the public API:
//! hashing determinism, tamper evidence of the chain, completeness under
//! deletion, Merkle inclusion and the Root -> AnchorDigest -> imprint
//! binding of anchors.

mod common;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use common::{LocalAuthority, event_hashes, none, signed_chain, timestamp_token};
use cpv_core::anchor::{Anchor, AnchorBuilder, AnchorValidator, AnchorVersion};
use cpv_core::chain::ChainValidator;
use cpv_core::completeness::{CompletenessChecker, CompletenessInvariant};
use cpv_core::crypto::{self, sha256, sha256_concat};
use cpv_core::error::{CompletenessViolationKind, VerifyError};
use cpv_core::event::{Event, EventHasher};
use cpv_core::merkle::{MerkleProofVerifier, MerkleTree, leaf_hash};
use cpv_core::tsa::OID_SHA256;
use serde_json::json;

const SCENARIO_EVENT_HASH: &str =
    "sha256:4e3a6f9c8d7b2a1e5f0c3d8b7a6e5f4c3d2b1a0e9f8d7c6b5a4e3d2c1b0a9f8e";

fn anchor_batch(hashes: &[crypto::Hash]) -> Vec<Anchor> {
    AnchorBuilder::new(&LocalAuthority)
        .with_nonce(99)
        .anchor_batch("batch-it", hashes, &none())
        .unwrap()
        .anchors
}

#[test]
fn hashing_is_deterministic_across_member_order() {
    let a = Event::from_json_str(
        r#"{"EventID":"e","ChainID":"c","PrevHash":"sha256:0000000000000000000000000000000000000000000000000000000000000000","Timestamp":"2026-01-18T10:00:00.000Z","EventType":"INGEST","Asset":{"b":1,"a":2}}"#,
    )
    .unwrap();
    let b = Event::from_json_str(
        r#"{"Asset":{"a":2,"b":1},"EventType":"INGEST","Timestamp":"2026-01-18T10:00:00.000Z","PrevHash":"sha256:0000000000000000000000000000000000000000000000000000000000000000","ChainID":"c","EventID":"e"}"#,
    )
    .unwrap();
    let hasher = EventHasher::default();
    assert_eq!(hasher.compute(&a).unwrap(), hasher.compute(&b).unwrap());
    assert_eq!(hasher.compute(&a).unwrap(), hasher.compute(&a).unwrap());
}

#[test]
fn deleting_any_interior_event_violates_completeness() {
    let events = signed_chain(&["INGEST"; 6]);
    let invariant = CompletenessInvariant::compute(&events, &none()).unwrap();
    CompletenessChecker.check(&events, &invariant, &none()).unwrap();

    for removed in 1..events.len() - 1 {
        let mut candidate = events.clone();
        candidate.remove(removed);
        let err = CompletenessChecker
            .check(&candidate, &invariant, &none())
            .unwrap_err();
        assert!(
            matches!(
                err,
                VerifyError::CompletenessViolation {
                    kind: CompletenessViolationKind::CountMismatch { expected: 6, actual: 5 },
                    ..
                }
            ),
            "removing index {removed}: {err:?}"
        );
    }
}

#[test]
fn substituted_event_violates_hash_sum() {
    let events = signed_chain(&["INGEST"; 4]);
    let invariant = CompletenessInvariant::compute(&events, &none()).unwrap();
    let mut candidate = events.clone();
    candidate[2] = signed_chain(&["EXPORT"; 4]).swap_remove(3);
    let err = CompletenessChecker
        .check(&candidate, &invariant, &none())
        .unwrap_err();
    assert!(matches!(
        err,
        VerifyError::CompletenessViolation {
            kind: CompletenessViolationKind::HashSumMismatch { .. },
            ..
        }
    ));
}

#[test]
fn swapping_adjacent_events_breaks_chain_at_swap() {
    let events = signed_chain(&["INGEST"; 5]);
    for i in 1..events.len() - 1 {
        let mut swapped = events.clone();
        swapped.swap(i, i + 1);
        let err = ChainValidator::default()
            .validate(&swapped, &none())
            .unwrap_err();
        assert!(
            matches!(err, VerifyError::ChainBroken { index, .. } if index == i),
            "swap at {i}: {err:?}"
        );
    }
}

#[test]
fn tombstone_is_not_a_failure() {
    let events = signed_chain(&["INGEST", "INGEST", "TOMBSTONE", "EXPORT"]);
    let report = ChainValidator::default().validate(&events, &none()).unwrap();
    assert_eq!(report.tombstones.len(), 1);
    assert_eq!(report.tombstones[0].target_event_id.as_deref(), Some("evt-001"));

    let invariant = CompletenessInvariant::compute(&events, &none()).unwrap();
    CompletenessChecker.check(&events, &invariant, &none()).unwrap();
}

#[test]
fn single_leaf_scenario() {
    let event_hash = crypto::parse_prefixed(SCENARIO_EVENT_HASH).unwrap();
    let tree = MerkleTree::build(&[event_hash], &none()).unwrap();
    let expected = sha256(&event_hash);
    assert_eq!(tree.root(), expected);
    MerkleProofVerifier::verify(&event_hash, 0, &[], &tree.root(), &none()).unwrap();

    let anchors = anchor_batch(&[event_hash]);
    let anchor = &anchors[0];
    assert_eq!(anchor.anchor_digest, hex::encode(expected));
    AnchorValidator::default().validate(anchor, &event_hash, &none()).unwrap();

    // One hex character off in the token's imprint.
    let mut imprint = expected;
    imprint[31] ^= 0x01;
    let mut tampered = anchor.clone();
    tampered.tsa.token = BASE64.encode(timestamp_token(OID_SHA256, &imprint, None));
    let err = AnchorValidator::default()
        .validate(&tampered, &event_hash, &none())
        .unwrap_err();
    assert!(matches!(err, VerifyError::MessageImprintMismatch { .. }));
}

#[test]
fn two_leaf_scenario() {
    let l0 = sha256(b"leaf zero");
    let l1 = sha256(b"leaf one");
    let tree = MerkleTree::build(&[l0, l1], &none()).unwrap();
    assert_eq!(tree.root(), sha256_concat(&leaf_hash(&l0), &leaf_hash(&l1)));

    let proof0 = tree.proof(0).unwrap();
    let proof1 = tree.proof(1).unwrap();
    assert_eq!(proof0.siblings(), &[leaf_hash(&l1)]);
    assert_eq!(proof1.siblings(), &[leaf_hash(&l0)]);
    MerkleProofVerifier::verify(&l0, 0, proof0.siblings(), &tree.root(), &none()).unwrap();

    let unrelated = MerkleTree::build(&[sha256(b"x"), sha256(b"y")], &none()).unwrap();
    assert!(matches!(
        MerkleProofVerifier::verify(&l0, 0, proof0.siblings(), &unrelated.root(), &none()),
        Err(VerifyError::ProofInvalid { .. })
    ));
}

#[test]
fn padding_leaves_are_not_addressable() {
    let hashes: Vec<_> = (0u8..5).map(|i| sha256(&[i])).collect();
    let tree = MerkleTree::build(&hashes, &none()).unwrap();
    assert_eq!(tree.padded_size(), 8);

    for (i, hash) in hashes.iter().enumerate() {
        let proof = tree.proof(i).unwrap();
        MerkleProofVerifier::verify_sized(hash, i, 5, proof.siblings(), &tree.root(), &none())
            .unwrap();
    }
    // Index 5 duplicates leaf 4 in the padded tree.
    let padded = tree.proof(4).unwrap();
    assert!(tree.proof(5).is_err());
    assert!(
        MerkleProofVerifier::verify_sized(
            &hashes[4],
            5,
            5,
            padded.siblings(),
            &tree.root(),
            &none()
        )
        .is_err()
    );
}

#[test]
fn anchor_digest_must_equal_root_even_if_token_agrees() {
    let hashes = event_hashes(&signed_chain(&["INGEST"; 3]));
    let mut anchor = anchor_batch(&hashes).swap_remove(0);

    let wrong = sha256(b"not the root");
    anchor.anchor_digest = hex::encode(wrong);
    anchor.tsa.token = BASE64.encode(timestamp_token(OID_SHA256, &wrong, None));
    anchor.tsa.message_imprint = None;

    let err = AnchorValidator::default()
        .validate(&anchor, &hashes[0], &none())
        .unwrap_err();
    assert!(matches!(err, VerifyError::AnchorDigestMismatch { .. }));
}

#[test]
fn legacy_anchor_versions_validate() {
    let hashes = event_hashes(&signed_chain(&["INGEST"; 2]));
    let current = anchor_batch(&hashes).swap_remove(1);
    let latest = serde_json::to_value(&current).unwrap();

    let v11 = json!({
        "AnchorID": latest["AnchorID"],
        "Merkle": {
            "TreeSize": latest["Merkle"]["TreeSize"],
            "LeafIndex": latest["Merkle"]["LeafIndex"],
            "Proof": latest["Merkle"]["Proof"],
            "Root": latest["Merkle"]["Root"],
        },
        "TSA": {"Token": latest["TSA"]["Token"], "Service": "tsa.local"},
    });
    let legacy = Anchor::from_value(v11).unwrap();
    assert_eq!(legacy.version, AnchorVersion::V1_1);
    assert_eq!(legacy.anchor_digest, current.anchor_digest);
    AnchorValidator::default().validate(&legacy, &hashes[1], &none()).unwrap();

    let mut v12 = latest.clone();
    v12["AnchorVersion"] = json!("1.2");
    v12["Merkle"].as_object_mut().unwrap().remove("LeafHashMethod");
    v12["Merkle"].as_object_mut().unwrap().remove("LeafHash");
    v12["TSA"].as_object_mut().unwrap().remove("MessageImprint");
    let legacy = Anchor::from_value(v12).unwrap();
    assert_eq!(legacy.version, AnchorVersion::V1_2);
    AnchorValidator::default().validate(&legacy, &hashes[1], &none()).unwrap();
}

#[test]
fn hostile_tree_size_is_rejected_not_overflowed() {
    let hashes = event_hashes(&signed_chain(&["INGEST"; 2]));
    let latest = serde_json::to_value(anchor_batch(&hashes).swap_remove(0)).unwrap();
    let v11 = json!({
        "AnchorID": latest["AnchorID"],
        "Merkle": {
            "TreeSize": u64::MAX,
            "LeafIndex": 0,
            "Proof": latest["Merkle"]["Proof"],
            "Root": latest["Merkle"]["Root"],
        },
        "TSA": {"Token": latest["TSA"]["Token"]},
    });
    let err = Anchor::from_value(v11)
        .and_then(|anchor| AnchorValidator::default().validate(&anchor, &hashes[0], &none()))
        .unwrap_err();
    assert!(matches!(
        err,
        VerifyError::ProofInvalid { .. } | VerifyError::EncodingError { .. }
    ));
}
