//! Hash-chain validation.
//!
//! A chain is the producer-declared ordering of events sharing one `ChainID`.
//! The validator confirms that ordering: the first `PrevHash` is the genesis
//! value and every later `PrevHash` equals the preceding event's `EventHash`.
//! It never searches for an alternative ordering, and producer timestamps play
//! no part in it.
//!
//! TOMBSTONE events are ordinary chain links. They are listed in the report as
//! recognized state so that callers can distinguish an intentional, signed
//! deletion from a silent gap.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cancel::CancellationToken;
use crate::crypto::{self, Hash};
use crate::error::{VerifyError, VerifyResult};
use crate::event::{Event, EventHasher};

/// A TOMBSTONE observed while walking a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TombstoneRecord {
    /// Position in the supplied ordering.
    pub index: usize,
    /// `EventID` of the TOMBSTONE event itself.
    pub event_id: String,
    /// `EventID` whose content was deleted, when the event names it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_event_id: Option<String>,
}

/// Outcome of a successful chain walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    /// The chain's `ChainID` (empty for an empty chain).
    pub chain_id: String,
    /// Number of events walked.
    pub length: usize,
    /// `EventHash` of the last event, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<String>,
    /// Whether every `EventHash` was recomputed during the walk.
    pub hashes_recomputed: bool,
    /// TOMBSTONE events in chain order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tombstones: Vec<TombstoneRecord>,
}

/// Walks a chain in supplied order.
#[derive(Debug, Clone, Default)]
pub struct ChainValidator {
    hasher: EventHasher,
    recompute_hashes: bool,
}

impl ChainValidator {
    /// Creates a validator that only checks linkage.
    #[must_use]
    pub fn new(hasher: EventHasher) -> Self {
        Self {
            hasher,
            recompute_hashes: false,
        }
    }

    /// Also recompute each event's `EventHash` during the walk.
    #[must_use]
    pub const fn with_recomputed_hashes(mut self, recompute: bool) -> Self {
        self.recompute_hashes = recompute;
        self
    }

    /// Validates `events` in the order given.
    ///
    /// An empty slice is a valid, empty chain.
    ///
    /// # Errors
    ///
    /// - [`VerifyError::ChainBroken`] with the index of the first event whose
    ///   `PrevHash` or `ChainID` does not fit
    /// - [`VerifyError::EventHashMismatch`] with the index of the first event
    ///   whose stored hash differs from its recomputed hash
    /// - [`VerifyError::EncodingError`] for malformed hash strings
    /// - [`VerifyError::Cancelled`] if `cancel` trips mid-walk
    pub fn validate(
        &self,
        events: &[Event],
        cancel: &CancellationToken,
    ) -> VerifyResult<ChainReport> {
        let chain_id = events.first().map(|e| e.chain_id().to_string()).unwrap_or_default();
        let mut tombstones = Vec::new();
        let mut previous: Option<Hash> = None;

        for (index, event) in events.iter().enumerate() {
            cancel.check()?;

            if event.chain_id() != chain_id {
                warn!(index, expected = %chain_id, found = event.chain_id(), "foreign ChainID in chain");
                return Err(VerifyError::chain_broken(
                    index,
                    format!("ChainID '{}' differs from '{chain_id}'", event.chain_id()),
                ));
            }

            let prev = event
                .prev_hash_bytes()
                .map_err(|e| VerifyError::chain_broken(index, format!("unreadable PrevHash: {e}")))?;
            match previous {
                None if !crypto::is_genesis(&prev) => {
                    return Err(VerifyError::chain_broken(
                        index,
                        "first event does not start from the genesis PrevHash",
                    ));
                },
                Some(expected) if !crypto::digests_equal(&prev, &expected) => {
                    warn!(index, event_id = event.event_id(), "PrevHash linkage broken");
                    return Err(VerifyError::chain_broken(
                        index,
                        format!(
                            "PrevHash {} does not match preceding EventHash {}",
                            crypto::to_prefixed(&prev),
                            crypto::to_prefixed(&expected)
                        ),
                    ));
                },
                _ => {},
            }

            let current = if self.recompute_hashes {
                self.hasher.verify(event).map_err(|e| match e {
                    VerifyError::EventHashMismatch {
                        stored, computed, ..
                    } => VerifyError::EventHashMismatch {
                        index: Some(index),
                        stored,
                        computed,
                    },
                    other => other,
                })?
            } else {
                event.event_hash_bytes()?
            };

            if event.is_tombstone() {
                debug!(index, event_id = event.event_id(), "tombstone recognized");
                tombstones.push(TombstoneRecord {
                    index,
                    event_id: event.event_id().to_string(),
                    target_event_id: event.tombstone().map(|t| t.target_event_id.clone()),
                });
            }
            previous = Some(current);
        }

        debug!(chain_id = %chain_id, length = events.len(), "chain linkage verified");
        Ok(ChainReport {
            chain_id,
            length: events.len(),
            head: previous.map(|h| crypto::to_prefixed(&h)),
            hashes_recomputed: self.recompute_hashes,
            tombstones,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    fn build_chain(types: &[&str]) -> Vec<Event> {
        let hasher = EventHasher::default();
        let mut prev = crypto::genesis_prev_hash();
        let mut events = Vec::new();
        for (i, ty) in types.iter().enumerate() {
            let mut value = json!({
                "EventID": format!("evt-{i}"),
                "ChainID": "chain-1",
                "PrevHash": prev,
                "Timestamp": format!("2026-01-18T10:00:0{i}.000Z"),
                "EventType": ty,
            });
            if *ty == "TOMBSTONE" {
                value["Tombstone"] = json!({"TargetEventID": "evt-0", "Reason": "user request"});
            }
            let sealed = hasher.seal(&Event::from_value(value).unwrap()).unwrap();
            prev = sealed.event_hash().unwrap().to_string();
            events.push(sealed);
        }
        events
    }

    fn edit(event: &Event, field: &str, value: Value) -> Event {
        let mut raw = serde_json::to_value(event).unwrap();
        raw[field] = value;
        Event::from_value(raw).unwrap()
    }

    fn validator() -> ChainValidator {
        ChainValidator::default().with_recomputed_hashes(true)
    }

    #[test]
    fn well_formed_chain_is_valid() {
        let events = build_chain(&["INGEST", "INGEST", "EXPORT"]);
        let report = validator().validate(&events, &CancellationToken::none()).unwrap();
        assert_eq!(report.length, 3);
        assert_eq!(report.head.as_deref(), events[2].event_hash());
        assert!(report.tombstones.is_empty());
    }

    #[test]
    fn empty_chain_is_valid() {
        let report = validator().validate(&[], &CancellationToken::none()).unwrap();
        assert_eq!(report.length, 0);
        assert!(report.head.is_none());
    }

    #[test]
    fn non_genesis_start_breaks_at_zero() {
        let events = build_chain(&["INGEST", "INGEST"]);
        let err = validator()
            .validate(&events[1..], &CancellationToken::none())
            .unwrap_err();
        assert!(matches!(err, VerifyError::ChainBroken { index: 0, .. }));
    }

    #[test]
    fn reordering_breaks_chain() {
        let mut events = build_chain(&["INGEST", "INGEST", "INGEST"]);
        events.swap(1, 2);
        let err = validator().validate(&events, &CancellationToken::none()).unwrap_err();
        assert!(matches!(err, VerifyError::ChainBroken { index: 1, .. }));
    }

    #[test]
    fn removed_middle_event_breaks_chain() {
        let mut events = build_chain(&["INGEST", "INGEST", "INGEST"]);
        events.remove(1);
        let err = validator().validate(&events, &CancellationToken::none()).unwrap_err();
        assert!(matches!(err, VerifyError::ChainBroken { index: 1, .. }));
    }

    #[test]
    fn tombstone_is_recognized_not_broken() {
        let events = build_chain(&["INGEST", "TOMBSTONE", "INGEST"]);
        let report = validator().validate(&events, &CancellationToken::none()).unwrap();
        assert_eq!(report.tombstones.len(), 1);
        assert_eq!(report.tombstones[0].index, 1);
        assert_eq!(report.tombstones[0].target_event_id.as_deref(), Some("evt-0"));
    }

    #[test]
    fn foreign_chain_id_breaks_chain() {
        let mut events = build_chain(&["INGEST", "INGEST"]);
        events[1] = edit(&events[1], "ChainID", json!("chain-2"));
        let err = validator().validate(&events, &CancellationToken::none()).unwrap_err();
        assert!(matches!(err, VerifyError::ChainBroken { index: 1, .. }));
    }

    #[test]
    fn tampered_event_reports_index_when_recomputing() {
        let mut events = build_chain(&["INGEST", "INGEST"]);
        events[1] = edit(&events[1], "Timestamp", json!("2027-01-01T00:00:00.000Z"));
        let err = validator().validate(&events, &CancellationToken::none()).unwrap_err();
        assert!(matches!(err, VerifyError::EventHashMismatch { index: Some(1), .. }));

        ChainValidator::default()
            .validate(&events, &CancellationToken::none())
            .unwrap();
    }

    #[test]
    fn cancelled_walk_stops() {
        let events = build_chain(&["INGEST"]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(
            validator().validate(&events, &cancel),
            Err(VerifyError::Cancelled)
        );
    }
}
