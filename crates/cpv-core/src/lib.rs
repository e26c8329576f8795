//! Capture-provenance verification.
//!
//! This crate verifies evidence that a captured record existed, unaltered,
//! at or before a trusted point in time:
//!
//! - **Event integrity**: each event's `EventHash` is SHA-256 over a
//!   canonical JSON encoding, optionally signed with ES256 or Ed25519
//! - **Chain integrity**: events link through `PrevHash` from an all-zero
//!   genesis; tombstones record intentional deletions
//! - **Completeness**: an order-independent XOR commitment proves no event
//!   was silently dropped from a set
//! - **Anchoring**: batches are committed to a Merkle root that an RFC 3161
//!   time-stamp authority attests
//!
//! Verification is synchronous, deterministic and read-only. Every failure
//! surfaces as a typed [`VerifyError`] with a stable code; the
//! [`verify::Verifier`] folds per-check outcomes into a
//! [`verify::VerificationReport`].
//!
//! # Example
//!
//! ```rust
//! use cpv_core::cancel::CancellationToken;
//! use cpv_core::event::{Event, EventHasher};
//! use cpv_core::verify::{CheckStatus, VerificationRequest, Verifier};
//! use cpv_core::config::VerificationPolicy;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let event = Event::from_json_str(
//!     r#"{"EventID":"e1","ChainID":"c1","EventType":"INGEST",
//!         "Timestamp":"2026-01-18T10:00:00.000Z",
//!         "PrevHash":"sha256:0000000000000000000000000000000000000000000000000000000000000000"}"#,
//! )?;
//! let sealed = EventHasher::default().seal(&event)?;
//!
//! let verifier = Verifier::new(VerificationPolicy {
//!     require_signature: false,
//!     require_anchor: false,
//!     ..VerificationPolicy::default()
//! });
//! let report = verifier.verify(&VerificationRequest::new(sealed), &CancellationToken::none())?;
//! assert_eq!(report.overall, CheckStatus::Valid);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

#![warn(missing_docs)]

pub mod anchor;
pub mod bundle;
pub mod cancel;
pub mod canonical;
pub mod chain;
pub mod completeness;
pub mod config;
pub mod crypto;
pub mod error;
pub mod event;
pub mod merkle;
pub mod tsa;
pub mod verify;

pub use error::{VerifyError, VerifyResult};
