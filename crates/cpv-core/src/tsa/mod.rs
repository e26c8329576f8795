//! RFC 3161 time-stamping support.
//!
//! - [`der`]: the DER subset used by tokens and requests
//! - [`TimestampTokenParser`]: extracts `MessageImprint` and `genTime`
//! - [`TimeStampRequest`] and [`TimestampAuthority`]: the producer side
//! - [`TsaTrustValidator`]: certificate trust, evaluated separately from
//!   structural validity

pub mod der;
mod request;
#[cfg(test)]
pub(crate) mod testing;
mod token;
mod trust;

pub use request::{TimeStampRequest, TimestampAuthority};
pub use token::{
    DerTimestampTokenParser, DigestAlgorithm, OID_SHA1, OID_SHA256, OID_SHA384, OID_SHA512,
    OID_SIGNED_DATA, OID_TST_INFO, ParsedToken, TimestampTokenParser, token_der,
};
pub use trust::{NoTrustEvaluation, TrustOutcome, TsaTrustValidator};
