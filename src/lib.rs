#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(
    clippy::mod_module_files,
    missing_docs,
    missing_copy_implementations,
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unused_qualifications
)]
#![cfg_attr(not(test), warn(clippy::unwrap_used, clippy::indexing_slicing))]

mod centralized_keygen;
mod curve;
mod entities;
mod mta;
mod paillier;
mod params;
mod protocols;
mod rounds;
mod sessions;
mod sigma;
mod tools;
mod uint;

// Some re-exports to avoid the need for version-matching
pub use k256;
pub use signature;

pub use centralized_keygen::make_key_shares;
pub use curve::{Point, RecoverableSignature, Scalar};
pub use entities::{KeyShare, PartyId, PreSignature, ThresholdKeyShare};
pub use params::{PaillierParams, PaillierProduction, PaillierTest, ProductionParams, SchemeParams, TestParams};
pub use sessions::{
    AbortKind, Envelope, Error, Failure, LocalError, RemoteError, Session, SessionId, SessionOutcome, SessionOutput,
};
pub use sigma::ProofBlob;
