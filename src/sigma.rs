//! Sigma-protocols

mod aff_g;
mod aff_p;
mod dec;
mod enc;
mod log_star;
mod mod_;
mod mul;
mod mul_star;
mod prm;

use core::fmt::Debug;

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use serde_encoded_bytes::{Base64, SliceLike};

use crate::{
    params::SchemeParams,
    sessions::LocalError,
    tools::hashing::Hasher,
    uint::scalar_to_bigint,
};

pub(crate) use aff_g::{AffGProof, AffGPublicInputs, AffGSecretInputs};
pub(crate) use aff_p::{AffPProof, AffPPublicInputs, AffPSecretInputs};
pub(crate) use dec::{DecProof, DecPublicInputs, DecSecretInputs};
pub(crate) use enc::{EncProof, EncPublicInputs, EncSecretInputs};
pub(crate) use log_star::{LogStarProof, LogStarPublicInputs, LogStarSecretInputs};
pub(crate) use mod_::ModProof;
pub(crate) use mul::{MulProof, MulPublicInputs, MulSecretInputs};
pub(crate) use mul_star::{MulStarProof, MulStarPublicInputs, MulStarSecretInputs};
pub(crate) use prm::PrmProof;

/// Finalizes a Fiat-Shamir transcript into a challenge in `[0, q)`.
fn challenge<P: SchemeParams>(transcript: Hasher<P>) -> BigInt {
    scalar_to_bigint(&transcript.finalize_to_scalar())
}

/// A serialized zero-knowledge proof.
///
/// Proofs travel inside protocol messages in this opaque form and are only decoded
/// by the party checking them, so that a malformed proof is just a proof that fails to verify.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofBlob(#[serde(with = "SliceLike::<Base64>")] Box<[u8]>);

impl ProofBlob {
    pub(crate) fn new(proof: &impl Serialize) -> Result<Self, LocalError> {
        bincode::serialize(proof)
            .map(|bytes| Self(bytes.into_boxed_slice()))
            .map_err(|err| LocalError::new(format!("Failed to serialize a proof: {err}")))
    }

    /// Decodes the proof; `None` if the bytes do not represent a proof of the requested type.
    pub(crate) fn decode<T: for<'de> Deserialize<'de>>(&self) -> Option<T> {
        bincode::deserialize(&self.0).ok()
    }

    /// The serialized proof.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn from_bytes(bytes: &[u8]) -> Self {
        Self(bytes.into())
    }
}

impl Debug for ProofBlob {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "ProofBlob({} bytes)", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::ProofBlob;

    #[test]
    fn malformed_blob_does_not_decode() {
        let blob = ProofBlob::new(&(1u32, 2u64)).unwrap();
        assert_eq!(blob.decode::<(u32, u64)>(), Some((1, 2)));
        assert_eq!(ProofBlob::from_bytes(&[1, 2, 3]).decode::<(u32, u64)>(), None);
    }
}
