use core::{fmt::Debug, marker::PhantomData};
use std::collections::{BTreeMap, BTreeSet};

use k256::ecdsa::VerifyingKey;
use num_bigint::{BigInt, BigUint};
use serde::{Deserialize, Serialize};

use crate::{
    curve::{Point, Scalar},
    mta::MtaShare,
    paillier::{Ciphertext, PublicKeyPaillier, RPParams, SecretKeyPaillier},
    params::SchemeParams,
    sessions::{Error, LocalError, RemoteError},
    sigma::{ModProof, PrmProof, ProofBlob},
    tools::{
        sss::{interpolation_coeff, shamir_join_points, ShareId},
        Secret,
    },
};

/// The domain separation tag for the auxiliary info proofs.
pub(crate) const AUX_INFO_TAG: &[u8] = b"aux-info";

/// A party identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartyId(u32);

impl PartyId {
    /// Creates an identifier from an integer.
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the integer the identifier was created from.
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl core::fmt::Display for PartyId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "party #{}", self.0)
    }
}

/// The public part of the Paillier and ring-Pedersen setup of a party.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PublicAuxInfo {
    pub(crate) paillier_pk: PublicKeyPaillier,
    /// Ring-Pedersen parameters used by the other parties when proving something to this one.
    pub(crate) rp_params: RPParams,
    pub(crate) mod_proof: ProofBlob,
    pub(crate) prm_proof: ProofBlob,
}

impl PublicAuxInfo {
    /// Checks that the Paillier modulus is a Paillier-Blum one,
    /// and that the ring-Pedersen parameters are well-formed and use the same modulus.
    fn verify<P: SchemeParams>(&self, owner: &PartyId) -> bool {
        let aux = (AUX_INFO_TAG, owner);

        if self.rp_params.modulus() != self.paillier_pk.modulus() {
            return false;
        }

        let mod_ok = self
            .mod_proof
            .decode::<ModProof>()
            .is_some_and(|proof| proof.verify::<P>(&self.paillier_pk, &aux));
        let prm_ok = self
            .prm_proof
            .decode::<PrmProof>()
            .is_some_and(|proof| proof.verify::<P>(&self.rp_params, &aux));

        mod_ok && prm_ok
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SecretAuxInfo {
    pub(crate) paillier_sk: SecretKeyPaillier,
}

/// A threshold key share: any `threshold` of the owners can sign together.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct ThresholdKeyShare<P: SchemeParams> {
    pub(crate) owner: PartyId,
    pub(crate) threshold: u32,
    pub(crate) secret_share: Secret<Scalar>,
    pub(crate) share_ids: BTreeMap<PartyId, ShareId>,
    pub(crate) public_shares: BTreeMap<PartyId, Point>,
    pub(crate) secret_aux: SecretAuxInfo,
    pub(crate) public_aux: BTreeMap<PartyId, PublicAuxInfo>,
    pub(crate) phantom: PhantomData<P>,
}

impl<P: SchemeParams> ThresholdKeyShare<P> {
    /// The owner of this share.
    pub fn owner(&self) -> &PartyId {
        &self.owner
    }

    /// The number of shares required to sign.
    pub fn threshold(&self) -> usize {
        self.threshold as usize
    }

    /// All the parties holding shares of the same key.
    pub fn all_parties(&self) -> BTreeSet<PartyId> {
        self.share_ids.keys().cloned().collect()
    }

    pub(crate) fn verifying_key_as_point(&self) -> Result<Point, LocalError> {
        let points = self
            .share_ids
            .iter()
            .take(self.threshold as usize)
            .map(|(id, share_id)| {
                let public_share = self
                    .public_shares
                    .get(id)
                    .ok_or_else(|| LocalError::new(format!("{id} is missing in the public shares")))?;
                Ok((*share_id, *public_share))
            })
            .collect::<Result<BTreeMap<_, _>, LocalError>>()?;
        shamir_join_points(&points)
    }

    /// The public key the shares correspond to.
    pub fn verifying_key(&self) -> Result<VerifyingKey, LocalError> {
        self.verifying_key_as_point()?
            .to_verifying_key()
            .ok_or_else(|| LocalError::new("The combined verifying key is an identity"))
    }

    /// Checks the Paillier modulus and ring-Pedersen proofs of every party in `parties`.
    ///
    /// The error names the first party whose setup is invalid.
    pub fn verify_aux_info(&self, parties: &BTreeSet<PartyId>) -> Result<(), Error> {
        for id in parties {
            let public_aux = self
                .public_aux
                .get(id)
                .ok_or_else(|| LocalError::new(format!("{id} is missing in the public auxiliary info")))?;
            if !public_aux.verify::<P>(id) {
                return Err(Error::Remote {
                    party: *id,
                    error: RemoteError::InvalidMessage("Invalid Paillier or ring-Pedersen setup".into()),
                });
            }
        }
        Ok(())
    }

    /// Converts the threshold share into an additive share for the given set of signers.
    ///
    /// The secret shares of the signers, multiplied by their Lagrange coefficients, sum up to the full secret key.
    pub fn to_key_share(&self, signers: &BTreeSet<PartyId>) -> Result<KeyShare<P>, LocalError> {
        if signers.len() < self.threshold as usize {
            return Err(LocalError::new(format!(
                "At least {} signers are required, got {}",
                self.threshold,
                signers.len()
            )));
        }
        if !signers.contains(&self.owner) {
            return Err(LocalError::new(format!("{} is not among the signers", self.owner)));
        }

        let share_ids = signers
            .iter()
            .map(|id| {
                let share_id = self
                    .share_ids
                    .get(id)
                    .ok_or_else(|| LocalError::new(format!("{id} is missing in the share IDs")))?;
                Ok((*id, *share_id))
            })
            .collect::<Result<BTreeMap<_, _>, LocalError>>()?;

        let coeff = |id: &PartyId| -> Result<Scalar, LocalError> {
            let share_id = share_ids
                .get(id)
                .ok_or_else(|| LocalError::new(format!("{id} is missing in the share IDs")))?;
            interpolation_coeff(share_ids.values(), share_id)
        };

        let owner_coeff = coeff(&self.owner)?;
        let secret_share = Secret::init_with(|| *self.secret_share.expose_secret() * owner_coeff);

        let public_shares = signers
            .iter()
            .map(|id| {
                let public_share = self
                    .public_shares
                    .get(id)
                    .ok_or_else(|| LocalError::new(format!("{id} is missing in the public shares")))?;
                Ok((*id, *public_share * coeff(id)?))
            })
            .collect::<Result<BTreeMap<_, _>, LocalError>>()?;

        let public_aux = signers
            .iter()
            .map(|id| {
                let public_aux = self
                    .public_aux
                    .get(id)
                    .ok_or_else(|| LocalError::new(format!("{id} is missing in the public auxiliary info")))?;
                Ok((*id, public_aux.clone()))
            })
            .collect::<Result<BTreeMap<_, _>, LocalError>>()?;

        Ok(KeyShare {
            owner: self.owner,
            secret_share,
            public_shares,
            secret_aux: self.secret_aux.clone(),
            public_aux,
            phantom: PhantomData,
        })
    }
}

/// An additive key share for a fixed set of signers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct KeyShare<P: SchemeParams> {
    pub(crate) owner: PartyId,
    pub(crate) secret_share: Secret<Scalar>,
    pub(crate) public_shares: BTreeMap<PartyId, Point>,
    pub(crate) secret_aux: SecretAuxInfo,
    pub(crate) public_aux: BTreeMap<PartyId, PublicAuxInfo>,
    pub(crate) phantom: PhantomData<P>,
}

impl<P: SchemeParams> KeyShare<P> {
    /// The owner of this share.
    pub fn owner(&self) -> &PartyId {
        &self.owner
    }

    /// The parties whose shares add up to the secret key.
    pub fn all_parties(&self) -> BTreeSet<PartyId> {
        self.public_shares.keys().cloned().collect()
    }

    pub(crate) fn verifying_key_as_point(&self) -> Point {
        self.public_shares.values().cloned().sum()
    }

    /// The public key the shares correspond to.
    pub fn verifying_key(&self) -> Result<VerifyingKey, LocalError> {
        self.verifying_key_as_point()
            .to_verifying_key()
            .ok_or_else(|| LocalError::new("The combined verifying key is an identity"))
    }

    pub(crate) fn public_share(&self, id: &PartyId) -> Result<&Point, LocalError> {
        self.public_shares
            .get(id)
            .ok_or_else(|| LocalError::new(format!("{id} is missing in the public shares")))
    }

    pub(crate) fn public_aux(&self, id: &PartyId) -> Result<&PublicAuxInfo, LocalError> {
        self.public_aux
            .get(id)
            .ok_or_else(|| LocalError::new(format!("{id} is missing in the public auxiliary info")))
    }

    pub(crate) fn paillier_sk(&self) -> &SecretKeyPaillier {
        &self.secret_aux.paillier_sk
    }
}

/// Ciphertexts sent between every ordered pair of parties, indexed as `[from][to]`.
pub(crate) type PairwiseCiphertexts = BTreeMap<PartyId, BTreeMap<PartyId, Ciphertext>>;

pub(crate) fn pairwise_get<'a>(
    map: &'a PairwiseCiphertexts,
    from: &PartyId,
    to: &PartyId,
) -> Result<&'a Ciphertext, LocalError> {
    map.get(from)
        .and_then(|row| row.get(to))
        .ok_or_else(|| LocalError::new(format!("The ciphertext from {from} to {to} is missing")))
}

/// Everything a party needs to re-derive and re-prove its presigning contributions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PresignRecord {
    pub(crate) owner: PartyId,
    /// `k_i`
    pub(crate) k: Secret<Scalar>,
    /// `gamma_i`
    pub(crate) gamma: Secret<Scalar>,
    /// The randomizer of `K_i`.
    pub(crate) rho: BigUint,
    /// The randomizer of `G_i`.
    pub(crate) nu: BigUint,
    /// `K_j` for all signers.
    pub(crate) cap_k: BTreeMap<PartyId, Ciphertext>,
    /// `G_j` for all signers.
    pub(crate) cap_g: BTreeMap<PartyId, Ciphertext>,
    /// `D_{j,l}` of the Delta MtA for all pairs.
    pub(crate) cap_d: PairwiseCiphertexts,
    /// `F_{j,l}` of the Delta MtA for all pairs.
    pub(crate) cap_f: PairwiseCiphertexts,
    /// `\hat{D}_{j,l}` of the Chi MtA for all pairs.
    pub(crate) hat_cap_d: PairwiseCiphertexts,
    /// `\hat{F}_{j,l}` of the Chi MtA for all pairs.
    pub(crate) hat_cap_f: PairwiseCiphertexts,
    /// Our side of the Delta MtA with each of the other signers.
    pub(crate) delta_mta: BTreeMap<PartyId, MtaShare>,
    /// Our side of the Chi MtA with each of the other signers.
    pub(crate) chi_mta: BTreeMap<PartyId, MtaShare>,
    /// The sum of the decrypted Delta MtA values addressed to us.
    pub(crate) alpha_sum: BigInt,
    /// The sum of the decrypted Chi MtA values addressed to us.
    pub(crate) hat_alpha_sum: BigInt,
}

impl PresignRecord {
    pub(crate) fn signers(&self) -> BTreeSet<PartyId> {
        self.cap_k.keys().cloned().collect()
    }

    pub(crate) fn cap_k(&self, id: &PartyId) -> Result<&Ciphertext, LocalError> {
        self.cap_k
            .get(id)
            .ok_or_else(|| LocalError::new(format!("K is missing for {id}")))
    }

    pub(crate) fn cap_g(&self, id: &PartyId) -> Result<&Ciphertext, LocalError> {
        self.cap_g
            .get(id)
            .ok_or_else(|| LocalError::new(format!("G is missing for {id}")))
    }
}

/// The result of the presigning protocol: one party's share of a presignature.
///
/// Must be used to sign at most one message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct PreSignature<P: SchemeParams> {
    pub(crate) id: [u8; 32],
    /// `R`
    pub(crate) nonce: Point,
    /// `k_i`
    pub(crate) ephemeral_scalar_share: Secret<Scalar>,
    /// `\chi_i`
    pub(crate) product_share: Secret<Scalar>,
    pub(crate) record: PresignRecord,
    pub(crate) phantom: PhantomData<P>,
}

impl<P: SchemeParams> PreSignature<P> {
    /// The presignature identifier, the same for all the signers.
    pub fn id(&self) -> &[u8; 32] {
        &self.id
    }

    /// The nonce point `R`.
    pub fn nonce(&self) -> Point {
        self.nonce
    }

    /// The parties that took part in the presigning.
    pub fn signers(&self) -> BTreeSet<PartyId> {
        self.record.signers()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use k256::ecdsa::SigningKey;
    use rand_core::OsRng;

    use super::PartyId;
    use crate::{centralized_keygen::make_key_shares, curve::Point, params::TestParams};

    #[test]
    fn threshold_to_additive() {
        let ids = (1..=4).map(PartyId::new).collect::<BTreeSet<_>>();
        let sk = SigningKey::random(&mut OsRng);
        let shares = make_key_shares::<TestParams>(&mut OsRng, &ids, 3, Some(&sk)).unwrap();

        let vkey = *sk.verifying_key();
        for share in shares.values() {
            assert_eq!(share.verifying_key().unwrap(), vkey);
        }

        let signers = [1, 2, 4].into_iter().map(PartyId::new).collect::<BTreeSet<_>>();
        let key_shares = signers
            .iter()
            .map(|id| shares[id].to_key_share(&signers).unwrap())
            .collect::<Vec<_>>();

        for key_share in key_shares.iter() {
            assert_eq!(key_share.verifying_key().unwrap(), vkey);
            assert_eq!(key_share.all_parties(), signers);
        }

        let secret_sum: Point = key_shares
            .iter()
            .map(|share| share.secret_share.expose_secret().mul_by_generator())
            .sum();
        assert_eq!(secret_sum, Point::from_verifying_key(&vkey));
    }

    #[test]
    fn invalid_signer_sets() {
        let ids = (1..=3).map(PartyId::new).collect::<BTreeSet<_>>();
        let shares = make_key_shares::<TestParams>(&mut OsRng, &ids, 2, None).unwrap();
        let share = &shares[&PartyId::new(1)];

        let too_few = [PartyId::new(1)].into();
        assert!(share.to_key_share(&too_few).is_err());

        let without_owner = [PartyId::new(2), PartyId::new(3)].into();
        assert!(share.to_key_share(&without_owner).is_err());

        let unknown = [PartyId::new(1), PartyId::new(7)].into();
        assert!(share.to_key_share(&unknown).is_err());
    }

    #[test]
    fn aux_info_verifies() {
        let ids = (1..=2).map(PartyId::new).collect::<BTreeSet<_>>();
        let mut shares = make_key_shares::<TestParams>(&mut OsRng, &ids, 2, None).unwrap();
        let share = shares.get_mut(&PartyId::new(1)).unwrap();
        assert!(share.verify_aux_info(&ids).is_ok());

        // Swap the proofs of two parties
        let mod_proof_2 = share.public_aux[&PartyId::new(2)].mod_proof.clone();
        share.public_aux.get_mut(&PartyId::new(1)).unwrap().mod_proof = mod_proof_2;
        assert!(share.verify_aux_info(&ids).is_err());
    }
}
