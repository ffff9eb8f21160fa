//! Multiplicative-to-additive share conversion.
//!
//! The receiver holds `b` encrypted under its own key as `B`, the sender holds `a`.
//! The sender produces `D = a (*) B (+) enc_receiver(-beta)` and `F = enc_sender(beta)`,
//! keeping `beta`; the receiver decrypts `alpha = dec(D)`, and `alpha + beta == a * b`.

use num_bigint::{BigInt, BigUint};
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};

use crate::{
    curve::Point,
    paillier::{Ciphertext, PublicKeyPaillier, RPParams, SecretKeyPaillier},
    params::SchemeParams,
    sessions::LocalError,
    sigma::{AffGProof, AffGPublicInputs, AffGSecretInputs, AffPProof, AffPPublicInputs, AffPSecretInputs, ProofBlob},
    tools::hashing::Hashable,
    uint::{in_range_bits, random_bounded_bits},
};

/// The public keys and the receiver's ciphertext an MtA instance is bound to.
#[derive(Clone, Copy)]
pub(crate) struct MtaKeys<'a> {
    pub sender_pk: &'a PublicKeyPaillier,
    pub receiver_pk: &'a PublicKeyPaillier,
    /// `B`, encrypted with the receiver's key.
    pub cap_b: &'a Ciphertext,
}

/// The sender's side of an MtA instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct MtaShare {
    /// The sender's additive share.
    pub beta: BigInt,
    /// `D`, encrypted with the receiver's key.
    pub cap_d: Ciphertext,
    /// `F = enc_sender(beta)`.
    pub cap_f: Ciphertext,
    /// The randomizer of the masking term in `D`.
    pub rho_d: BigUint,
    /// The randomizer of `F`.
    pub rho_f: BigUint,
}

impl MtaShare {
    pub fn new<P: SchemeParams>(
        rng: &mut impl CryptoRngCore,
        a: &BigInt,
        keys: MtaKeys<'_>,
    ) -> Result<Self, LocalError> {
        let beta = random_bounded_bits(rng, P::LP_BOUND);
        let rho_d = keys.receiver_pk.random_randomizer(rng)?;
        let rho_f = keys.sender_pk.random_randomizer(rng)?;

        let cap_d = keys
            .cap_b
            .homomorphic_mul(keys.receiver_pk, a)
            .homomorphic_add(
                keys.receiver_pk,
                &Ciphertext::new_with_randomizer(keys.receiver_pk, &-&beta, &rho_d),
            );
        let cap_f = Ciphertext::new_with_randomizer(keys.sender_pk, &beta, &rho_f);

        Ok(Self {
            beta,
            cap_d,
            cap_f,
            rho_d,
            rho_f,
        })
    }

    /// Proves the affine relation when `a` is committed to as the curve point `X = a * G`.
    #[allow(clippy::too_many_arguments)]
    pub fn prove_affine_group<P: SchemeParams>(
        &self,
        rng: &mut impl CryptoRngCore,
        a: &BigInt,
        cap_x: &Point,
        keys: MtaKeys<'_>,
        setup: &RPParams,
        aux: &impl Hashable,
    ) -> Result<ProofBlob, LocalError> {
        let proof = AffGProof::new::<P>(
            rng,
            AffGSecretInputs {
                x: a,
                y: &self.beta,
                rho: &self.rho_d,
                rho_y: &self.rho_f,
            },
            AffGPublicInputs {
                pk0: keys.receiver_pk,
                pk1: keys.sender_pk,
                cap_c: keys.cap_b,
                cap_d: &self.cap_d,
                cap_y: &self.cap_f,
                cap_x,
            },
            setup,
            aux,
        )?;
        ProofBlob::new(&proof)
    }

    /// Proves the affine relation when `a` is committed to as `X = enc_sender(a, rho_x)`.
    #[allow(clippy::too_many_arguments)]
    pub fn prove_affine_paillier<P: SchemeParams>(
        &self,
        rng: &mut impl CryptoRngCore,
        a: &BigInt,
        rho_x: &BigUint,
        cap_x: &Ciphertext,
        keys: MtaKeys<'_>,
        setup: &RPParams,
        aux: &impl Hashable,
    ) -> Result<ProofBlob, LocalError> {
        let proof = AffPProof::new::<P>(
            rng,
            AffPSecretInputs {
                x: a,
                y: &self.beta,
                rho: &self.rho_d,
                rho_x,
                rho_y: &self.rho_f,
            },
            AffPPublicInputs {
                pk0: keys.receiver_pk,
                pk1: keys.sender_pk,
                cap_c: keys.cap_b,
                cap_d: &self.cap_d,
                cap_x,
                cap_y: &self.cap_f,
            },
            setup,
            aux,
        )?;
        ProofBlob::new(&proof)
    }
}

pub(crate) fn verify_affine_group<P: SchemeParams>(
    proof: &ProofBlob,
    keys: MtaKeys<'_>,
    cap_d: &Ciphertext,
    cap_f: &Ciphertext,
    cap_x: &Point,
    setup: &RPParams,
    aux: &impl Hashable,
) -> bool {
    proof.decode::<AffGProof>().is_some_and(|proof| {
        proof.verify::<P>(
            AffGPublicInputs {
                pk0: keys.receiver_pk,
                pk1: keys.sender_pk,
                cap_c: keys.cap_b,
                cap_d,
                cap_y: cap_f,
                cap_x,
            },
            setup,
            aux,
        )
    })
}

pub(crate) fn verify_affine_paillier<P: SchemeParams>(
    proof: &ProofBlob,
    keys: MtaKeys<'_>,
    cap_d: &Ciphertext,
    cap_f: &Ciphertext,
    cap_x: &Ciphertext,
    setup: &RPParams,
    aux: &impl Hashable,
) -> bool {
    proof.decode::<AffPProof>().is_some_and(|proof| {
        proof.verify::<P>(
            AffPPublicInputs {
                pk0: keys.receiver_pk,
                pk1: keys.sender_pk,
                cap_c: keys.cap_b,
                cap_d,
                cap_x,
                cap_y: cap_f,
            },
            setup,
            aux,
        )
    })
}

/// The receiver's side: decrypts `alpha` from `D`.
///
/// Returns `None` if the value is outside of the range an honest sender could produce.
pub(crate) fn decrypt_share<P: SchemeParams>(sk: &SecretKeyPaillier, cap_d: &Ciphertext) -> Option<BigInt> {
    let alpha = cap_d.decrypt(sk);
    in_range_bits(&alpha, P::mta_output_bound_bits()).then_some(alpha)
}

#[cfg(test)]
mod tests {
    use rand_core::OsRng;

    use super::{decrypt_share, verify_affine_group, verify_affine_paillier, MtaKeys, MtaShare};
    use crate::{
        curve::Scalar,
        paillier::{Ciphertext, RPParams, SecretKeyPaillier},
        params::{PaillierTest, TestParams},
        uint::{bigint_to_scalar, pow2, scalar_to_bigint},
    };

    #[test]
    fn shares_add_up() {
        let sender_sk = SecretKeyPaillier::random::<PaillierTest>(&mut OsRng).unwrap();
        let receiver_sk = SecretKeyPaillier::random::<PaillierTest>(&mut OsRng).unwrap();
        let (setup, _) = RPParams::random_with_secret(&mut OsRng, &receiver_sk).unwrap();
        let sender_pk = sender_sk.public_key();
        let receiver_pk = receiver_sk.public_key();

        let a = Scalar::random(&mut OsRng);
        let b = Scalar::random(&mut OsRng);
        let (cap_b, _) = Ciphertext::new(&mut OsRng, &receiver_pk, &scalar_to_bigint(&b)).unwrap();
        let keys = MtaKeys {
            sender_pk: &sender_pk,
            receiver_pk: &receiver_pk,
            cap_b: &cap_b,
        };

        let a_int = scalar_to_bigint(&a);
        let share = MtaShare::new::<TestParams>(&mut OsRng, &a_int, keys).unwrap();
        let alpha = decrypt_share::<TestParams>(&receiver_sk, &share.cap_d).unwrap();
        assert_eq!(&alpha + &share.beta, &a_int * scalar_to_bigint(&b));
        assert_eq!(bigint_to_scalar(&alpha) + bigint_to_scalar(&share.beta), a * b);

        let aux: &[u8] = b"abcde";

        // Group commitment
        let cap_x = a.mul_by_generator();
        let proof = share
            .prove_affine_group::<TestParams>(&mut OsRng, &a_int, &cap_x, keys, &setup, &aux)
            .unwrap();
        assert!(verify_affine_group::<TestParams>(
            &proof,
            keys,
            &share.cap_d,
            &share.cap_f,
            &cap_x,
            &setup,
            &aux
        ));
        // The proof is bound to `D`
        assert!(!verify_affine_group::<TestParams>(
            &proof,
            keys,
            &share.cap_f,
            &share.cap_f,
            &cap_x,
            &setup,
            &aux
        ));

        // Paillier commitment
        let (cap_x, rho_x) = Ciphertext::new(&mut OsRng, &sender_pk, &a_int).unwrap();
        let proof = share
            .prove_affine_paillier::<TestParams>(&mut OsRng, &a_int, &rho_x, &cap_x, keys, &setup, &aux)
            .unwrap();
        assert!(verify_affine_paillier::<TestParams>(
            &proof,
            keys,
            &share.cap_d,
            &share.cap_f,
            &cap_x,
            &setup,
            &aux
        ));
        // A proof of the other kind does not decode into the right type or does not verify
        let group_proof = share
            .prove_affine_group::<TestParams>(&mut OsRng, &a_int, &a.mul_by_generator(), keys, &setup, &aux)
            .unwrap();
        assert!(!verify_affine_paillier::<TestParams>(
            &group_proof,
            keys,
            &share.cap_d,
            &share.cap_f,
            &cap_x,
            &setup,
            &aux
        ));
    }

    #[test]
    fn out_of_range_share_is_rejected() {
        let receiver_sk = SecretKeyPaillier::random::<PaillierTest>(&mut OsRng).unwrap();
        let receiver_pk = receiver_sk.public_key();
        let (cap_d, _) = Ciphertext::new(&mut OsRng, &receiver_pk, &pow2(1000)).unwrap();
        assert!(decrypt_share::<TestParams>(&receiver_sk, &cap_d).is_none());
    }
}
