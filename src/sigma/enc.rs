//! Paillier encryption in range ($\Pi^{enc}$, Section 6.1, Fig. 14)

use num_bigint::{BigInt, BigUint};
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};

use super::challenge;
use crate::{
    paillier::{Ciphertext, PublicKeyPaillier, RPCommitment, RPParams},
    params::SchemeParams,
    sessions::LocalError,
    tools::hashing::{Chain, Hashable, Hasher},
    uint::{in_range_bits, pow_signed, random_bounded_bits},
};

const HASH_TAG: &[u8] = b"P_enc";

pub(crate) struct EncSecretInputs<'a> {
    /// $k \in \pm 2^\ell$.
    pub k: &'a BigInt,
    /// $\rho$, a Paillier randomizer for the public key $N_0$.
    pub rho: &'a BigUint,
}

pub(crate) struct EncPublicInputs<'a> {
    /// Paillier public key $N_0$.
    pub pk0: &'a PublicKeyPaillier,
    /// Paillier ciphertext $K = enc_0(k, \rho)$.
    pub cap_k: &'a Ciphertext,
}

/// ZK proof: Paillier encryption in range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct EncProof {
    cap_s: RPCommitment,
    cap_a: Ciphertext,
    cap_c: RPCommitment,
    z1: BigInt,
    z2: BigUint,
    z3: BigInt,
}

impl EncProof {
    pub fn new<P: SchemeParams>(
        rng: &mut impl CryptoRngCore,
        secret: EncSecretInputs<'_>,
        public: EncPublicInputs<'_>,
        setup: &RPParams,
        aux: &impl Hashable,
    ) -> Result<Self, LocalError> {
        let pk0 = public.pk0;

        let alpha = random_bounded_bits(rng, P::L_BOUND + P::EPS_BOUND);
        let mu = setup.random_randomizer(rng, P::L_BOUND);
        let r = pk0.random_randomizer(rng)?;
        let gamma = setup.random_randomizer(rng, P::L_BOUND + P::EPS_BOUND);

        let cap_s = setup.commit(secret.k, &mu);
        let cap_a = Ciphertext::new_with_randomizer(pk0, &alpha, &r);
        let cap_c = setup.commit(&alpha, &gamma);

        let e = challenge(transcript::<P>(&public, setup, aux, &cap_s, &cap_a, &cap_c));

        let z1 = &alpha + &e * secret.k;
        let z2 = (r * pow_signed(secret.rho, &e, pk0.modulus())) % pk0.modulus();
        let z3 = gamma + &e * mu;

        Ok(Self {
            cap_s,
            cap_a,
            cap_c,
            z1,
            z2,
            z3,
        })
    }

    pub fn verify<P: SchemeParams>(&self, public: EncPublicInputs<'_>, setup: &RPParams, aux: &impl Hashable) -> bool {
        let pk0 = public.pk0;

        if !self.cap_a.is_valid(pk0) || !self.cap_s.is_valid(setup) || !self.cap_c.is_valid(setup) {
            return false;
        }

        let e = challenge(transcript::<P>(
            &public,
            setup,
            aux,
            &self.cap_s,
            &self.cap_a,
            &self.cap_c,
        ));

        // z_1 \in \pm 2^{\ell + \eps}
        if !in_range_bits(&self.z1, P::L_BOUND + P::EPS_BOUND) {
            return false;
        }

        // enc_0(z_1, z_2) == A (+) K (*) e
        let c = Ciphertext::new_with_randomizer(pk0, &self.z1, &self.z2);
        if c != self.cap_a.homomorphic_add(pk0, &public.cap_k.homomorphic_mul(pk0, &e)) {
            return false;
        }

        // s^{z_1} t^{z_3} == C S^e \mod \hat{N}
        if setup.commit(&self.z1, &self.z3) != self.cap_s.pow_mul(&e, &self.cap_c, setup) {
            return false;
        }

        true
    }
}

fn transcript<P: SchemeParams>(
    public: &EncPublicInputs<'_>,
    setup: &RPParams,
    aux: &impl Hashable,
    cap_s: &RPCommitment,
    cap_a: &Ciphertext,
    cap_c: &RPCommitment,
) -> Hasher<P> {
    Hasher::<P>::new_with_dst(HASH_TAG)
        .chain(public.pk0)
        .chain(public.cap_k)
        .chain(setup)
        .chain(aux)
        .chain(cap_s)
        .chain(cap_a)
        .chain(cap_c)
}

#[cfg(test)]
mod tests {
    use rand_core::OsRng;

    use super::{EncProof, EncPublicInputs, EncSecretInputs};
    use crate::{
        paillier::{Ciphertext, RPParams, SecretKeyPaillier},
        params::{PaillierTest, SchemeParams, TestParams},
        uint::random_bounded_bits,
    };

    #[test]
    fn prove_and_verify() {
        type Params = TestParams;

        let sk = SecretKeyPaillier::random::<PaillierTest>(&mut OsRng).unwrap();
        let pk = sk.public_key();

        let aux_sk = SecretKeyPaillier::random::<PaillierTest>(&mut OsRng).unwrap();
        let (setup, _) = RPParams::random_with_secret(&mut OsRng, &aux_sk).unwrap();

        let aux: &[u8] = b"abcde";

        let secret = random_bounded_bits(&mut OsRng, Params::L_BOUND);
        let (ciphertext, randomizer) = Ciphertext::new(&mut OsRng, &pk, &secret).unwrap();

        let proof = EncProof::new::<Params>(
            &mut OsRng,
            EncSecretInputs {
                k: &secret,
                rho: &randomizer,
            },
            EncPublicInputs {
                pk0: &pk,
                cap_k: &ciphertext,
            },
            &setup,
            &aux,
        )
        .unwrap();
        let public = || EncPublicInputs {
            pk0: &pk,
            cap_k: &ciphertext,
        };
        assert!(proof.verify::<Params>(public(), &setup, &aux));

        // A different context must not verify
        let other_aux: &[u8] = b"abcdf";
        assert!(!proof.verify::<Params>(public(), &setup, &other_aux));

        // Neither must a different ciphertext
        let (other_ciphertext, _) = Ciphertext::new(&mut OsRng, &pk, &secret).unwrap();
        assert!(!proof.verify::<Params>(
            EncPublicInputs {
                pk0: &pk,
                cap_k: &other_ciphertext,
            },
            &setup,
            &aux
        ));
    }
}
