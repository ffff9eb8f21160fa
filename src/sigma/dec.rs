//! Paillier decryption modulo $q$ ($\Pi^{dec}$, Section C.6, Fig. 30)

use num_bigint::{BigInt, BigUint};
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};

use super::challenge;
use crate::{
    curve::Scalar,
    paillier::{Ciphertext, PublicKeyPaillier, RPCommitment, RPParams},
    params::SchemeParams,
    sessions::LocalError,
    tools::hashing::{Chain, Hashable, Hasher},
    uint::{bigint_to_scalar, pow_signed, random_bounded_bits},
};

const HASH_TAG: &[u8] = b"P_dec";

pub(crate) struct DecSecretInputs<'a> {
    /// $y$, the plaintext of $C$ as a signed integer.
    pub y: &'a BigInt,
    /// $\rho$, the Paillier randomizer of $C$.
    pub rho: &'a BigUint,
}

pub(crate) struct DecPublicInputs<'a> {
    /// Paillier public key $N_0$.
    pub pk0: &'a PublicKeyPaillier,
    /// Scalar $x = y \mod q$.
    pub x: &'a Scalar,
    /// Paillier ciphertext $C = enc_0(y, \rho)$.
    pub cap_c: &'a Ciphertext,
}

/// ZK proof: Paillier decryption modulo $q$.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct DecProof {
    cap_s: RPCommitment,
    cap_t: RPCommitment,
    cap_a: Ciphertext,
    gamma: Scalar,
    z1: BigInt,
    z2: BigInt,
    omega: BigUint,
}

impl DecProof {
    pub fn new<P: SchemeParams>(
        rng: &mut impl CryptoRngCore,
        secret: DecSecretInputs<'_>,
        public: DecPublicInputs<'_>,
        setup: &RPParams,
        aux: &impl Hashable,
    ) -> Result<Self, LocalError> {
        let pk0 = public.pk0;

        let alpha = random_bounded_bits(rng, P::L_BOUND + P::EPS_BOUND);
        let mu = setup.random_randomizer(rng, P::L_BOUND);
        let nu = setup.random_randomizer(rng, P::L_BOUND + P::EPS_BOUND);
        let r = pk0.random_randomizer(rng)?;

        let cap_s = setup.commit(secret.y, &mu);
        let cap_t = setup.commit(&alpha, &nu);
        let cap_a = Ciphertext::new_with_randomizer(pk0, &alpha, &r);
        let gamma = bigint_to_scalar(&alpha);

        let e = challenge(transcript::<P>(&public, setup, aux, (&cap_s, &cap_t, &cap_a, &gamma)));

        let z1 = &alpha + &e * secret.y;
        let z2 = nu + &e * mu;
        let omega = (r * pow_signed(secret.rho, &e, pk0.modulus())) % pk0.modulus();

        Ok(Self {
            cap_s,
            cap_t,
            cap_a,
            gamma,
            z1,
            z2,
            omega,
        })
    }

    pub fn verify<P: SchemeParams>(&self, public: DecPublicInputs<'_>, setup: &RPParams, aux: &impl Hashable) -> bool {
        let pk0 = public.pk0;

        if !self.cap_a.is_valid(pk0) || !self.cap_s.is_valid(setup) || !self.cap_t.is_valid(setup) {
            return false;
        }

        let e = challenge(transcript::<P>(
            &public,
            setup,
            aux,
            (&self.cap_s, &self.cap_t, &self.cap_a, &self.gamma),
        ));

        // enc(z_1, \omega) == A (+) C (*) e
        let lhs = Ciphertext::new_with_randomizer(pk0, &self.z1, &self.omega);
        let rhs = self.cap_a.homomorphic_add(pk0, &public.cap_c.homomorphic_mul(pk0, &e));
        if lhs != rhs {
            return false;
        }

        // z_1 == \gamma + e x \mod q
        if bigint_to_scalar(&self.z1) != self.gamma + bigint_to_scalar(&e) * *public.x {
            return false;
        }

        // s^{z_1} t^{z_2} == T S^e
        if setup.commit(&self.z1, &self.z2) != self.cap_s.pow_mul(&e, &self.cap_t, setup) {
            return false;
        }

        true
    }
}

fn transcript<P: SchemeParams>(
    public: &DecPublicInputs<'_>,
    setup: &RPParams,
    aux: &impl Hashable,
    commitments: (&RPCommitment, &RPCommitment, &Ciphertext, &Scalar),
) -> Hasher<P> {
    Hasher::<P>::new_with_dst(HASH_TAG)
        .chain(public.pk0)
        .chain(public.x)
        .chain(public.cap_c)
        .chain(setup)
        .chain(aux)
        .chain(&commitments)
}
