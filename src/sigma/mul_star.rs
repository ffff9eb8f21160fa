//! Multiplication Paillier vs Group ($\Pi^{mul*}$, Section C.6, Fig. 31)

use num_bigint::{BigInt, BigUint};
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};

use super::challenge;
use crate::{
    curve::Point,
    paillier::{Ciphertext, PublicKeyPaillier, RPCommitment, RPParams},
    params::SchemeParams,
    sessions::LocalError,
    tools::hashing::{Chain, Hashable, Hasher},
    uint::{bigint_to_scalar, in_range_bits, pow_signed, random_bounded_bits},
};

const HASH_TAG: &[u8] = b"P_mul*";

pub(crate) struct MulStarSecretInputs<'a> {
    /// $x \in \pm 2^\ell$.
    pub x: &'a BigInt,
    /// $\rho$, a Paillier randomizer for the public key $N_0$.
    pub rho: &'a BigUint,
}

pub(crate) struct MulStarPublicInputs<'a> {
    /// Paillier public key $N_0$.
    pub pk0: &'a PublicKeyPaillier,
    /// Paillier ciphertext $C$ encrypted with $N_0$.
    pub cap_c: &'a Ciphertext,
    /// Paillier ciphertext $D = C (*) x (+) enc_0(0, \rho)$.
    pub cap_d: &'a Ciphertext,
    /// Point $X = g * x$, where $g$ is the curve generator.
    pub cap_x: &'a Point,
}

/// ZK proof: Multiplication Paillier vs Group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct MulStarProof {
    cap_a: Ciphertext,
    cap_b_x: Point,
    cap_e: RPCommitment,
    cap_s: RPCommitment,
    z1: BigInt,
    z2: BigInt,
    omega: BigUint,
}

impl MulStarProof {
    pub fn new<P: SchemeParams>(
        rng: &mut impl CryptoRngCore,
        secret: MulStarSecretInputs<'_>,
        public: MulStarPublicInputs<'_>,
        setup: &RPParams,
        aux: &impl Hashable,
    ) -> Result<Self, LocalError> {
        let pk0 = public.pk0;

        let r = pk0.random_randomizer(rng)?;
        let alpha = random_bounded_bits(rng, P::L_BOUND + P::EPS_BOUND);
        let gamma = setup.random_randomizer(rng, P::L_BOUND + P::EPS_BOUND);
        let m = setup.random_randomizer(rng, P::L_BOUND);

        let cap_a = public.cap_c.homomorphic_mul(pk0, &alpha).mul_randomizer(pk0, &r);
        let cap_b_x = bigint_to_scalar(&alpha).mul_by_generator();
        let cap_e = setup.commit(&alpha, &gamma);
        let cap_s = setup.commit(secret.x, &m);

        let e = challenge(transcript::<P>(&public, setup, aux, (&cap_a, &cap_b_x, &cap_e, &cap_s)));

        let z1 = &alpha + &e * secret.x;
        let z2 = gamma + &e * m;
        let omega = (r * pow_signed(secret.rho, &e, pk0.modulus())) % pk0.modulus();

        Ok(Self {
            cap_a,
            cap_b_x,
            cap_e,
            cap_s,
            z1,
            z2,
            omega,
        })
    }

    pub fn verify<P: SchemeParams>(
        &self,
        public: MulStarPublicInputs<'_>,
        setup: &RPParams,
        aux: &impl Hashable,
    ) -> bool {
        let pk0 = public.pk0;

        if !self.cap_a.is_valid(pk0) || !self.cap_e.is_valid(setup) || !self.cap_s.is_valid(setup) {
            return false;
        }

        let e = challenge(transcript::<P>(
            &public,
            setup,
            aux,
            (&self.cap_a, &self.cap_b_x, &self.cap_e, &self.cap_s),
        ));

        // z_1 \in \pm 2^{\ell + \eps}
        if !in_range_bits(&self.z1, P::L_BOUND + P::EPS_BOUND) {
            return false;
        }

        // C^{z_1} \omega^{N_0} \mod N_0^2 = A D^e
        let lhs = public.cap_c.homomorphic_mul(pk0, &self.z1).mul_randomizer(pk0, &self.omega);
        let rhs = public.cap_d.homomorphic_mul(pk0, &e).homomorphic_add(pk0, &self.cap_a);
        if lhs != rhs {
            return false;
        }

        // g^{z_1} = B_x X^e
        if bigint_to_scalar(&self.z1).mul_by_generator() != self.cap_b_x + *public.cap_x * bigint_to_scalar(&e) {
            return false;
        }

        // s^{z_1} t^{z_2} = E S^e
        if setup.commit(&self.z1, &self.z2) != self.cap_s.pow_mul(&e, &self.cap_e, setup) {
            return false;
        }

        true
    }
}

fn transcript<P: SchemeParams>(
    public: &MulStarPublicInputs<'_>,
    setup: &RPParams,
    aux: &impl Hashable,
    commitments: (&Ciphertext, &Point, &RPCommitment, &RPCommitment),
) -> Hasher<P> {
    Hasher::<P>::new_with_dst(HASH_TAG)
        .chain(public.pk0)
        .chain(public.cap_c)
        .chain(public.cap_d)
        .chain(public.cap_x)
        .chain(setup)
        .chain(aux)
        .chain(&commitments)
}
