//! Paillier Affine Operation with Group Commitment in Range ($\Pi^{aff-g}$, Section 6.2, Fig. 15)

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

const HASH_TAG: &[u8] = b"P_aff_g";

pub(crate) struct AffGSecretInputs<'a> {
    /// $x \in \pm 2^\ell$.
    pub x: &'a BigInt,
    /// $y \in \pm 2^{\ell^\prime}$.
    pub y: &'a BigInt,
    /// $\rho$, a Paillier randomizer for the public key $N_0$.
    pub rho: &'a BigUint,
    /// $\rho_y$, a Paillier randomizer for the public key $N_1$.
    pub rho_y: &'a BigUint,
}

pub(crate) struct AffGPublicInputs<'a> {
    /// Paillier public key $N_0$.
    pub pk0: &'a PublicKeyPaillier,
    /// Paillier public key $N_1$.
    pub pk1: &'a PublicKeyPaillier,
    /// Paillier ciphertext $C$ encrypted with $N_0$.
    pub cap_c: &'a Ciphertext,
    /// Paillier ciphertext $D = C (*) x (+) enc_0(-y, \rho)$.
    pub cap_d: &'a Ciphertext,
    /// Paillier ciphertext $Y = enc_1(y, \rho_y)$.
    pub cap_y: &'a Ciphertext,
    /// Point $X = g * x$, where $g$ is the curve generator.
    pub cap_x: &'a Point,
}

/// ZK proof: Paillier Affine Operation with Group Commitment in Range.
///
/// NOTE: the mask `y` enters `D` with a negative sign,
/// so that the sender's share is `y` and the receiver's share is `dec(D)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AffGProof {
    cap_a: Ciphertext,
    cap_b_x: Point,
    cap_b_y: Ciphertext,
    cap_e: RPCommitment,
    cap_s: RPCommitment,
    cap_f: RPCommitment,
    cap_t: RPCommitment,
    z1: BigInt,
    z2: BigInt,
    z3: BigInt,
    z4: BigInt,
    omega: BigUint,
    omega_y: BigUint,
}

impl AffGProof {
    pub fn new<P: SchemeParams>(
        rng: &mut impl CryptoRngCore,
        secret: AffGSecretInputs<'_>,
        public: AffGPublicInputs<'_>,
        setup: &RPParams,
        aux: &impl Hashable,
    ) -> Result<Self, LocalError> {
        let (pk0, pk1) = (public.pk0, public.pk1);

        let alpha = random_bounded_bits(rng, P::L_BOUND + P::EPS_BOUND);
        let beta = random_bounded_bits(rng, P::LP_BOUND + P::EPS_BOUND);

        let r = pk0.random_randomizer(rng)?;
        let r_y = pk1.random_randomizer(rng)?;

        let gamma = setup.random_randomizer(rng, P::L_BOUND + P::EPS_BOUND);
        let m = setup.random_randomizer(rng, P::L_BOUND);
        let delta = setup.random_randomizer(rng, P::L_BOUND + P::EPS_BOUND);
        let mu = setup.random_randomizer(rng, P::L_BOUND);

        let cap_a = public
            .cap_c
            .homomorphic_mul(pk0, &alpha)
            .homomorphic_add(pk0, &Ciphertext::new_with_randomizer(pk0, &-&beta, &r));
        let cap_b_x = bigint_to_scalar(&alpha).mul_by_generator();
        let cap_b_y = Ciphertext::new_with_randomizer(pk1, &beta, &r_y);
        let cap_e = setup.commit(&alpha, &gamma);
        let cap_s = setup.commit(secret.x, &m);
        let cap_f = setup.commit(&beta, &delta);
        let cap_t = setup.commit(secret.y, &mu);

        let commitments = Commitments {
            cap_a: &cap_a,
            cap_b_x: &cap_b_x,
            cap_b_y: &cap_b_y,
            cap_e: &cap_e,
            cap_s: &cap_s,
            cap_f: &cap_f,
            cap_t: &cap_t,
        };
        let e = challenge(transcript::<P>(&public, setup, aux, &commitments));

        let z1 = &alpha + &e * secret.x;
        let z2 = &beta + &e * secret.y;
        let z3 = gamma + &e * m;
        let z4 = delta + &e * mu;
        let omega = (r * pow_signed(secret.rho, &e, pk0.modulus())) % pk0.modulus();
        let omega_y = (r_y * pow_signed(secret.rho_y, &e, pk1.modulus())) % pk1.modulus();

        Ok(Self {
            cap_a,
            cap_b_x,
            cap_b_y,
            cap_e,
            cap_s,
            cap_f,
            cap_t,
            z1,
            z2,
            z3,
            z4,
            omega,
            omega_y,
        })
    }

    pub fn verify<P: SchemeParams>(&self, public: AffGPublicInputs<'_>, setup: &RPParams, aux: &impl Hashable) -> bool {
        let (pk0, pk1) = (public.pk0, public.pk1);

        if !self.cap_a.is_valid(pk0)
            || !self.cap_b_y.is_valid(pk1)
            || ![&self.cap_e, &self.cap_s, &self.cap_f, &self.cap_t]
                .iter()
                .all(|commitment| commitment.is_valid(setup))
        {
            return false;
        }

        let commitments = Commitments {
            cap_a: &self.cap_a,
            cap_b_x: &self.cap_b_x,
            cap_b_y: &self.cap_b_y,
            cap_e: &self.cap_e,
            cap_s: &self.cap_s,
            cap_f: &self.cap_f,
            cap_t: &self.cap_t,
        };
        let e = challenge(transcript::<P>(&public, setup, aux, &commitments));

        // Range checks
        if !in_range_bits(&self.z1, P::L_BOUND + P::EPS_BOUND) {
            return false;
        }
        if !in_range_bits(&self.z2, P::LP_BOUND + P::EPS_BOUND) {
            return false;
        }

        // C^{z_1} (1 + N_0)^{-z_2} \omega^{N_0} = A D^e \mod N_0^2
        // => C (*) z_1 (+) encrypt_0(-z_2, \omega) = A (+) D (*) e
        let lhs = public
            .cap_c
            .homomorphic_mul(pk0, &self.z1)
            .homomorphic_add(pk0, &Ciphertext::new_with_randomizer(pk0, &-&self.z2, &self.omega));
        let rhs = self.cap_a.homomorphic_add(pk0, &public.cap_d.homomorphic_mul(pk0, &e));
        if lhs != rhs {
            return false;
        }

        // g^{z_1} = B_x X^e
        let lhs = bigint_to_scalar(&self.z1).mul_by_generator();
        let rhs = self.cap_b_x + *public.cap_x * bigint_to_scalar(&e);
        if lhs != rhs {
            return false;
        }

        // (1 + N_1)^{z_2} \omega_y^{N_1} = B_y Y^e \mod N_1^2
        // => encrypt_1(z_2, \omega_y) = B_y (+) Y (*) e
        let lhs = Ciphertext::new_with_randomizer(pk1, &self.z2, &self.omega_y);
        let rhs = self.cap_b_y.homomorphic_add(pk1, &public.cap_y.homomorphic_mul(pk1, &e));
        if lhs != rhs {
            return false;
        }

        // s^{z_1} t^{z_3} = E S^e \mod \hat{N}
        if setup.commit(&self.z1, &self.z3) != self.cap_s.pow_mul(&e, &self.cap_e, setup) {
            return false;
        }

        // s^{z_2} t^{z_4} = F T^e \mod \hat{N}
        if setup.commit(&self.z2, &self.z4) != self.cap_t.pow_mul(&e, &self.cap_f, setup) {
            return false;
        }

        true
    }
}

struct Commitments<'a> {
    cap_a: &'a Ciphertext,
    cap_b_x: &'a Point,
    cap_b_y: &'a Ciphertext,
    cap_e: &'a RPCommitment,
    cap_s: &'a RPCommitment,
    cap_f: &'a RPCommitment,
    cap_t: &'a RPCommitment,
}

fn transcript<P: SchemeParams>(
    public: &AffGPublicInputs<'_>,
    setup: &RPParams,
    aux: &impl Hashable,
    commitments: &Commitments<'_>,
) -> Hasher<P> {
    Hasher::<P>::new_with_dst(HASH_TAG)
        .chain(public.pk0)
        .chain(public.pk1)
        .chain(public.cap_c)
        .chain(public.cap_d)
        .chain(public.cap_y)
        .chain(public.cap_x)
        .chain(setup)
        .chain(aux)
        .chain(commitments.cap_a)
        .chain(commitments.cap_b_x)
        .chain(commitments.cap_b_y)
        .chain(commitments.cap_e)
        .chain(commitments.cap_s)
        .chain(commitments.cap_f)
        .chain(commitments.cap_t)
}
