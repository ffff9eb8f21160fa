//! Paillier Affine Operation with Paillier Commitment in Range ($\Pi^{aff-p}$, Section C.3, Fig. 26)
//!
//! Same as $\Pi^{aff-g}$, but the multiplier is committed to with a Paillier ciphertext
//! under the prover's key instead of a curve point.

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

const HASH_TAG: &[u8] = b"P_aff_p";

pub(crate) struct AffPSecretInputs<'a> {
    /// $x \in \pm 2^\ell$.
    pub x: &'a BigInt,
    /// $y \in \pm 2^{\ell^\prime}$.
    pub y: &'a BigInt,
    /// $\rho$, a Paillier randomizer for the public key $N_0$.
    pub rho: &'a BigUint,
    /// $\rho_x$, a Paillier randomizer for the public key $N_1$.
    pub rho_x: &'a BigUint,
    /// $\rho_y$, a Paillier randomizer for the public key $N_1$.
    pub rho_y: &'a BigUint,
}

pub(crate) struct AffPPublicInputs<'a> {
    /// Paillier public key $N_0$.
    pub pk0: &'a PublicKeyPaillier,
    /// Paillier public key $N_1$.
    pub pk1: &'a PublicKeyPaillier,
    /// Paillier ciphertext $C$ encrypted with $N_0$.
    pub cap_c: &'a Ciphertext,
    /// Paillier ciphertext $D = C (*) x (+) enc_0(-y, \rho)$.
    pub cap_d: &'a Ciphertext,
    /// Paillier ciphertext $X = enc_1(x, \rho_x)$.
    pub cap_x: &'a Ciphertext,
    /// Paillier ciphertext $Y = enc_1(y, \rho_y)$.
    pub cap_y: &'a Ciphertext,
}

/// ZK proof: Paillier Affine Operation with Paillier Commitment in Range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AffPProof {
    cap_a: Ciphertext,
    cap_b_x: Ciphertext,
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
    omega_x: BigUint,
    omega_y: BigUint,
}

impl AffPProof {
    pub fn new<P: SchemeParams>(
        rng: &mut impl CryptoRngCore,
        secret: AffPSecretInputs<'_>,
        public: AffPPublicInputs<'_>,
        setup: &RPParams,
        aux: &impl Hashable,
    ) -> Result<Self, LocalError> {
        let (pk0, pk1) = (public.pk0, public.pk1);

        let alpha = random_bounded_bits(rng, P::L_BOUND + P::EPS_BOUND);
        let beta = random_bounded_bits(rng, P::LP_BOUND + P::EPS_BOUND);

        let r = pk0.random_randomizer(rng)?;
        let r_x = pk1.random_randomizer(rng)?;
        let r_y = pk1.random_randomizer(rng)?;

        let gamma = setup.random_randomizer(rng, P::L_BOUND + P::EPS_BOUND);
        let m = setup.random_randomizer(rng, P::L_BOUND);
        let delta = setup.random_randomizer(rng, P::L_BOUND + P::EPS_BOUND);
        let mu = setup.random_randomizer(rng, P::L_BOUND);

        let cap_a = public
            .cap_c
            .homomorphic_mul(pk0, &alpha)
            .homomorphic_add(pk0, &Ciphertext::new_with_randomizer(pk0, &-&beta, &r));
        let cap_b_x = Ciphertext::new_with_randomizer(pk1, &alpha, &r_x);
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
        let omega_x = (r_x * pow_signed(secret.rho_x, &e, pk1.modulus())) % pk1.modulus();
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
            omega_x,
            omega_y,
        })
    }

    pub fn verify<P: SchemeParams>(&self, public: AffPPublicInputs<'_>, setup: &RPParams, aux: &impl Hashable) -> bool {
        let (pk0, pk1) = (public.pk0, public.pk1);

        if !self.cap_a.is_valid(pk0)
            || !self.cap_b_x.is_valid(pk1)
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

        // C (*) z_1 (+) encrypt_0(-z_2, \omega) = A (+) D (*) e
        let lhs = public
            .cap_c
            .homomorphic_mul(pk0, &self.z1)
            .homomorphic_add(pk0, &Ciphertext::new_with_randomizer(pk0, &-&self.z2, &self.omega));
        let rhs = self.cap_a.homomorphic_add(pk0, &public.cap_d.homomorphic_mul(pk0, &e));
        if lhs != rhs {
            return false;
        }

        // encrypt_1(z_1, \omega_x) = B_x (+) X (*) e
        let lhs = Ciphertext::new_with_randomizer(pk1, &self.z1, &self.omega_x);
        let rhs = self.cap_b_x.homomorphic_add(pk1, &public.cap_x.homomorphic_mul(pk1, &e));
        if lhs != rhs {
            return false;
        }

        // encrypt_1(z_2, \omega_y) = B_y (+) Y (*) e
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
    cap_b_x: &'a Ciphertext,
    cap_b_y: &'a Ciphertext,
    cap_e: &'a RPCommitment,
    cap_s: &'a RPCommitment,
    cap_f: &'a RPCommitment,
    cap_t: &'a RPCommitment,
}

fn transcript<P: SchemeParams>(
    public: &AffPPublicInputs<'_>,
    setup: &RPParams,
    aux: &impl Hashable,
    commitments: &Commitments<'_>,
) -> Hasher<P> {
    Hasher::<P>::new_with_dst(HASH_TAG)
        .chain(public.pk0)
        .chain(public.pk1)
        .chain(public.cap_c)
        .chain(public.cap_d)
        .chain(public.cap_x)
        .chain(public.cap_y)
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

#[cfg(test)]
mod tests {
    use rand_core::OsRng;

    use super::{AffPProof, AffPPublicInputs, AffPSecretInputs};
    use crate::{
        paillier::{Ciphertext, RPParams, SecretKeyPaillier},
        params::{PaillierTest, SchemeParams, TestParams},
        uint::random_bounded_bits,
    };

    #[test]
    fn prove_and_verify() {
        type Params = TestParams;

        let sk0 = SecretKeyPaillier::random::<PaillierTest>(&mut OsRng).unwrap();
        let pk0 = sk0.public_key();
        let sk1 = SecretKeyPaillier::random::<PaillierTest>(&mut OsRng).unwrap();
        let pk1 = sk1.public_key();

        let rp_sk = SecretKeyPaillier::random::<PaillierTest>(&mut OsRng).unwrap();
        let (setup, _) = RPParams::random_with_secret(&mut OsRng, &rp_sk).unwrap();

        let aux: &[u8] = b"abcde";

        let x = random_bounded_bits(&mut OsRng, Params::L_BOUND);
        let y = random_bounded_bits(&mut OsRng, Params::LP_BOUND);

        let secret = random_bounded_bits(&mut OsRng, Params::L_BOUND);
        let (cap_c, _) = Ciphertext::new(&mut OsRng, &pk0, &secret).unwrap();

        let (enc_y, rho) = Ciphertext::new(&mut OsRng, &pk0, &-&y).unwrap();
        let cap_d = cap_c.homomorphic_mul(&pk0, &x).homomorphic_add(&pk0, &enc_y);
        let (cap_x, rho_x) = Ciphertext::new(&mut OsRng, &pk1, &x).unwrap();
        let (cap_y, rho_y) = Ciphertext::new(&mut OsRng, &pk1, &y).unwrap();

        let public = || AffPPublicInputs {
            pk0: &pk0,
            pk1: &pk1,
            cap_c: &cap_c,
            cap_d: &cap_d,
            cap_x: &cap_x,
            cap_y: &cap_y,
        };

        let proof = AffPProof::new::<Params>(
            &mut OsRng,
            AffPSecretInputs {
                x: &x,
                y: &y,
                rho: &rho,
                rho_x: &rho_x,
                rho_y: &rho_y,
            },
            public(),
            &setup,
            &aux,
        )
        .unwrap();
        assert!(proof.verify::<Params>(public(), &setup, &aux));

        // A commitment to a different multiplier must not verify
        let (other_x, _) = Ciphertext::new(&mut OsRng, &pk1, &(&x + 1)).unwrap();
        assert!(!proof.verify::<Params>(
            AffPPublicInputs {
                cap_x: &other_x,
                ..public()
            },
            &setup,
            &aux
        ));
    }
}
